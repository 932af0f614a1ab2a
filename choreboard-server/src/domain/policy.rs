use choreboard_shared::auth::Role;

use super::Actor;
use super::error::DomainError;

/// Every role-gated operation in the core. Keeping the {operation → allowed
/// roles} table in one place avoids ad hoc role comparisons at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    ManageUsers,
    CreateChore,
    MarkChoreDone,
    ApproveChore,
    RejectChore,
    ViewApprovals,
    CreateReward,
    RequestRedemption,
    HandleRedemption,
}

pub fn allowed_roles(op: Op) -> &'static [Role] {
    match op {
        Op::ManageUsers => &[Role::Admin],
        Op::CreateChore | Op::ApproveChore | Op::RejectChore | Op::ViewApprovals => {
            &[Role::Parent, Role::Admin]
        }
        Op::CreateReward | Op::HandleRedemption => &[Role::Parent, Role::Admin],
        Op::MarkChoreDone | Op::RequestRedemption => &[Role::Child],
    }
}

/// Entry guard for every operation; returns `Forbidden` when the actor's
/// role is not in the table.
pub fn require(actor: &Actor, op: Op) -> Result<(), DomainError> {
    if allowed_roles(op).contains(&actor.role) {
        Ok(())
    } else {
        Err(DomainError::Forbidden)
    }
}
