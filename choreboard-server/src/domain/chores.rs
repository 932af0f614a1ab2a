//! Chore lifecycle state machine.
//!
//! ```text
//! (none) --create[PARENT|ADMIN]--> ASSIGNED
//! ASSIGNED --mark_done[assigned CHILD]--> DONE_PENDING
//! REJECTED --mark_done[assigned CHILD]--> DONE_PENDING
//! DONE_PENDING --approve[PARENT|ADMIN]--> APPROVED  (+points, recurrence spawn)
//! DONE_PENDING --reject[PARENT|ADMIN]--> REJECTED
//! ```
//!
//! Who gets credited on approval is explicit state: `pending_actor` is set
//! by mark_done and cleared by approve/reject, so approval never has to
//! re-derive the child from event history.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use choreboard_shared::auth::Role;
use choreboard_shared::domain::{ChoreStatus, LedgerRefType, Recurrence};
use diesel::prelude::*;

use super::error::DomainError;
use super::policy::{self, Op};
use super::{Actor, ledger};
use crate::storage::models::{
    Chore, ChoreEvent, NewChore, NewChoreAssignment, NewChoreEvent, User,
};
use crate::storage::schema::{chore_assignments, chore_events, chores, users};

#[derive(Debug, Clone)]
pub struct ChoreWithAssignees {
    pub chore: Chore,
    pub assignee_ids: Vec<i32>,
}

#[derive(Debug, Clone)]
pub struct ChoreDetail {
    pub chore: Chore,
    pub assignees: Vec<User>,
    /// Audit trail newest first, each event paired with the actor's
    /// display name.
    pub events: Vec<(ChoreEvent, String)>,
}

fn load_chore(conn: &mut SqliteConnection, chore_id: i32) -> Result<Chore, DomainError> {
    chores::table
        .find(chore_id)
        .first::<Chore>(conn)
        .optional()?
        .ok_or_else(|| DomainError::not_found("chore not found"))
}

fn assignee_ids(conn: &mut SqliteConnection, chore_id: i32) -> Result<Vec<i32>, DomainError> {
    Ok(chore_assignments::table
        .filter(chore_assignments::chore_id.eq(chore_id))
        .select(chore_assignments::user_id)
        .order(chore_assignments::user_id.asc())
        .load::<i32>(conn)?)
}

fn record_event(
    conn: &mut SqliteConnection,
    chore_id: i32,
    from: Option<ChoreStatus>,
    to: ChoreStatus,
    actor_id: i32,
    note: &str,
) -> Result<(), DomainError> {
    let event = NewChoreEvent {
        chore_id,
        from_status: from.map(|s| s.as_str()),
        to_status: to.as_str(),
        actor_id,
        note: Some(note),
        created_at: Utc::now().naive_utc(),
    };
    diesel::insert_into(chore_events::table)
        .values(&event)
        .execute(conn)?;
    Ok(())
}

fn status_of(chore: &Chore) -> Result<ChoreStatus, DomainError> {
    chore
        .status
        .parse()
        .map_err(|_| DomainError::Inconsistency(format!("bad chore status: {}", chore.status)))
}

fn detail(conn: &mut SqliteConnection, chore_id: i32) -> Result<ChoreDetail, DomainError> {
    let chore = load_chore(conn, chore_id)?;
    let assignees = chore_assignments::table
        .inner_join(users::table)
        .filter(chore_assignments::chore_id.eq(chore_id))
        .order(users::display_name.asc())
        .select(User::as_select())
        .load::<User>(conn)?;
    let events = chore_events::table
        .inner_join(users::table)
        .filter(chore_events::chore_id.eq(chore_id))
        .order(chore_events::id.desc())
        .select((ChoreEvent::as_select(), users::display_name))
        .load::<(ChoreEvent, String)>(conn)?;
    Ok(ChoreDetail {
        chore,
        assignees,
        events,
    })
}

/// Creates a chore with its assignment rows and the initial ASSIGNED audit
/// event. All assignees must resolve to active CHILD accounts at creation
/// time; this is not re-validated later.
pub fn create(
    conn: &mut SqliteConnection,
    actor: &Actor,
    title: &str,
    description: Option<&str>,
    points: i32,
    assignees: &[i32],
    recurrence: Option<&str>,
    due_date: Option<chrono::NaiveDate>,
) -> Result<ChoreDetail, DomainError> {
    policy::require(actor, Op::CreateChore)?;
    let title = title.trim();
    if title.is_empty() {
        return Err(DomainError::validation("title is required"));
    }
    if points < 0 {
        return Err(DomainError::validation("points must be >= 0"));
    }
    let recurrence: Recurrence = recurrence
        .unwrap_or("NONE")
        .parse()
        .map_err(|_| DomainError::validation("invalid recurrence"))?;
    if assignees.is_empty() {
        return Err(DomainError::validation("at least one assignee is required"));
    }

    let ids: BTreeSet<i32> = assignees.iter().copied().collect();
    let rows = users::table
        .filter(users::id.eq_any(&ids))
        .select(User::as_select())
        .load::<User>(conn)?;
    if rows.len() != ids.len() {
        return Err(DomainError::validation("invalid assignee(s)"));
    }
    for user in &rows {
        if user.role != Role::Child.as_str() || !user.is_active {
            return Err(DomainError::validation(
                "assignees must be active CHILD users",
            ));
        }
    }

    let new = NewChore {
        title,
        description: description.map(str::trim).filter(|d| !d.is_empty()),
        points,
        recurrence: recurrence.as_str(),
        due_date,
        status: ChoreStatus::Assigned.as_str(),
        created_by: actor.id,
        created_at: Utc::now().naive_utc(),
    };
    let chore = diesel::insert_into(chores::table)
        .values(&new)
        .get_result::<Chore>(conn)?;
    let assignment_rows: Vec<NewChoreAssignment> = ids
        .iter()
        .map(|&user_id| NewChoreAssignment {
            chore_id: chore.id,
            user_id,
        })
        .collect();
    diesel::insert_into(chore_assignments::table)
        .values(&assignment_rows)
        .execute(conn)?;
    record_event(
        conn,
        chore.id,
        None,
        ChoreStatus::Assigned,
        actor.id,
        "Chore created",
    )?;
    detail(conn, chore.id)
}

/// Chore with assignees and full event history. CHILD actors may only see
/// chores they are assigned to.
pub fn get(
    conn: &mut SqliteConnection,
    actor: &Actor,
    chore_id: i32,
) -> Result<ChoreDetail, DomainError> {
    let d = detail(conn, chore_id)?;
    if actor.role == Role::Child && !d.assignees.iter().any(|u| u.id == actor.id) {
        return Err(DomainError::Forbidden);
    }
    Ok(d)
}

/// Chores newest first, optionally filtered by status. CHILD actors are
/// implicitly scoped to their own assignments.
pub fn list(
    conn: &mut SqliteConnection,
    actor: &Actor,
    status: Option<&str>,
) -> Result<Vec<ChoreWithAssignees>, DomainError> {
    let mut query = chores::table.into_boxed();
    if let Some(status) = status {
        let status: ChoreStatus = status
            .parse()
            .map_err(|_| DomainError::validation("invalid status filter"))?;
        query = query.filter(chores::status.eq(status.as_str()));
    }
    if actor.role == Role::Child {
        let mine = chore_assignments::table
            .filter(chore_assignments::user_id.eq(actor.id))
            .select(chore_assignments::chore_id);
        query = query.filter(chores::id.eq_any(mine));
    }
    let rows = query.order(chores::id.desc()).load::<Chore>(conn)?;
    with_assignees(conn, rows)
}

/// All chores awaiting review, oldest first so the approver's queue is
/// FIFO-fair.
pub fn approvals_queue(
    conn: &mut SqliteConnection,
    actor: &Actor,
) -> Result<Vec<ChoreWithAssignees>, DomainError> {
    policy::require(actor, Op::ViewApprovals)?;
    let rows = chores::table
        .filter(chores::status.eq(ChoreStatus::DonePending.as_str()))
        .order(chores::id.asc())
        .load::<Chore>(conn)?;
    with_assignees(conn, rows)
}

fn with_assignees(
    conn: &mut SqliteConnection,
    rows: Vec<Chore>,
) -> Result<Vec<ChoreWithAssignees>, DomainError> {
    let ids: Vec<i32> = rows.iter().map(|c| c.id).collect();
    let assignments: Vec<(i32, i32)> = chore_assignments::table
        .filter(chore_assignments::chore_id.eq_any(&ids))
        .select((chore_assignments::chore_id, chore_assignments::user_id))
        .order(chore_assignments::user_id.asc())
        .load::<(i32, i32)>(conn)?;
    let mut by_chore: HashMap<i32, Vec<i32>> = HashMap::new();
    for (chore_id, user_id) in assignments {
        by_chore.entry(chore_id).or_default().push(user_id);
    }
    Ok(rows
        .into_iter()
        .map(|chore| {
            let assignee_ids = by_chore.remove(&chore.id).unwrap_or_default();
            ChoreWithAssignees {
                chore,
                assignee_ids,
            }
        })
        .collect())
}

/// ASSIGNED/REJECTED → DONE_PENDING, by an assigned child only. Records the
/// submitter as `pending_actor` so approval knows whom to credit.
pub fn mark_done(
    conn: &mut SqliteConnection,
    actor: &Actor,
    chore_id: i32,
) -> Result<ChoreDetail, DomainError> {
    policy::require(actor, Op::MarkChoreDone)?;
    let chore = load_chore(conn, chore_id)?;
    if !assignee_ids(conn, chore_id)?.contains(&actor.id) {
        return Err(DomainError::Forbidden);
    }
    let from = status_of(&chore)?;
    if !matches!(from, ChoreStatus::Assigned | ChoreStatus::Rejected) {
        return Err(DomainError::invalid_state(
            "chore cannot be marked done now",
        ));
    }

    diesel::update(chores::table.find(chore_id))
        .set((
            chores::status.eq(ChoreStatus::DonePending.as_str()),
            chores::pending_actor.eq(Some(actor.id)),
        ))
        .execute(conn)?;
    record_event(
        conn,
        chore_id,
        Some(from),
        ChoreStatus::DonePending,
        actor.id,
        "Marked done",
    )?;
    detail(conn, chore_id)
}

/// DONE_PENDING → APPROVED. Credits the submitting child, records the audit
/// event and, for recurring chores, spawns the next occurrence. All within
/// the caller's transaction; a failure anywhere leaves no partial effect.
pub fn approve(
    conn: &mut SqliteConnection,
    actor: &Actor,
    chore_id: i32,
    note: Option<&str>,
) -> Result<ChoreDetail, DomainError> {
    policy::require(actor, Op::ApproveChore)?;
    let chore = load_chore(conn, chore_id)?;
    if status_of(&chore)? != ChoreStatus::DonePending {
        return Err(DomainError::invalid_state("chore is not pending"));
    }
    // mark_done always sets this; a DONE_PENDING chore without it means the
    // invariant is already broken, so fail loudly instead of guessing an
    // assignee.
    let child_id = chore.pending_actor.ok_or_else(|| {
        DomainError::Inconsistency("DONE_PENDING chore has no pending actor".into())
    })?;

    diesel::update(chores::table.find(chore_id))
        .set((
            chores::status.eq(ChoreStatus::Approved.as_str()),
            chores::pending_actor.eq(None::<i32>),
        ))
        .execute(conn)?;
    record_event(
        conn,
        chore_id,
        Some(ChoreStatus::DonePending),
        ChoreStatus::Approved,
        actor.id,
        note.filter(|n| !n.is_empty()).unwrap_or("Approved"),
    )?;
    ledger::append_entry(
        conn,
        child_id,
        chore.points,
        &format!("Chore approved: {}", chore.title),
        LedgerRefType::Chore,
        Some(chore_id),
    )?;
    spawn_next_occurrence(conn, &chore)?;
    detail(conn, chore_id)
}

/// DONE_PENDING → REJECTED. No ledger effect; the chore can be re-submitted
/// via `mark_done`.
pub fn reject(
    conn: &mut SqliteConnection,
    actor: &Actor,
    chore_id: i32,
    note: Option<&str>,
) -> Result<ChoreDetail, DomainError> {
    policy::require(actor, Op::RejectChore)?;
    let chore = load_chore(conn, chore_id)?;
    if status_of(&chore)? != ChoreStatus::DonePending {
        return Err(DomainError::invalid_state("chore is not pending"));
    }

    diesel::update(chores::table.find(chore_id))
        .set((
            chores::status.eq(ChoreStatus::Rejected.as_str()),
            chores::pending_actor.eq(None::<i32>),
        ))
        .execute(conn)?;
    record_event(
        conn,
        chore_id,
        Some(ChoreStatus::DonePending),
        ChoreStatus::Rejected,
        actor.id,
        note.filter(|n| !n.is_empty()).unwrap_or("Rejected"),
    )?;
    detail(conn, chore_id)
}

/// For DAILY/WEEKLY chores, approval creates the next occurrence: same
/// title, description, points, recurrence and assignees; due date advanced
/// by the cadence; fresh ASSIGNED status and creation event.
fn spawn_next_occurrence(conn: &mut SqliteConnection, chore: &Chore) -> Result<(), DomainError> {
    let recurrence: Recurrence = chore.recurrence.parse().map_err(|_| {
        DomainError::Inconsistency(format!("bad chore recurrence: {}", chore.recurrence))
    })?;
    if recurrence == Recurrence::None {
        return Ok(());
    }

    let new = NewChore {
        title: &chore.title,
        description: chore.description.as_deref(),
        points: chore.points,
        recurrence: recurrence.as_str(),
        due_date: chore.due_date.map(|d| recurrence.next_due(d)),
        status: ChoreStatus::Assigned.as_str(),
        created_by: chore.created_by,
        created_at: Utc::now().naive_utc(),
    };
    let next_id = diesel::insert_into(chores::table)
        .values(&new)
        .returning(chores::id)
        .get_result::<i32>(conn)?;
    let assignment_rows: Vec<NewChoreAssignment> = assignee_ids(conn, chore.id)?
        .into_iter()
        .map(|user_id| NewChoreAssignment {
            chore_id: next_id,
            user_id,
        })
        .collect();
    diesel::insert_into(chore_assignments::table)
        .values(&assignment_rows)
        .execute(conn)?;
    record_event(
        conn,
        next_id,
        None,
        ChoreStatus::Assigned,
        chore.created_by,
        "Auto-created recurrence",
    )?;
    Ok(())
}
