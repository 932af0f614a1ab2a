//! Reward catalog and the redemption state machine
//! (REQUESTED → APPROVED | DENIED).
//!
//! Points are never escrowed at request time: the balance check there is a
//! courtesy snapshot. The approve-time re-check, atomic with the ledger
//! debit, is the one that counts.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, Utc};
use choreboard_shared::auth::Role;
use choreboard_shared::domain::{LedgerRefType, RedemptionStatus};
use diesel::prelude::*;

use super::error::DomainError;
use super::policy::{self, Op};
use super::{Actor, ledger};
use crate::storage::models::{NewRedemption, NewReward, Redemption, Reward};
use crate::storage::schema::{redemptions, rewards, users};

/// Redemption joined with the context a reviewer needs at a glance.
#[derive(Debug, Clone)]
pub struct RedemptionDetail {
    pub redemption: Redemption,
    pub reward_name: String,
    pub reward_cost: i32,
    pub user_name: String,
}

/// Monday 00:00 of the week containing `now`, in UTC. Weekly redemption
/// limits reset at this boundary.
pub fn start_of_week(now: DateTime<Utc>) -> NaiveDateTime {
    let days_from_monday = now.weekday().num_days_from_monday() as i64;
    let monday = now.date_naive() - Duration::days(days_from_monday);
    monday.and_time(NaiveTime::MIN)
}

pub fn create_reward(
    conn: &mut SqliteConnection,
    actor: &Actor,
    name: &str,
    cost: i32,
    limit_per_week: Option<i32>,
) -> Result<Reward, DomainError> {
    policy::require(actor, Op::CreateReward)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name is required"));
    }
    if cost < 0 {
        return Err(DomainError::validation("cost must be >= 0"));
    }
    if limit_per_week.is_some_and(|n| n <= 0) {
        return Err(DomainError::validation("limit_per_week must be > 0"));
    }

    let new = NewReward {
        name,
        cost,
        is_active: true,
        limit_per_week,
        created_by: actor.id,
        created_at: Utc::now().naive_utc(),
    };
    Ok(diesel::insert_into(rewards::table)
        .values(&new)
        .get_result::<Reward>(conn)?)
}

pub fn get_reward(conn: &mut SqliteConnection, reward_id: i32) -> Result<Reward, DomainError> {
    rewards::table
        .find(reward_id)
        .first::<Reward>(conn)
        .optional()?
        .ok_or_else(|| DomainError::not_found("reward not found"))
}

/// Catalog listing. Children only see what they can actually redeem;
/// parents and admins see retired rewards too.
pub fn list_rewards(
    conn: &mut SqliteConnection,
    actor: &Actor,
) -> Result<Vec<Reward>, DomainError> {
    let mut query = rewards::table.into_boxed();
    if actor.role == Role::Child {
        query = query.filter(rewards::is_active.eq(true));
    }
    Ok(query.order(rewards::id.asc()).load::<Reward>(conn)?)
}

/// Child asks to spend points on a reward. Creates a REQUESTED row with no
/// ledger effect.
pub fn request_redemption(
    conn: &mut SqliteConnection,
    actor: &Actor,
    reward_id: i32,
    note: Option<&str>,
) -> Result<RedemptionDetail, DomainError> {
    policy::require(actor, Op::RequestRedemption)?;
    let reward = get_reward(conn, reward_id)?;
    if !reward.is_active {
        return Err(DomainError::invalid_state("reward is not active"));
    }
    if ledger::total_points(conn, actor.id)? < i64::from(reward.cost) {
        return Err(DomainError::InsufficientFunds);
    }
    if let Some(limit) = reward.limit_per_week {
        let approved_this_week: i64 = redemptions::table
            .filter(redemptions::user_id.eq(actor.id))
            .filter(redemptions::reward_id.eq(reward_id))
            .filter(redemptions::status.eq(RedemptionStatus::Approved.as_str()))
            .filter(redemptions::updated_at.ge(start_of_week(Utc::now())))
            .count()
            .get_result(conn)?;
        if approved_this_week >= i64::from(limit) {
            return Err(DomainError::LimitExceeded);
        }
    }

    let now = Utc::now().naive_utc();
    let new = NewRedemption {
        reward_id,
        user_id: actor.id,
        status: RedemptionStatus::Requested.as_str(),
        note: note.map(str::trim).filter(|n| !n.is_empty()),
        created_at: now,
        updated_at: now,
    };
    let row = diesel::insert_into(redemptions::table)
        .values(&new)
        .get_result::<Redemption>(conn)?;
    detail_of(conn, row)
}

/// REQUESTED → APPROVED with the ledger debit, in one transaction. The
/// balance is re-checked here because it may have dropped since the request.
pub fn approve_redemption(
    conn: &mut SqliteConnection,
    actor: &Actor,
    redemption_id: i32,
    note: Option<&str>,
) -> Result<RedemptionDetail, DomainError> {
    policy::require(actor, Op::HandleRedemption)?;
    let redemption = load_redemption(conn, redemption_id)?;
    require_requested(&redemption)?;
    let reward = get_reward(conn, redemption.reward_id)?;
    if ledger::total_points(conn, redemption.user_id)? < i64::from(reward.cost) {
        return Err(DomainError::InsufficientFunds);
    }

    let row = diesel::update(redemptions::table.find(redemption_id))
        .set((
            redemptions::status.eq(RedemptionStatus::Approved.as_str()),
            redemptions::note.eq(note.filter(|n| !n.is_empty()).unwrap_or("Approved")),
            redemptions::handled_by.eq(Some(actor.id)),
            redemptions::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result::<Redemption>(conn)?;
    ledger::append_entry(
        conn,
        redemption.user_id,
        -reward.cost,
        &format!("Reward redeemed: {}", reward.name),
        LedgerRefType::Reward,
        Some(redemption_id),
    )?;
    detail_of(conn, row)
}

/// REQUESTED → DENIED. No ledger effect.
pub fn deny_redemption(
    conn: &mut SqliteConnection,
    actor: &Actor,
    redemption_id: i32,
    note: Option<&str>,
) -> Result<RedemptionDetail, DomainError> {
    policy::require(actor, Op::HandleRedemption)?;
    let redemption = load_redemption(conn, redemption_id)?;
    require_requested(&redemption)?;

    let row = diesel::update(redemptions::table.find(redemption_id))
        .set((
            redemptions::status.eq(RedemptionStatus::Denied.as_str()),
            redemptions::note.eq(note.filter(|n| !n.is_empty()).unwrap_or("Denied")),
            redemptions::handled_by.eq(Some(actor.id)),
            redemptions::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result::<Redemption>(conn)?;
    detail_of(conn, row)
}

/// Redemptions newest first. CHILD actors only see their own.
pub fn list_redemptions(
    conn: &mut SqliteConnection,
    actor: &Actor,
) -> Result<Vec<RedemptionDetail>, DomainError> {
    let mut query = redemptions::table
        .inner_join(rewards::table)
        .inner_join(users::table)
        .into_boxed();
    if actor.role == Role::Child {
        query = query.filter(redemptions::user_id.eq(actor.id));
    }
    let rows: Vec<(Redemption, String, i32, String)> = query
        .order(redemptions::id.desc())
        .select((
            Redemption::as_select(),
            rewards::name,
            rewards::cost,
            users::display_name,
        ))
        .load(conn)?;
    Ok(rows
        .into_iter()
        .map(
            |(redemption, reward_name, reward_cost, user_name)| RedemptionDetail {
                redemption,
                reward_name,
                reward_cost,
                user_name,
            },
        )
        .collect())
}

fn load_redemption(
    conn: &mut SqliteConnection,
    redemption_id: i32,
) -> Result<Redemption, DomainError> {
    redemptions::table
        .find(redemption_id)
        .first::<Redemption>(conn)
        .optional()?
        .ok_or_else(|| DomainError::not_found("redemption not found"))
}

fn require_requested(redemption: &Redemption) -> Result<(), DomainError> {
    if redemption.status != RedemptionStatus::Requested.as_str() {
        return Err(DomainError::invalid_state("redemption already handled"));
    }
    Ok(())
}

fn detail_of(
    conn: &mut SqliteConnection,
    redemption: Redemption,
) -> Result<RedemptionDetail, DomainError> {
    let (reward_name, reward_cost): (String, i32) = rewards::table
        .find(redemption.reward_id)
        .select((rewards::name, rewards::cost))
        .first(conn)?;
    let user_name: String = users::table
        .find(redemption.user_id)
        .select(users::display_name)
        .first(conn)?;
    Ok(RedemptionDetail {
        redemption,
        reward_name,
        reward_cost,
        user_name,
    })
}
