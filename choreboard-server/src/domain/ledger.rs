//! Append-only point ledger. A user's balance is always the sum of their
//! entries; no running total is stored anywhere, so the balance can never
//! drift from its audit trail.

use chrono::Utc;
use choreboard_shared::domain::LedgerRefType;
use diesel::dsl::sum;
use diesel::prelude::*;

use super::error::DomainError;
use crate::storage::models::{LedgerEntry, NewLedgerEntry};
use crate::storage::schema::ledger;

/// Sum of all deltas for the user, 0 when there are none. O(n) over the
/// user's entries, which is fine at household scale.
pub fn total_points(conn: &mut SqliteConnection, user_id: i32) -> Result<i64, DomainError> {
    let total: Option<i64> = ledger::table
        .filter(ledger::user_id.eq(user_id))
        .select(sum(ledger::delta))
        .first(conn)?;
    Ok(total.unwrap_or(0))
}

/// Appends one signed entry. Deliberately validates neither sign nor
/// magnitude; callers enforce business rules before posting.
pub fn append_entry(
    conn: &mut SqliteConnection,
    user_id: i32,
    delta: i32,
    reason: &str,
    ref_type: LedgerRefType,
    ref_id: Option<i32>,
) -> Result<i32, DomainError> {
    let entry = NewLedgerEntry {
        user_id,
        delta,
        reason,
        ref_type: ref_type.as_str(),
        ref_id,
        created_at: Utc::now().naive_utc(),
    };
    let id = diesel::insert_into(ledger::table)
        .values(&entry)
        .returning(ledger::id)
        .get_result::<i32>(conn)?;
    Ok(id)
}

/// All entries for the user, most recent first.
pub fn list_entries(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> Result<Vec<LedgerEntry>, DomainError> {
    Ok(ledger::table
        .filter(ledger::user_id.eq(user_id))
        .order(ledger::id.desc())
        .load::<LedgerEntry>(conn)?)
}
