use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

use crate::storage::schema::{
    chore_assignments, chore_events, chores, ledger, redemptions, rewards, sessions, users,
};

// Enum-valued columns (role, status, recurrence, ref_type) are stored as
// upper-case text and parsed at the domain boundary.

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub password_hash: String,
    pub avatar: String,
    pub is_active: bool,
    pub must_change_password: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub display_name: &'a str,
    pub role: &'a str,
    pub password_hash: &'a str,
    pub avatar: &'a str,
    pub is_active: bool,
    pub must_change_password: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = chores)]
pub struct Chore {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub recurrence: String,
    pub due_date: Option<NaiveDate>,
    pub status: String,
    pub pending_actor: Option<i32>,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = chores)]
pub struct NewChore<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub points: i32,
    pub recurrence: &'a str,
    pub due_date: Option<NaiveDate>,
    pub status: &'a str,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = chore_assignments)]
pub struct NewChoreAssignment {
    pub chore_id: i32,
    pub user_id: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = chore_events)]
#[diesel(belongs_to(Chore, foreign_key = chore_id))]
pub struct ChoreEvent {
    pub id: i32,
    pub chore_id: i32,
    pub from_status: Option<String>,
    pub to_status: String,
    pub actor_id: i32,
    pub note: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = chore_events)]
pub struct NewChoreEvent<'a> {
    pub chore_id: i32,
    pub from_status: Option<&'a str>,
    pub to_status: &'a str,
    pub actor_id: i32,
    pub note: Option<&'a str>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = rewards)]
pub struct Reward {
    pub id: i32,
    pub name: String,
    pub cost: i32,
    pub is_active: bool,
    pub limit_per_week: Option<i32>,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = rewards)]
pub struct NewReward<'a> {
    pub name: &'a str,
    pub cost: i32,
    pub is_active: bool,
    pub limit_per_week: Option<i32>,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = redemptions)]
#[diesel(belongs_to(Reward, foreign_key = reward_id))]
pub struct Redemption {
    pub id: i32,
    pub reward_id: i32,
    pub user_id: i32,
    pub status: String,
    pub note: Option<String>,
    pub handled_by: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = redemptions)]
pub struct NewRedemption<'a> {
    pub reward_id: i32,
    pub user_id: i32,
    pub status: &'a str,
    pub note: Option<&'a str>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = ledger)]
pub struct LedgerEntry {
    pub id: i32,
    pub user_id: i32,
    pub delta: i32,
    pub reason: String,
    pub ref_type: String,
    pub ref_id: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = ledger)]
pub struct NewLedgerEntry<'a> {
    pub user_id: i32,
    pub delta: i32,
    pub reason: &'a str,
    pub ref_type: &'a str,
    pub ref_id: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = sessions)]
#[diesel(primary_key(jti))]
pub struct Session {
    pub jti: String,
    pub user_id: i32,
    pub issued_at: NaiveDateTime,
    pub last_used_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub jti: &'a str,
    pub user_id: i32,
}
