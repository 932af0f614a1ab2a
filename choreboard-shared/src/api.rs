use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::domain::{ChoreStatus, LedgerRefType, Recurrence, RedemptionStatus};

// Requests carry role/recurrence as plain text so that an unknown value
// surfaces as a validation error from the core, not a deserialize failure.

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthReq {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
    pub user: UserDto,
}

// Users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDto {
    pub id: i32,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub avatar: String,
    pub is_active: bool,
    pub must_change_password: bool,
    pub created_at: String, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserReq {
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub password: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PatchUserReq {
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub avatar: Option<String>,
    pub is_active: Option<bool>,
    pub must_change_password: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetPasswordReq {
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangePasswordReq {
    pub old_password: String,
    pub new_password: String,
}

// Chores
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateChoreReq {
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub assignee_ids: Vec<i32>,
    #[serde(default)]
    pub recurrence: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoreDto {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub recurrence: Recurrence,
    pub due_date: Option<NaiveDate>,
    pub status: ChoreStatus,
    pub created_by: i32,
    pub created_at: String,
    pub assignee_ids: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssigneeDto {
    pub id: i32,
    pub username: String,
    pub display_name: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoreEventDto {
    pub id: i32,
    pub from_status: Option<ChoreStatus>,
    pub to_status: ChoreStatus,
    pub actor_id: i32,
    pub actor_name: String,
    pub note: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChoreDetailDto {
    #[serde(flatten)]
    pub chore: ChoreDto,
    pub assignees: Vec<AssigneeDto>,
    /// Full audit trail, newest first.
    pub events: Vec<ChoreEventDto>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NoteReq {
    pub note: Option<String>,
}

// Rewards & redemptions
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRewardReq {
    pub name: String,
    pub cost: i32,
    pub limit_per_week: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardDto {
    pub id: i32,
    pub name: String,
    pub cost: i32,
    pub is_active: bool,
    pub limit_per_week: Option<i32>,
    pub created_by: i32,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionDto {
    pub id: i32,
    pub reward_id: i32,
    pub reward_name: String,
    pub reward_cost: i32,
    pub user_id: i32,
    pub user_name: String,
    pub status: RedemptionStatus,
    pub note: Option<String>,
    pub handled_by: Option<i32>,
    pub created_at: String,
    pub updated_at: String,
}

// Ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntryDto {
    pub id: i32,
    pub user_id: i32,
    pub delta: i32,
    pub reason: String,
    pub ref_type: LedgerRefType,
    pub ref_id: Option<i32>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerResp {
    pub user_id: i32,
    pub total: i64,
    pub entries: Vec<LedgerEntryDto>,
}
