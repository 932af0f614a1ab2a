use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::auth::ParseEnumError;

/// Lifecycle states of a chore instance. `Approved` and `Rejected` are
/// terminal for the instance, though a rejected chore may be re-submitted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChoreStatus {
    Assigned,
    DonePending,
    Approved,
    Rejected,
}

impl ChoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChoreStatus::Assigned => "ASSIGNED",
            ChoreStatus::DonePending => "DONE_PENDING",
            ChoreStatus::Approved => "APPROVED",
            ChoreStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ChoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChoreStatus {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASSIGNED" => Ok(ChoreStatus::Assigned),
            "DONE_PENDING" => Ok(ChoreStatus::DonePending),
            "APPROVED" => Ok(ChoreStatus::Approved),
            "REJECTED" => Ok(ChoreStatus::Rejected),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recurrence {
    None,
    Daily,
    Weekly,
}

impl Recurrence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::None => "NONE",
            Recurrence::Daily => "DAILY",
            Recurrence::Weekly => "WEEKLY",
        }
    }

    /// Due date for the successor occurrence spawned on approval.
    /// `None` recurrence never spawns, so the date passes through untouched.
    pub fn next_due(&self, due: NaiveDate) -> NaiveDate {
        match self {
            Recurrence::None => due,
            Recurrence::Daily => due + Days::new(1),
            Recurrence::Weekly => due + Days::new(7),
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(Recurrence::None),
            "DAILY" => Ok(Recurrence::Daily),
            "WEEKLY" => Ok(Recurrence::Weekly),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// `Requested` is the only non-terminal redemption state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedemptionStatus {
    Requested,
    Approved,
    Denied,
}

impl RedemptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionStatus::Requested => "REQUESTED",
            RedemptionStatus::Approved => "APPROVED",
            RedemptionStatus::Denied => "DENIED",
        }
    }
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RedemptionStatus {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUESTED" => Ok(RedemptionStatus::Requested),
            "APPROVED" => Ok(RedemptionStatus::Approved),
            "DENIED" => Ok(RedemptionStatus::Denied),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// What a ledger entry refers to. `AdminAdjust` exists for manual point
/// corrections; the API does not issue them but the ledger accepts them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerRefType {
    Chore,
    Reward,
    AdminAdjust,
}

impl LedgerRefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerRefType::Chore => "CHORE",
            LedgerRefType::Reward => "REWARD",
            LedgerRefType::AdminAdjust => "ADMIN_ADJUST",
        }
    }
}

impl fmt::Display for LedgerRefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerRefType {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CHORE" => Ok(LedgerRefType::Chore),
            "REWARD" => Ok(LedgerRefType::Reward),
            "ADMIN_ADJUST" => Ok(LedgerRefType::AdminAdjust),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}
