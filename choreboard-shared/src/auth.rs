use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of account roles. Stored as upper-case text in the database
/// and on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Parent,
    Child,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Parent => "PARENT",
            Role::Child => "CHILD",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown value: {0}")]
pub struct ParseEnumError(pub String);

impl FromStr for Role {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "PARENT" => Ok(Role::Parent),
            "CHILD" => Ok(Role::Child),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}
