//! Typed views over the `profiles` and `roles` collections.

use serde::{Deserialize, Serialize};
use veridoc_records::Record;

/// Closed role enumeration. Every signed-in principal has exactly one role or
/// none; anything unrecognized in the store resolves to none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Staff,
    Customer,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "administrator" => Some(Role::Administrator),
            "staff" => Some(Role::Staff),
            "customer" => Some(Role::Customer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Staff => "staff",
            Role::Customer => "customer",
        }
    }
}

/// A principal's profile row. Everything beyond id and email is nullable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub contact: Option<String>,
    pub balance: Option<f64>,
}

impl Profile {
    /// Parses a profile record; `None` when the row lacks an email.
    pub fn from_record(record: &Record) -> Option<Self> {
        let email = record.str_field("email")?.to_string();
        Some(Self {
            id: record.id.clone(),
            email,
            display_name: record.str_field("display_name").map(str::to_string),
            contact: record.str_field("contact").map(str::to_string),
            balance: record.fields.get("balance").and_then(|value| value.as_f64()),
        })
    }
}

/// The derived, cached view of a signed-in principal. Both halves are absent
/// until a resolution succeeds, and cleared the moment the principal is gone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedIdentity {
    pub role: Option<Role>,
    pub profile: Option<Profile>,
}
