use serde::{Deserialize, Serialize};

/// Identity record for a logged-in account.
///
/// Field names follow the backend JSON; timestamps are kept as the
/// server-provided strings since their format is not part of the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(rename = "phoneNo", default)]
    pub phone_no: String,
    #[serde(rename = "firstName", default)]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", default)]
    pub last_name: Option<String>,
    #[serde(rename = "fullName", default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: i64,
    #[serde(rename = "isVerified", default)]
    pub is_verified: bool,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: String,
}

impl User {
    /// Display name: full name when the profile has one, phone number otherwise.
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.phone_no,
        }
    }
}

/// Account role on the NearBy platform.
///
/// `/auth/initiate` takes the lowercase string form; `/auth/verify` takes
/// the numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Requester,
    Provider,
}

impl Role {
    /// Numeric wire code used by the verify endpoint.
    pub fn code(&self) -> u8 {
        match self {
            Role::Requester => 1,
            Role::Provider => 2,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Requester => write!(f, "requester"),
            Role::Provider => write!(f, "provider"),
        }
    }
}
