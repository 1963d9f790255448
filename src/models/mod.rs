//! Directory models for the SMARTRASH portal
//!
//! Users and municipalities are maintained by the registration flows outside
//! this service; the core only reads them to authorize transitions and to
//! resolve whose wallet gets paid.

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// User roles, resolved once when the request is authenticated
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Customer,
    Agent,
    Municipality,
    Recycler,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Agent => "agent",
            UserRole::Municipality => "municipality",
            UserRole::Recycler => "recycler",
            UserRole::Admin => "admin",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(UserRole::Customer),
            // older tokens still carry the long agent name
            "agent" | "collection_agent" => Ok(UserRole::Agent),
            "municipality" => Ok(UserRole::Municipality),
            "recycler" => Ok(UserRole::Recycler),
            "admin" => Ok(UserRole::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Portal user
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
    pub municipality_id: Option<Uuid>,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Approved collection agent attached to the given municipality
    pub fn is_agent_of(&self, municipality_id: Uuid) -> bool {
        self.role == UserRole::Agent
            && self.is_approved
            && self.municipality_id == Some(municipality_id)
    }
}

/// Municipality (local government). Its wallet is the admin user's wallet.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Municipality {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub admin_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Authenticated caller attached to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: UserRole,
    /// Municipality the caller belongs to (or administers, for municipality users)
    pub municipality_id: Option<Uuid>,
}

impl Principal {
    pub fn new(user_id: Uuid, role: UserRole, municipality_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            role,
            municipality_id,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_agent_for(&self, municipality_id: Uuid) -> bool {
        self.role == UserRole::Agent && self.municipality_id == Some(municipality_id)
    }

    /// Municipality administered by this caller, if it is a municipality user
    pub fn administered_municipality(&self) -> Option<Uuid> {
        match self.role {
            UserRole::Municipality => self.municipality_id,
            _ => None,
        }
    }
}
