use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::entity::{Entity, EntityBase};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub base: EntityBase,
    pub username: String,
    pub email: String,                // unique, including soft-deleted rows
    pub password: String,             // Argon2 hash, never the plaintext
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub is_active: bool,              // flipped by OTP verification
}

impl Entity for User {
    const NAME: &'static str = "User";

    fn base(&self) -> &EntityBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EntityBase {
        &mut self.base
    }
}
