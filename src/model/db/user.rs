use std::fmt::Display;
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::mongodb::{is_duplicate_key_error, Coll, Id};

/// User roles, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Voter,
    Admin,
}

impl Role {
    /// Does this role grant at least the privileges of `required`?
    ///
    /// This is the whole of the authorization decision; route guards and
    /// anything else that gates on role must go through here.
    pub fn permits(self, required: Role) -> bool {
        self >= required
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Voter => write!(f, "VOTER"),
            Self::Admin => write!(f, "ADMIN"),
        }
    }
}

/// Normalize an email address for storage and lookup: uniqueness is
/// case-insensitive, so the normalized form is what gets indexed.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Core user data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCore {
    pub name: String,
    /// Stored normalized (trimmed, lowercased); immutable after creation.
    pub email: String,
    /// Salted argon2 hash; the plaintext is never stored and the hash never
    /// leaves the database layer.
    pub password_hash: String,
    pub role: Role,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl UserCore {
    /// Create a new voter with a freshly salted password hash.
    ///
    /// Registration always produces a `VOTER`; admins are only created via
    /// the bootstrap path.
    pub fn new(name: String, email: String, password: &str) -> Result<Self> {
        let salt: [u8; 16] = rand::random();
        let password_hash =
            argon2::hash_encoded(password.as_bytes(), &salt, &argon2::Config::default())?;
        Ok(Self {
            name,
            email,
            password_hash,
            role: Role::Voter,
            created_at: Utc::now(),
        })
    }

    /// Check whether the given password is correct.
    pub fn verify_password(&self, password: &str) -> bool {
        // A malformed stored hash can only mean DB corruption; treat it as
        // a failed login rather than a panic.
        argon2::verify_encoded(&self.password_hash, password.as_bytes()).unwrap_or(false)
    }
}

/// A user without an ID.
pub type NewUser = UserCore;

/// A user from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub user: UserCore,
}

impl Deref for User {
    type Target = UserCore;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl DerefMut for User {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.user
    }
}

/// Ensure at least one admin account exists, creating one from the
/// configured credentials when the collection has none.
///
/// Registration never produces admins, so without this there would be no way
/// to reach the privileged election-management routes on a fresh deployment.
pub async fn ensure_admin_exists(
    users: &Coll<User>,
    new_users: &Coll<NewUser>,
    email: &str,
    password: &str,
) -> Result<()> {
    let existing = users.find_one(doc! { "role": "ADMIN" }, None).await?;
    if existing.is_some() {
        return Ok(());
    }

    let mut admin = NewUser::new("Administrator".to_string(), normalize_email(email), password)?;
    admin.role = Role::Admin;
    match new_users.insert_one(&admin, None).await {
        Ok(_) => {
            info!("Created bootstrap admin account");
            Ok(())
        }
        // Another instance won the race; the admin exists either way.
        Err(err) if is_duplicate_key_error(&err) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
        assert_eq!(normalize_email("bob@example.com"), "bob@example.com");
    }

    #[test]
    fn password_hash_round_trip() {
        let user = UserCore::new(
            "Alice".to_string(),
            "alice@example.com".to_string(),
            "correct horse",
        )
        .unwrap();

        assert!(user.verify_password("correct horse"));
        assert!(!user.verify_password("wrong horse"));
        // The plaintext must never be stored.
        assert_ne!(user.password_hash, "correct horse");
        assert!(user.password_hash.starts_with("$argon2"));
    }

    #[test]
    fn registration_is_always_voter() {
        let user = UserCore::new("Bob".to_string(), "bob@example.com".to_string(), "hunter22")
            .unwrap();
        assert_eq!(user.role, Role::Voter);
    }

    #[test]
    fn salts_are_unique() {
        let a = UserCore::new("A".to_string(), "a@example.com".to_string(), "password").unwrap();
        let b = UserCore::new("B".to_string(), "b@example.com".to_string(), "password").unwrap();
        assert_ne!(a.password_hash, b.password_hash);
    }

    #[test]
    fn role_authorization_matrix() {
        assert!(Role::Admin.permits(Role::Admin));
        assert!(Role::Admin.permits(Role::Voter));
        assert!(Role::Voter.permits(Role::Voter));
        assert!(!Role::Voter.permits(Role::Admin));
    }
}
