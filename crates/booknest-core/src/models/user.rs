use serde::{Deserialize, Serialize};

use crate::time::{iso_millis, new_id, now, Timestamp};
use crate::{BookNestError, Result};

pub const DEFAULT_USER_IMAGE: &str = "/images/tt4.jpg";
pub const STARTING_GOLDCARD: u32 = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(BookNestError::validation(format!("unknown role '{}'", other))),
        }
    }
}

fn default_user_image() -> String {
    DEFAULT_USER_IMAGE.to_string()
}

fn default_goldcard() -> u32 {
    STARTING_GOLDCARD
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string.
    pub password: String,
    #[serde(default = "default_user_image")]
    pub image: String,
    #[serde(default = "default_goldcard")]
    pub goldcard: u32,
    #[serde(default)]
    pub role: Role,
    #[serde(rename = "createdAt", with = "iso_millis")]
    pub created_at: Timestamp,
    #[serde(rename = "updatedAt", with = "iso_millis")]
    pub updated_at: Timestamp,
}

impl User {
    /// Validates the account fields and builds a fresh user around an already hashed password.
    pub fn new(username: &str, email: &str, password_hash: String) -> Result<Self> {
        let username = username.trim();
        let email = email.trim();
        validate_username(username)?;
        validate_email(email)?;
        let ts = now();
        Ok(Self {
            id: new_id(),
            username: username.to_string(),
            email: email.to_lowercase(),
            password: password_hash,
            image: default_user_image(),
            goldcard: STARTING_GOLDCARD,
            role: Role::User,
            created_at: ts,
            updated_at: ts,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(6..=24).contains(&len) {
        return Err(BookNestError::validation(
            "username must be between 6 and 24 characters",
        ));
    }
    if !username
        .chars()
        .last()
        .is_some_and(|c| c.is_ascii_alphanumeric())
    {
        return Err(BookNestError::validation("tên đăng nhập không hợp lệ"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    let invalid = || BookNestError::validation("email không hợp lệ");
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || email.chars().any(|c| c.is_whitespace() || "<>()[]\\,;:\"".contains(c))
    {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2
        || labels
            .iter()
            .any(|l| l.is_empty() || !l.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
    {
        return Err(invalid());
    }
    let tld = labels.last().copied().unwrap_or_default();
    if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.trim().chars().count() < 8 {
        return Err(BookNestError::validation(
            "password must be at least 8 characters",
        ));
    }
    Ok(())
}

/// A user without the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub image: String,
    pub goldcard: u32,
    pub role: Role,
    #[serde(rename = "createdAt", with = "iso_millis")]
    pub created_at: Timestamp,
    #[serde(rename = "updatedAt", with = "iso_millis")]
    pub updated_at: Timestamp,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            image: user.image.clone(),
            goldcard: user.goldcard,
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Shape used when a user is embedded in another document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserBrief {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub image: String,
}

impl From<&User> for UserBrief {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            image: user.image.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct UserStats {
    #[serde(rename = "chapCount")]
    pub chap_count: u64,
    pub posted: u64,
    pub followed: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: PublicUser,
    #[serde(flatten)]
    pub stats: UserStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(validate_username("reader1").is_ok());
        assert!(validate_username("short").is_err());
        assert!(validate_username("endswith_").is_err());
        assert!(validate_username(&"a".repeat(25)).is_err());
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("reader@example.com").is_ok());
        assert!(validate_email("a.b@sub.example.vn").is_ok());
        assert!(validate_email("no-at-sign.com").is_err());
        assert!(validate_email("x@nodot").is_err());
        assert!(validate_email("x@example.c").is_err());
        assert!(validate_email("two words@example.com").is_err());
    }

    #[test]
    fn new_user_gets_defaults_and_hides_password() {
        let user = User::new("  reader01 ", "Reader@Example.com", "hash".into()).unwrap();
        assert_eq!(user.username, "reader01");
        assert_eq!(user.email, "reader@example.com");
        assert_eq!(user.goldcard, STARTING_GOLDCARD);
        assert_eq!(user.role, Role::User);

        let json = serde_json::to_value(PublicUser::from(&user)).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["role"], "user");
        assert_eq!(json["_id"], user.id.as_str());
    }
}
