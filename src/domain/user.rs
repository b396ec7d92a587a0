//! User Authentication Related Models

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

/// Maximum stored length of a phone number
pub const PHONE_MAX_LEN: usize = 15;

/// Account type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserType {
    #[default]
    Patient,
    Hospital,
    Admin,
}

impl UserType {
    /// Storage / wire code
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Patient => "PATIENT",
            UserType::Hospital => "HOSPITAL",
            UserType::Admin => "ADMIN",
        }
    }

    /// Human readable label
    pub fn display(&self) -> &'static str {
        match self {
            UserType::Patient => "Patient",
            UserType::Hospital => "Hospital",
            UserType::Admin => "Admin",
        }
    }
}

impl std::str::FromStr for UserType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "PATIENT" => Ok(UserType::Patient),
            "HOSPITAL" => Ok(UserType::Hospital),
            "ADMIN" => Ok(UserType::Admin),
            _ => Err(AppError::validation(format!("Unknown user type: {}", s))),
        }
    }
}

/// User Model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub phone_number: String,
    pub user_type: UserType,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub last_login: Option<i64>,
    pub date_joined: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    /// Build an unsaved user from a validated phone number and extra fields.
    ///
    /// `is_staff` / `is_superuser` left unset in `extra` fall back to `false`.
    pub fn new(phone_number: String, password_hash: Option<String>, extra: NewUser) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            phone_number,
            user_type: extra.user_type.unwrap_or_default(),
            first_name: extra.first_name.unwrap_or_default(),
            last_name: extra.last_name.unwrap_or_default(),
            email: extra.email,
            password_hash,
            is_active: extra.is_active.unwrap_or(true),
            is_staff: extra.is_staff.unwrap_or(false),
            is_superuser: extra.is_superuser.unwrap_or(false),
            last_login: None,
            date_joined: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_patient(&self) -> bool {
        self.user_type == UserType::Patient
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn has_usable_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Refresh `updated_at`; call before every save of an existing row.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp();
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.phone_number, self.user_type.display())
    }
}

/// Optional fields accepted when creating a user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub user_type: Option<UserType>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
}

impl NewUser {
    pub fn with_user_type(mut self, user_type: UserType) -> Self {
        self.user_type = Some(user_type);
        self
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    pub fn with_staff(mut self, is_staff: bool) -> Self {
        self.is_staff = Some(is_staff);
        self
    }

    pub fn with_superuser(mut self, is_superuser: bool) -> Self {
        self.is_superuser = Some(is_superuser);
        self
    }
}

fn phone_regex() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(r"^\+?[0-9]+$").expect("static phone pattern"))
}

/// Trim and validate a phone number used as login identifier
pub fn normalize_phone(phone: &str) -> Result<String> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(AppError::validation("The phone number must be set"));
    }
    if phone.len() > PHONE_MAX_LEN {
        return Err(AppError::validation(format!(
            "Phone number must be at most {} characters",
            PHONE_MAX_LEN
        )));
    }
    if !phone_regex().is_match(phone) {
        return Err(AppError::validation("Phone number must contain only digits"));
    }
    Ok(phone.to_string())
}
