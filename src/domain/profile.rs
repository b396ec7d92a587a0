//! Profile extensions attached one-to-one to a user

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

/// Extended profile information for all users
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub profile_picture: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn has_location(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Apply only the fields present in `update`
    pub fn apply(&mut self, update: UserProfileUpdate) -> Result<()> {
        if let Some(lat) = update.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(AppError::validation("Latitude must be between -90 and 90"));
            }
        }
        if let Some(lng) = update.longitude {
            if !(-180.0..=180.0).contains(&lng) {
                return Err(AppError::validation(
                    "Longitude must be between -180 and 180",
                ));
            }
        }
        if let Some(email) = update.email.as_deref() {
            if !email.is_empty() && !email.contains('@') {
                return Err(AppError::validation("Enter a valid email address"));
            }
        }

        if let Some(full_name) = update.full_name {
            self.full_name = full_name;
        }
        if update.email.is_some() {
            self.email = update.email.filter(|e| !e.is_empty());
        }
        if update.profile_picture.is_some() {
            self.profile_picture = update.profile_picture;
        }
        if update.address.is_some() {
            self.address = update.address;
        }
        if update.latitude.is_some() {
            self.latitude = update.latitude;
        }
        if update.longitude.is_some() {
            self.longitude = update.longitude;
        }
        Ok(())
    }
}

impl fmt::Display for UserProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Profile of {}", self.user_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfileUpdate {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub profile_picture: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "O")]
    Other,
}

impl Gender {
    pub fn code(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Other => "O",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "M" => Some(Gender::Male),
            "F" => Some(Gender::Female),
            "O" => Some(Gender::Other),
            _ => None,
        }
    }
}

/// Additional profile information specific to patients
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientProfile {
    pub user_id: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub blood_group: Option<String>,
    pub emergency_contact: Option<String>,
    pub allergies: Option<String>,
    pub chronic_diseases: Option<String>,
}

impl PatientProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Age in whole years as of `today`
    pub fn calculate_age(&self, today: NaiveDate) -> Option<i32> {
        let dob = self.date_of_birth?;
        let before_birthday = (today.month(), today.day()) < (dob.month(), dob.day());
        Some(today.year() - dob.year() - i32::from(before_birthday))
    }

    pub fn apply(&mut self, update: PatientProfileUpdate) -> Result<()> {
        if let Some(group) = update.blood_group.as_deref() {
            if group.len() > 5 {
                return Err(AppError::validation(
                    "Blood group must be at most 5 characters",
                ));
            }
        }
        if let Some(contact) = update.emergency_contact.as_deref() {
            if contact.len() > crate::domain::user::PHONE_MAX_LEN {
                return Err(AppError::validation(
                    "Emergency contact must be at most 15 characters",
                ));
            }
        }

        if update.date_of_birth.is_some() {
            self.date_of_birth = update.date_of_birth;
        }
        if update.gender.is_some() {
            self.gender = update.gender;
        }
        if update.blood_group.is_some() {
            self.blood_group = update.blood_group;
        }
        if update.emergency_contact.is_some() {
            self.emergency_contact = update.emergency_contact;
        }
        if update.allergies.is_some() {
            self.allergies = update.allergies;
        }
        if update.chronic_diseases.is_some() {
            self.chronic_diseases = update.chronic_diseases;
        }
        Ok(())
    }
}

impl fmt::Display for PatientProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Patient Profile of {}", self.user_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientProfileUpdate {
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub blood_group: Option<String>,
    pub emergency_contact: Option<String>,
    pub allergies: Option<String>,
    pub chronic_diseases: Option<String>,
}
