//! Domain Layer
//!
//! Core business entity definitions

pub mod chat;
pub mod otp;
pub mod profile;
pub mod user;

pub use otp::Otp;
pub use profile::{Gender, PatientProfile, PatientProfileUpdate, UserProfile, UserProfileUpdate};
pub use user::{NewUser, User, UserType};
