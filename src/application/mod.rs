//! 应用层：业务编排

pub mod accounts;
pub mod admin;
pub mod chatbot;

pub use accounts::{OtpService, ProfileService, UserManager};
pub use admin::AdminService;
