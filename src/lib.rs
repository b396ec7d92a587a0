//! 患者 / 医院账户服务
//!
//! 提供以下能力：
//! - 以手机号为标识的账户，OTP 验证登录
//! - 按账户类型区分的个人资料（患者、医院、管理员）
//! - 后台管理接口
//! - 聊天机器人接口骨架
//!
//! # 架构分层
//!
//! - `domain`: 领域实体
//! - `core`: 存储抽象
//! - `infrastructure`: 认证、SQLite、HTTP、日志
//! - `application`: 业务编排

pub mod application;
pub mod bootstrap;
pub mod config;
pub mod core;
pub mod domain;
pub mod errors;
pub mod infrastructure;

pub use application::{AdminService, OtpService, ProfileService, UserManager};
pub use config::AppConfig;
pub use crate::core::store::{MemoryStore, Store};
pub use errors::{AppError, Result};
pub use infrastructure::store::SqliteStore;
pub use infrastructure::web::{create_router, AppState};

/// 服务版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
