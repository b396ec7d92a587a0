//! 基础设施层：外部系统交互
//!
//! 提供认证、持久化、HTTP 与日志能力

pub mod auth;
pub mod logger;
pub mod store;
pub mod web;
