//! 核心层：通用能力
//!
//! 存储抽象

pub mod store;
