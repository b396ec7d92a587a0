//! 存储接口定义
//!
//! 提供持久化能力的抽象接口，支持内存和SQLite实现

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{Otp, PatientProfile, User, UserProfile, UserType};

pub mod memory;

pub use memory::MemoryStore;

/// 用户查询过滤器
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub user_type: Option<UserType>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    /// 手机号、名、姓的模糊搜索（不区分大小写）
    pub search: Option<String>,
}

impl UserFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_type(mut self, user_type: UserType) -> Self {
        self.user_type = Some(user_type);
        self
    }

    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    pub fn staff(mut self, is_staff: bool) -> Self {
        self.is_staff = Some(is_staff);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// 内存中判断是否命中，供 MemoryStore 使用
    pub fn matches(&self, user: &User) -> bool {
        if let Some(t) = self.user_type {
            if user.user_type != t {
                return false;
            }
        }
        if let Some(active) = self.is_active {
            if user.is_active != active {
                return false;
            }
        }
        if let Some(staff) = self.is_staff {
            if user.is_staff != staff {
                return false;
            }
        }
        if let Some(term) = self.search.as_deref() {
            let term = term.to_lowercase();
            return [&user.phone_number, &user.first_name, &user.last_name]
                .iter()
                .any(|field| field.to_lowercase().contains(&term));
        }
        true
    }
}

/// OTP 查询过滤器
#[derive(Debug, Clone, Default)]
pub struct OtpFilter {
    pub is_verified: Option<bool>,
    /// 按手机号或验证码搜索
    pub search: Option<String>,
    /// 创建时间下限（含）
    pub created_after: Option<i64>,
    /// 创建时间上限（含）
    pub created_before: Option<i64>,
    pub limit: Option<usize>,
}

impl OtpFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verified(mut self, is_verified: bool) -> Self {
        self.is_verified = Some(is_verified);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn created_after(mut self, ts: i64) -> Self {
        self.created_after = Some(ts);
        self
    }

    pub fn created_before(mut self, ts: i64) -> Self {
        self.created_before = Some(ts);
        self
    }

    /// 内存中判断创建时间是否在区间内
    pub fn in_created_range(&self, created_at: i64) -> bool {
        self.created_after.map_or(true, |t| created_at >= t)
            && self.created_before.map_or(true, |t| created_at <= t)
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

/// OTP 及其所属用户手机号（后台列表使用）
#[derive(Debug, Clone)]
pub struct OtpRecord {
    pub otp: Otp,
    pub phone_number: String,
}

impl fmt::Display for OtpRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.phone_number, self.otp.otp_code)
    }
}

/// 存储接口
///
/// 提供用户、OTP 与个人资料的持久化能力
#[async_trait]
pub trait Store: Send + Sync {
    /// 插入新用户；手机号重复时返回错误
    async fn insert_user(&self, user: &User) -> Result<()>;

    /// 更新已有用户
    async fn update_user(&self, user: &User) -> Result<()>;

    async fn load_user_by_id(&self, id: &str) -> Result<Option<User>>;

    async fn load_user_by_phone(&self, phone: &str) -> Result<Option<User>>;

    /// 按手机号升序返回
    async fn load_users(&self, filter: UserFilter) -> Result<Vec<User>>;

    async fn delete_user(&self, id: &str) -> Result<()>;

    async fn save_otp(&self, otp: &Otp) -> Result<()>;

    /// 用户最近一次尚未验证的 OTP
    async fn load_latest_pending_otp(&self, user_id: &str) -> Result<Option<Otp>>;

    /// 按创建时间倒序返回
    async fn load_otps(&self, filter: OtpFilter) -> Result<Vec<OtpRecord>>;

    /// 插入或覆盖（每个用户唯一）
    async fn save_user_profile(&self, profile: &UserProfile) -> Result<()>;

    async fn load_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    async fn load_user_profiles(&self) -> Result<Vec<UserProfile>>;

    /// 插入或覆盖（每个用户唯一）
    async fn save_patient_profile(&self, profile: &PatientProfile) -> Result<()>;

    async fn load_patient_profile(&self, user_id: &str) -> Result<Option<PatientProfile>>;

    async fn load_patient_profiles(&self) -> Result<Vec<PatientProfile>>;

    /// 是否已有用户
    async fn has_users(&self) -> Result<bool> {
        Ok(!self.load_users(UserFilter::new()).await?.is_empty())
    }
}

/// 手机号重复时 `insert_user` 返回的错误
#[derive(Debug, thiserror::Error)]
#[error("User with this phone number already exists: {0}")]
pub struct DuplicatePhone(pub String);
