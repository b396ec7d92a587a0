//! OTP 相关模型

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// OTP 位数
pub const OTP_LENGTH: usize = 6;

/// 默认有效期（秒）
pub const DEFAULT_OTP_EXPIRY_SECS: i64 = 10 * 60;

/// 手机验证用的一次性密码
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Otp {
    pub id: String,
    pub user_id: String,
    pub otp_code: String,
    pub is_verified: bool,
    pub created_at: i64,
    pub expires_at: Option<i64>, // 过期时间戳（秒）
}

impl Otp {
    /// 新建尚未保存的 OTP：验证码为空，无过期时间
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            otp_code: String::new(),
            is_verified: false,
            created_at: chrono::Utc::now().timestamp(),
            expires_at: None,
        }
    }

    /// 生成 6 位数字验证码（允许前导 0）
    pub fn generate_code() -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        (0..OTP_LENGTH)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    /// 保存前补全缺失字段：验证码与过期时间
    pub fn prepare_for_save(&mut self, expiry_secs: i64, now: i64) {
        if self.otp_code.is_empty() {
            self.otp_code = Self::generate_code();
            debug!("Generated OTP code for user {}", self.user_id);
        }

        if self.expires_at.is_none() {
            let expires_at = now + expiry_secs;
            self.expires_at = Some(expires_at);
            debug!("Set expiry time for OTP: {}", expires_at);
        }
    }

    /// 未设置过期时间的 OTP 一律视为已过期
    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now > expires_at,
            None => true,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }

    pub fn matches(&self, code: &str) -> bool {
        !self.otp_code.is_empty() && self.otp_code == code.trim()
    }

    pub fn is_well_formed(code: &str) -> bool {
        code.len() == OTP_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
    }

    pub fn mark_verified(&mut self) {
        self.is_verified = true;
    }
}

impl fmt::Display for Otp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.user_id, self.otp_code)
    }
}
