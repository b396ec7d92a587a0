//! 配置管理
//!
//! 优先级：环境变量（含 `.env`） > YAML 配置文件 > 默认值

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::otp::DEFAULT_OTP_EXPIRY_SECS;
use crate::errors::{AppError, Result};
use crate::infrastructure::auth::DEFAULT_TOKEN_TTL_SECS;

/// 配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "MEDILINK_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "medilink.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP 监听地址
    pub bind_addr: String,
    /// SQLite 数据库路径
    pub db_path: String,
    pub jwt_secret: String,
    pub jwt_ttl_secs: u64,
    /// OTP 有效期（秒）
    pub otp_expiry_secs: i64,
    /// 在 send-otp 响应中返回验证码（仅开发环境）
    pub debug_otp: bool,
    /// 启动时确保存在的超级管理员
    pub admin_phone: Option<String>,
    pub admin_password: Option<String>,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            db_path: "medilink.db".to_string(),
            jwt_secret: "default_secret_key_for_dev".to_string(),
            jwt_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            otp_expiry_secs: DEFAULT_OTP_EXPIRY_SECS,
            debug_otp: false,
            admin_phone: None,
            admin_password: None,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// 加载完整配置
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// 用环境变量覆盖；`lookup` 便于测试注入
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("DB_PATH") {
            self.db_path = v;
        }
        if let Some(v) = lookup("JWT_SECRET") {
            self.jwt_secret = v;
        }
        if let Some(v) = lookup("JWT_TTL_SECS") {
            self.jwt_ttl_secs = parse_number("JWT_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("OTP_EXPIRY_TIME") {
            self.otp_expiry_secs = parse_number("OTP_EXPIRY_TIME", &v)?;
        }
        if let Some(v) = lookup("DEBUG_OTP") {
            self.debug_otp = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = lookup("ADMIN_PHONE") {
            self.admin_phone = Some(v);
        }
        if let Some(v) = lookup("ADMIN_PASSWORD") {
            self.admin_password = Some(v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    /// 是否仍在使用开发用的默认密钥
    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == Self::default().jwt_secret
    }

    pub fn validate(&self) -> Result<()> {
        if self.otp_expiry_secs <= 0 {
            return Err(AppError::Config(
                "OTP expiry must be a positive number of seconds".to_string(),
            ));
        }
        if self.jwt_secret.is_empty() {
            return Err(AppError::Config("JWT secret must not be empty".to_string()));
        }
        if self.admin_phone.is_some() != self.admin_password.is_some() {
            return Err(AppError::Config(
                "ADMIN_PHONE and ADMIN_PASSWORD must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{} must be a number, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides_yaml() {
        let mut config = AppConfig::from_yaml("bind_addr: 0.0.0.0:9000\notp_expiry_secs: 120\n").unwrap();
        assert_eq!(config.otp_expiry_secs, 120);
        assert_eq!(config.db_path, "medilink.db");

        let env: HashMap<&str, &str> = [("OTP_EXPIRY_TIME", "300"), ("DEBUG_OTP", "true")].into();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.otp_expiry_secs, 300);
        assert!(config.debug_otp);
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let mut config = AppConfig::default();
        let result = config.apply_env(|k| (k == "OTP_EXPIRY_TIME").then(|| "ten".to_string()));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_admin_credentials_come_in_pairs() {
        let config = AppConfig {
            admin_phone: Some("+10000000".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
