//! 认证和授权模块
//!
//! 提供JWT令牌和密码哈希服务

use anyhow::Result;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::{User, UserType};

/// 默认令牌有效期：7天
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600 * 24 * 7;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub phone_number: String,
    pub user_type: UserType,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub exp: usize,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    ttl_secs: u64,
}

/// 令牌中携带的用户信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserInfo {
    pub id: String,
    pub phone_number: String,
    pub user_type: UserType,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            phone_number: user.phone_number.clone(),
            user_type: user.user_type,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
        }
    }
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self::with_ttl(secret, DEFAULT_TOKEN_TTL_SECS)
    }

    pub fn with_ttl(secret: &str, ttl_secs: u64) -> Self {
        let secret = secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            ttl_secs,
        }
    }

    pub fn generate_token(&self, user_info: &UserInfo) -> Result<String> {
        let expiration = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_secs()
            + self.ttl_secs) as usize;

        let claims = Claims {
            id: user_info.id.clone(),
            phone_number: user_info.phone_number.clone(),
            user_type: user_info.user_type,
            is_staff: user_info.is_staff,
            is_superuser: user_info.is_superuser,
            exp: expiration,
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?;
        Ok(token)
    }

    pub fn validate_token(&self, token: &str) -> Result<UserInfo> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        let claims = token_data.claims;

        Ok(UserInfo {
            id: claims.id,
            phone_number: claims.phone_number,
            user_type: claims.user_type,
            is_staff: claims.is_staff,
            is_superuser: claims.is_superuser,
        })
    }
}

pub struct PasswordService;

impl PasswordService {
    pub fn hash_password(password: &str) -> Result<String> {
        let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
        Ok(hash)
    }

    pub fn verify_password(hash: &str, password: &str) -> Result<bool> {
        let valid = bcrypt::verify(password, hash)?;
        Ok(valid)
    }
}
