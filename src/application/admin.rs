//! 后台管理：用户与 OTP 的列表、检索、详情

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::store::{OtpFilter, Store, UserFilter};
use crate::domain::{NewUser, PatientProfile, User, UserProfile, UserType};
use crate::errors::{AppError, Result};

use super::accounts::UserManager;

/// 用户列表查询参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    pub user_type: Option<UserType>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub search: Option<String>,
}

impl From<UserQuery> for UserFilter {
    fn from(q: UserQuery) -> Self {
        UserFilter {
            user_type: q.user_type,
            is_active: q.is_active,
            is_staff: q.is_staff,
            search: q.search.filter(|s| !s.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRow {
    pub id: String,
    pub phone_number: String,
    pub user_type: UserType,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
}

impl From<User> for UserRow {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            phone_number: u.phone_number,
            user_type: u.user_type,
            first_name: u.first_name,
            last_name: u.last_name,
            is_active: u.is_active,
            is_staff: u.is_staff,
        }
    }
}

/// 用户详情页附带的资料
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "inline", content = "data", rename_all = "snake_case")]
pub enum Inline {
    UserProfile(Option<UserProfile>),
    PatientProfile(Option<PatientProfile>),
}

#[derive(Debug, Clone, Serialize)]
pub struct UserDetail {
    pub user: User,
    pub display: String,
    pub inlines: Vec<Inline>,
}

/// 后台新建用户表单
#[derive(Debug, Clone, Deserialize)]
pub struct AddUserForm {
    pub phone_number: String,
    pub password1: String,
    pub password2: String,
    #[serde(default)]
    pub user_type: UserType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OtpQuery {
    pub is_verified: Option<bool>,
    pub search: Option<String>,
    /// Unix 时间戳（秒）
    pub created_after: Option<i64>,
    pub created_before: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OtpRow {
    pub id: String,
    pub display: String,
    pub user: String,
    pub otp_code: String,
    pub is_verified: bool,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

/// 资料列表行，`display` 以手机号标识所属用户
#[derive(Debug, Clone, Serialize)]
pub struct ProfileRow<T> {
    pub display: String,
    #[serde(flatten)]
    pub profile: T,
}

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn Store>,
    users: UserManager,
}

impl AdminService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            users: UserManager::new(store.clone()),
            store,
        }
    }

    /// 仅限 staff 账户
    pub fn ensure_staff(user: &User) -> Result<()> {
        if user.is_staff {
            Ok(())
        } else {
            Err(AppError::Forbidden("Insufficient permissions".to_string()))
        }
    }

    pub async fn list_users(&self, query: UserQuery) -> Result<Vec<UserRow>> {
        let users = self.store.load_users(query.into()).await?;
        Ok(users.into_iter().map(UserRow::from).collect())
    }

    pub async fn user_detail(&self, user_id: &str) -> Result<UserDetail> {
        let user = self
            .store
            .load_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("User not found: {}", user_id)))?;

        let mut inlines = vec![Inline::UserProfile(
            self.store.load_user_profile(&user.id).await?,
        )];
        if user.is_patient() {
            inlines.push(Inline::PatientProfile(
                self.store.load_patient_profile(&user.id).await?,
            ));
        }

        Ok(UserDetail {
            display: user.to_string(),
            user,
            inlines,
        })
    }

    pub async fn add_user(&self, form: AddUserForm) -> Result<User> {
        if form.password1.is_empty() {
            return Err(AppError::validation("Password must not be empty"));
        }
        if form.password1 != form.password2 {
            return Err(AppError::validation("The two password fields didn't match."));
        }

        let extra = NewUser::default().with_user_type(form.user_type);
        self.users
            .create_user(&form.phone_number, Some(&form.password1), extra)
            .await
    }

    pub async fn list_otps(&self, query: OtpQuery) -> Result<Vec<OtpRow>> {
        let mut filter = OtpFilter::new();
        if let Some(v) = query.is_verified {
            filter = filter.verified(v);
        }
        if let Some(term) = query.search.filter(|s| !s.trim().is_empty()) {
            filter = filter.search(term);
        }
        if let Some(ts) = query.created_after {
            filter = filter.created_after(ts);
        }
        if let Some(ts) = query.created_before {
            filter = filter.created_before(ts);
        }
        if let Some(n) = query.limit {
            filter = filter.limit(n);
        }

        let records = self.store.load_otps(filter).await?;
        Ok(records
            .into_iter()
            .map(|r| OtpRow {
                display: r.to_string(),
                id: r.otp.id,
                user: r.phone_number,
                otp_code: r.otp.otp_code,
                is_verified: r.otp.is_verified,
                created_at: r.otp.created_at,
                expires_at: r.otp.expires_at,
            })
            .collect())
    }

    pub async fn list_user_profiles(&self) -> Result<Vec<ProfileRow<UserProfile>>> {
        let phones = self.phone_index().await?;
        let profiles = self.store.load_user_profiles().await?;
        Ok(profiles
            .into_iter()
            .map(|profile| ProfileRow {
                display: format!("Profile of {}", owner(&phones, &profile.user_id)),
                profile,
            })
            .collect())
    }

    pub async fn list_patient_profiles(&self) -> Result<Vec<ProfileRow<PatientProfile>>> {
        let phones = self.phone_index().await?;
        let profiles = self.store.load_patient_profiles().await?;
        Ok(profiles
            .into_iter()
            .map(|profile| ProfileRow {
                display: format!("Patient Profile of {}", owner(&phones, &profile.user_id)),
                profile,
            })
            .collect())
    }

    async fn phone_index(&self) -> Result<HashMap<String, String>> {
        let users = self.store.load_users(UserFilter::new()).await?;
        Ok(users.into_iter().map(|u| (u.id, u.phone_number)).collect())
    }
}

fn owner<'a>(phones: &'a HashMap<String, String>, user_id: &'a str) -> &'a str {
    phones.get(user_id).map(String::as_str).unwrap_or(user_id)
}
