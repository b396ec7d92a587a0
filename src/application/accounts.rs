//! 账户业务：用户创建、OTP 登录、个人资料与仪表盘

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::store::{DuplicatePhone, Store};
use crate::domain::user::normalize_phone;
use crate::domain::{
    NewUser, Otp, PatientProfile, PatientProfileUpdate, User, UserProfile, UserProfileUpdate,
    UserType,
};
use crate::errors::{AppError, Result};
use crate::infrastructure::auth::{PasswordService, UserInfo};

/// 存储错误转换，手机号冲突单独映射为 Conflict
pub(crate) fn store_error(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<DuplicatePhone>() {
        Some(dup) => AppError::Conflict(dup.to_string()),
        None => AppError::from(err),
    }
}

/// 以手机号为唯一标识的用户管理器
#[derive(Clone)]
pub struct UserManager {
    store: Arc<dyn Store>,
}

impl UserManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn create(&self, phone: &str, password: Option<&str>, extra: NewUser) -> Result<User> {
        let phone = normalize_phone(phone)?;
        let password_hash = match password {
            Some(p) => Some(PasswordService::hash_password(p)?),
            None => None,
        };

        let user = User::new(phone, password_hash, extra);
        self.store.insert_user(&user).await.map_err(store_error)?;
        info!("Created user {}", user);
        Ok(user)
    }

    /// 创建普通用户
    pub async fn create_user(
        &self,
        phone: &str,
        password: Option<&str>,
        mut extra: NewUser,
    ) -> Result<User> {
        extra.is_staff.get_or_insert(false);
        extra.is_superuser.get_or_insert(false);
        self.create(phone, password, extra).await
    }

    /// 创建超级管理员，显式传入的权限标记必须为 true
    pub async fn create_superuser(
        &self,
        phone: &str,
        password: &str,
        mut extra: NewUser,
    ) -> Result<User> {
        let is_staff = *extra.is_staff.get_or_insert(true);
        let is_superuser = *extra.is_superuser.get_or_insert(true);
        extra.user_type.get_or_insert(UserType::Admin);

        if !is_staff {
            return Err(AppError::validation("Superuser must have is_staff=True."));
        }
        if !is_superuser {
            return Err(AppError::validation("Superuser must have is_superuser=True."));
        }

        self.create(phone, Some(password), extra).await
    }

    /// 按手机号查找，不存在时创建患者账户
    pub async fn get_or_create_patient(&self, phone: &str) -> Result<(User, bool)> {
        let phone = normalize_phone(phone)?;
        if let Some(user) = self.store.load_user_by_phone(&phone).await? {
            return Ok((user, false));
        }

        let extra = NewUser::default().with_user_type(UserType::Patient);
        match self.create_user(&phone, None, extra).await {
            Ok(user) => Ok((user, true)),
            // 并发请求抢先创建
            Err(AppError::Conflict(_)) => self
                .store
                .load_user_by_phone(&phone)
                .await?
                .map(|u| (u, false))
                .ok_or_else(|| AppError::Internal("user vanished after conflict".to_string())),
            Err(e) => Err(e),
        }
    }
}

/// 令牌对应的当前用户；已删除的账户视为未登录，停用的账户拒绝访问
pub async fn current_user(store: &dyn Store, info: &UserInfo) -> Result<User> {
    match store.load_user_by_id(&info.id).await? {
        Some(user) if user.is_active => Ok(user),
        Some(_) => Err(AppError::Forbidden("This account is inactive".to_string())),
        None => Err(AppError::Unauthorized("Unauthorized".to_string())),
    }
}

/// OTP 发放与校验
#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn Store>,
    users: UserManager,
    expiry_secs: i64,
}

impl OtpService {
    pub fn new(store: Arc<dyn Store>, expiry_secs: i64) -> Self {
        Self {
            users: UserManager::new(store.clone()),
            store,
            expiry_secs,
        }
    }

    /// 为手机号发放新的 OTP；首次出现的手机号自动注册为患者
    pub async fn send_otp(&self, phone: &str) -> Result<(User, Otp)> {
        let (user, created) = self.users.get_or_create_patient(phone).await?;
        if !user.is_active {
            return Err(AppError::Forbidden("This account is inactive".to_string()));
        }
        if created {
            info!("Registered new patient {}", user.phone_number);
        }

        let mut otp = Otp::new(&user.id);
        otp.prepare_for_save(self.expiry_secs, Utc::now().timestamp());

        debug!("Saving OTP for {}: {}", user.phone_number, otp.otp_code);
        if let Err(e) = self.store.save_otp(&otp).await {
            error!("Error saving OTP: {}", e);
            return Err(e.into());
        }

        info!("Generated new OTP for {}", user.phone_number);
        Ok((user, otp))
    }

    /// 校验最近一次未验证的 OTP，成功后返回登录用户
    pub async fn verify_otp(&self, phone: &str, code: &str) -> Result<User> {
        let phone = normalize_phone(phone)?;
        let code = code.trim();
        if !Otp::is_well_formed(code) {
            return Err(AppError::validation("OTP must be exactly 6 digits"));
        }

        let mut user = self
            .store
            .load_user_by_phone(&phone)
            .await?
            .ok_or_else(|| AppError::not_found("No account found for this phone number"))?;

        let mut otp = self
            .store
            .load_latest_pending_otp(&user.id)
            .await?
            .ok_or_else(|| AppError::validation("No pending OTP, please request a new one"))?;

        if otp.is_expired() {
            warn!("Expired OTP used for {}", phone);
            return Err(AppError::OtpExpired);
        }
        if !otp.matches(code) {
            warn!("Invalid OTP attempt for {}", phone);
            return Err(AppError::Unauthorized("Invalid OTP".to_string()));
        }
        if !user.is_active {
            return Err(AppError::Forbidden("This account is inactive".to_string()));
        }

        otp.mark_verified();
        self.store.save_otp(&otp).await?;

        user.last_login = Some(Utc::now().timestamp());
        user.touch();
        self.store.update_user(&user).await.map_err(store_error)?;

        info!("OTP verified for {}", phone);
        Ok(user)
    }
}

/// 手机号 + 密码登录（主要供后台账户使用）
pub async fn login(store: &dyn Store, phone: &str, password: &str) -> Result<User> {
    let invalid = || AppError::Unauthorized("Invalid phone number or password".to_string());

    let phone = normalize_phone(phone)?;
    let mut user = store.load_user_by_phone(&phone).await?.ok_or_else(invalid)?;
    let hash = user.password_hash.as_deref().ok_or_else(invalid)?;

    // bcrypt 解析失败也按密码错误处理
    if !PasswordService::verify_password(hash, password).unwrap_or(false) {
        return Err(invalid());
    }
    if !user.is_active {
        return Err(AppError::Forbidden("This account is inactive".to_string()));
    }

    user.last_login = Some(Utc::now().timestamp());
    user.touch();
    store.update_user(&user).await.map_err(store_error)?;
    Ok(user)
}

/// 个人资料页数据
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub user: User,
    pub profile: Option<UserProfile>,
    pub patient_profile: Option<PatientProfile>,
    pub age: Option<i32>,
}

/// 仪表盘数据，内容随账户类型不同
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub greeting: String,
    pub user_type: UserType,
    pub user_type_display: String,
    pub profile_complete: bool,
    pub patient_profile_complete: Option<bool>,
    pub age: Option<i32>,
    pub pending_actions: Vec<String>,
}

#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn Store>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn profile(&self, user: User) -> Result<ProfileView> {
        let profile = self.store.load_user_profile(&user.id).await?;
        let patient_profile = if user.is_patient() {
            self.store.load_patient_profile(&user.id).await?
        } else {
            None
        };
        let age = patient_profile
            .as_ref()
            .and_then(|p| p.calculate_age(Utc::now().date_naive()));

        Ok(ProfileView {
            user,
            profile,
            patient_profile,
            age,
        })
    }

    pub async fn edit_profile(&self, user: &User, update: UserProfileUpdate) -> Result<UserProfile> {
        let mut profile = self
            .store
            .load_user_profile(&user.id)
            .await?
            .unwrap_or_else(|| UserProfile::new(&user.id));

        profile.apply(update)?;
        self.store.save_user_profile(&profile).await?;
        info!("Updated profile of {}", user.phone_number);
        Ok(profile)
    }

    pub async fn edit_patient_profile(
        &self,
        user: &User,
        update: PatientProfileUpdate,
    ) -> Result<PatientProfile> {
        if !user.is_patient() {
            return Err(AppError::Forbidden(
                "Only patients have a patient profile".to_string(),
            ));
        }

        let mut profile = self
            .store
            .load_patient_profile(&user.id)
            .await?
            .unwrap_or_else(|| PatientProfile::new(&user.id));

        profile.apply(update)?;
        self.store.save_patient_profile(&profile).await?;
        info!("Updated patient profile of {}", user.phone_number);
        Ok(profile)
    }

    pub async fn dashboard(&self, user: User) -> Result<Dashboard> {
        let view = self.profile(user).await?;
        let user = &view.user;

        let name = view
            .profile
            .as_ref()
            .map(|p| p.full_name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| user.full_name());
        let greeting = if name.is_empty() {
            format!("Welcome, {}", user.phone_number)
        } else {
            format!("Welcome, {}", name)
        };

        let profile_complete = view
            .profile
            .as_ref()
            .is_some_and(|p| !p.full_name.is_empty() && p.address.is_some());

        let patient_profile_complete = user.is_patient().then(|| {
            view.patient_profile
                .as_ref()
                .is_some_and(|p| p.date_of_birth.is_some() && p.blood_group.is_some())
        });

        let mut pending_actions = Vec::new();
        if !profile_complete {
            pending_actions.push("Complete your profile".to_string());
        }
        if patient_profile_complete == Some(false) {
            pending_actions.push("Add your medical details".to_string());
        }
        match user.user_type {
            UserType::Hospital if !view.profile.as_ref().is_some_and(|p| p.has_location()) => {
                pending_actions.push("Set your hospital location".to_string());
            }
            UserType::Admin => pending_actions.push("Review registered users".to_string()),
            _ => {}
        }

        Ok(Dashboard {
            greeting,
            user_type: user.user_type,
            user_type_display: user.user_type.display().to_string(),
            profile_complete,
            patient_profile_complete,
            age: view.age,
            pending_actions,
        })
    }
}
