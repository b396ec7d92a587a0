//! 内存存储实现
//!
//! 数据仅在内存中，重启后丢失

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{Otp, PatientProfile, User, UserProfile};

use super::{DuplicatePhone, OtpFilter, OtpRecord, Store, UserFilter};

/// 内存存储
///
/// 使用内存数据结构存储所有数据，适合测试和无需持久化的场景
pub struct MemoryStore {
    users: RwLock<HashMap<String, User>>,
    otps: RwLock<Vec<Otp>>,
    user_profiles: RwLock<HashMap<String, UserProfile>>,
    patient_profiles: RwLock<HashMap<String, PatientProfile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            otps: RwLock::new(Vec::new()),
            user_profiles: RwLock::new(HashMap::new()),
            patient_profiles: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.phone_number == user.phone_number) {
            return Err(DuplicatePhone(user.phone_number.clone()).into());
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.phone_number == user.phone_number && u.id != user.id)
        {
            return Err(DuplicatePhone(user.phone_number.clone()).into());
        }
        match users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(anyhow!("User not found: {}", user.id)),
        }
    }

    async fn load_user_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn load_user_by_phone(&self, phone: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.phone_number == phone).cloned())
    }

    async fn load_users(&self, filter: UserFilter) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let mut result: Vec<User> = users.values().filter(|u| filter.matches(u)).cloned().collect();
        result.sort_by(|a, b| a.phone_number.cmp(&b.phone_number));
        Ok(result)
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        self.users.write().await.remove(id);
        // 级联删除
        self.otps.write().await.retain(|o| o.user_id != id);
        self.user_profiles.write().await.remove(id);
        self.patient_profiles.write().await.remove(id);
        Ok(())
    }

    async fn save_otp(&self, otp: &Otp) -> Result<()> {
        if !self.users.read().await.contains_key(&otp.user_id) {
            return Err(anyhow!("OTP references unknown user: {}", otp.user_id));
        }
        let mut otps = self.otps.write().await;
        match otps.iter_mut().find(|o| o.id == otp.id) {
            Some(stored) => *stored = otp.clone(),
            None => otps.push(otp.clone()),
        }
        Ok(())
    }

    async fn load_latest_pending_otp(&self, user_id: &str) -> Result<Option<Otp>> {
        let otps = self.otps.read().await;
        // max_by_key 在并列时取最后一个，即同一秒内最后插入的
        Ok(otps
            .iter()
            .filter(|o| o.user_id == user_id && !o.is_verified)
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn load_otps(&self, filter: OtpFilter) -> Result<Vec<OtpRecord>> {
        let users = self.users.read().await;
        let otps = self.otps.read().await;
        let search = filter.search.as_deref().map(str::to_lowercase);

        let mut result: Vec<OtpRecord> = otps
            .iter()
            .rev()
            .filter_map(|otp| {
                let phone_number = users.get(&otp.user_id)?.phone_number.clone();
                Some(OtpRecord {
                    otp: otp.clone(),
                    phone_number,
                })
            })
            .filter(|r| filter.is_verified.map_or(true, |v| r.otp.is_verified == v))
            .filter(|r| filter.in_created_range(r.otp.created_at))
            .filter(|r| match &search {
                Some(term) => {
                    r.phone_number.to_lowercase().contains(term) || r.otp.otp_code.contains(term)
                }
                None => true,
            })
            .collect();

        result.sort_by_key(|r| std::cmp::Reverse(r.otp.created_at));
        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    async fn save_user_profile(&self, profile: &UserProfile) -> Result<()> {
        if !self.users.read().await.contains_key(&profile.user_id) {
            return Err(anyhow!("Profile references unknown user: {}", profile.user_id));
        }
        self.user_profiles
            .write()
            .await
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn load_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.user_profiles.read().await.get(user_id).cloned())
    }

    async fn load_user_profiles(&self) -> Result<Vec<UserProfile>> {
        Ok(self.user_profiles.read().await.values().cloned().collect())
    }

    async fn save_patient_profile(&self, profile: &PatientProfile) -> Result<()> {
        if !self.users.read().await.contains_key(&profile.user_id) {
            return Err(anyhow!("Profile references unknown user: {}", profile.user_id));
        }
        self.patient_profiles
            .write()
            .await
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn load_patient_profile(&self, user_id: &str) -> Result<Option<PatientProfile>> {
        Ok(self.patient_profiles.read().await.get(user_id).cloned())
    }

    async fn load_patient_profiles(&self) -> Result<Vec<PatientProfile>> {
        Ok(self.patient_profiles.read().await.values().cloned().collect())
    }
}
