//! SQLite 存储实现
//!
//! 使用 SQLite 作为后端，适合需要持久化的场景

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};

use crate::core::store::{DuplicatePhone, OtpFilter, OtpRecord, Store, UserFilter};
use crate::domain::{Gender, Otp, PatientProfile, User, UserProfile, UserType};
use crate::errors::AppError;

const USER_COLUMNS: &str = "id, phone_number, user_type, first_name, last_name, email, password_hash,
     is_active, is_staff, is_superuser, last_login, date_joined, created_at, updated_at";

const PATIENT_COLUMNS: &str = "user_id, date_of_birth, gender, blood_group, emergency_contact,
     allergies, chronic_diseases";

const USER_PROFILE_COLUMNS: &str =
    "user_id, full_name, email, profile_picture, address, latitude, longitude";

/// SQLite 存储
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 创建新的 SQLite 存储
    ///
    /// 如果数据库文件不存在，会自动创建
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// 创建内存数据库（用于测试）
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// 初始化数据库表结构
    fn init_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to acquire database lock: {}", e))?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            -- 用户表
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                phone_number TEXT UNIQUE NOT NULL,
                user_type TEXT NOT NULL DEFAULT 'PATIENT',
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL DEFAULT '',
                email TEXT,
                password_hash TEXT,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                is_staff BOOLEAN NOT NULL DEFAULT 0,
                is_superuser BOOLEAN NOT NULL DEFAULT 0,
                last_login INTEGER,
                date_joined INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- OTP 表
            CREATE TABLE IF NOT EXISTS otps (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                otp_code TEXT NOT NULL,
                is_verified BOOLEAN NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                expires_at INTEGER,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- 通用资料表
            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id TEXT PRIMARY KEY,
                full_name TEXT NOT NULL DEFAULT '',
                email TEXT,
                profile_picture TEXT,
                address TEXT,
                latitude REAL,
                longitude REAL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- 患者资料表
            CREATE TABLE IF NOT EXISTS patient_profiles (
                user_id TEXT PRIMARY KEY,
                date_of_birth TEXT,
                gender TEXT,
                blood_group TEXT,
                emergency_contact TEXT,
                allergies TEXT,
                chronic_diseases TEXT,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_users_user_type ON users(user_type);
            CREATE INDEX IF NOT EXISTS idx_otps_user ON otps(user_id, is_verified);
            CREATE INDEX IF NOT EXISTS idx_otps_created ON otps(created_at);
            ",
        )?;

        Ok(())
    }

    /// 在阻塞线程池中执行数据库操作
    async fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("Failed to acquire database lock: {}", e))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| anyhow::anyhow!("Task failed: {}", e))?
    }
}

/// 文本列解析失败时的转换错误
fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let user_type: String = row.get(2)?;
    Ok(User {
        id: row.get(0)?,
        phone_number: row.get(1)?,
        user_type: user_type
            .parse::<UserType>()
            .map_err(|e| conversion_error(2, e))?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        email: row.get(5)?,
        password_hash: row.get(6)?,
        is_active: row.get(7)?,
        is_staff: row.get(8)?,
        is_superuser: row.get(9)?,
        last_login: row.get(10)?,
        date_joined: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn otp_from_row(row: &Row<'_>) -> rusqlite::Result<Otp> {
    Ok(Otp {
        id: row.get(0)?,
        user_id: row.get(1)?,
        otp_code: row.get(2)?,
        is_verified: row.get(3)?,
        created_at: row.get(4)?,
        expires_at: row.get(5)?,
    })
}

fn user_profile_from_row(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        user_id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        profile_picture: row.get(3)?,
        address: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
    })
}

fn patient_profile_from_row(row: &Row<'_>) -> rusqlite::Result<PatientProfile> {
    let dob: Option<String> = row.get(1)?;
    let gender: Option<String> = row.get(2)?;

    let date_of_birth = dob
        .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
        .transpose()
        .map_err(|e| conversion_error(1, e))?;
    let gender = gender
        .map(|code| {
            Gender::from_code(&code).ok_or_else(|| {
                conversion_error(2, AppError::validation(format!("Unknown gender: {}", code)))
            })
        })
        .transpose()?;

    Ok(PatientProfile {
        user_id: row.get(0)?,
        date_of_birth,
        gender,
        blood_group: row.get(3)?,
        emergency_contact: row.get(4)?,
        allergies: row.get(5)?,
        chronic_diseases: row.get(6)?,
    })
}

/// 子串匹配用的 LIKE 模式，反斜杠为转义符
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// 把唯一约束冲突翻译成 `DuplicatePhone`
fn map_user_write_error(err: rusqlite::Error, phone: &str) -> anyhow::Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            DuplicatePhone(phone.to_string()).into()
        }
        _ => err.into(),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let user = user.clone();
        self.execute(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    USER_COLUMNS
                ),
                rusqlite::params![
                    &user.id,
                    &user.phone_number,
                    user.user_type.as_str(),
                    &user.first_name,
                    &user.last_name,
                    user.email.as_deref(),
                    user.password_hash.as_deref(),
                    user.is_active,
                    user.is_staff,
                    user.is_superuser,
                    user.last_login,
                    user.date_joined,
                    user.created_at,
                    user.updated_at,
                ],
            )
            .map_err(|e| map_user_write_error(e, &user.phone_number))?;
            Ok(())
        })
        .await
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let user = user.clone();
        self.execute(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE users SET
                        phone_number = ?2, user_type = ?3, first_name = ?4, last_name = ?5,
                        email = ?6, password_hash = ?7, is_active = ?8, is_staff = ?9,
                        is_superuser = ?10, last_login = ?11, updated_at = ?12
                     WHERE id = ?1",
                    rusqlite::params![
                        &user.id,
                        &user.phone_number,
                        user.user_type.as_str(),
                        &user.first_name,
                        &user.last_name,
                        user.email.as_deref(),
                        user.password_hash.as_deref(),
                        user.is_active,
                        user.is_staff,
                        user.is_superuser,
                        user.last_login,
                        user.updated_at,
                    ],
                )
                .map_err(|e| map_user_write_error(e, &user.phone_number))?;

            if changed == 0 {
                return Err(anyhow::anyhow!("User not found: {}", user.id));
            }
            Ok(())
        })
        .await
    }

    async fn load_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let id = id.to_string();
        self.execute(move |conn| {
            let user = conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                    [id],
                    user_from_row,
                )
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn load_user_by_phone(&self, phone: &str) -> Result<Option<User>> {
        let phone = phone.to_string();
        self.execute(move |conn| {
            let user = conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE phone_number = ?1", USER_COLUMNS),
                    [phone],
                    user_from_row,
                )
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn load_users(&self, filter: UserFilter) -> Result<Vec<User>> {
        self.execute(move |conn| {
            let mut conditions = Vec::new();
            let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(user_type) = filter.user_type {
                values.push(Box::new(user_type.as_str()));
                conditions.push(format!("user_type = ?{}", values.len()));
            }
            if let Some(active) = filter.is_active {
                values.push(Box::new(active));
                conditions.push(format!("is_active = ?{}", values.len()));
            }
            if let Some(staff) = filter.is_staff {
                values.push(Box::new(staff));
                conditions.push(format!("is_staff = ?{}", values.len()));
            }
            if let Some(term) = filter.search {
                values.push(Box::new(like_pattern(&term)));
                let idx = values.len();
                conditions.push(format!(
                    "(lower(phone_number) LIKE ?{idx} ESCAPE '\\' OR lower(first_name) LIKE ?{idx} ESCAPE '\\' \
                     OR lower(last_name) LIKE ?{idx} ESCAPE '\\')"
                ));
            }

            let where_clause = if conditions.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", conditions.join(" AND "))
            };

            let sql = format!(
                "SELECT {} FROM users {} ORDER BY phone_number ASC",
                USER_COLUMNS, where_clause
            );

            let mut stmt = conn.prepare(&sql)?;
            let user_iter = stmt.query_map(
                rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
                user_from_row,
            )?;

            let mut users = Vec::new();
            for user in user_iter {
                users.push(user?);
            }
            Ok(users)
        })
        .await
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(())
        })
        .await
    }

    async fn save_otp(&self, otp: &Otp) -> Result<()> {
        let otp = otp.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO otps (id, user_id, otp_code, is_verified, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    otp_code = excluded.otp_code,
                    is_verified = excluded.is_verified,
                    expires_at = excluded.expires_at",
                rusqlite::params![
                    &otp.id,
                    &otp.user_id,
                    &otp.otp_code,
                    otp.is_verified,
                    otp.created_at,
                    otp.expires_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn load_latest_pending_otp(&self, user_id: &str) -> Result<Option<Otp>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let otp = conn
                .query_row(
                    "SELECT id, user_id, otp_code, is_verified, created_at, expires_at
                     FROM otps
                     WHERE user_id = ?1 AND is_verified = 0
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT 1",
                    [user_id],
                    otp_from_row,
                )
                .optional()?;
            Ok(otp)
        })
        .await
    }

    async fn load_otps(&self, filter: OtpFilter) -> Result<Vec<OtpRecord>> {
        self.execute(move |conn| {
            let mut conditions = Vec::new();
            let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(verified) = filter.is_verified {
                values.push(Box::new(verified));
                conditions.push(format!("o.is_verified = ?{}", values.len()));
            }
            if let Some(term) = filter.search {
                values.push(Box::new(like_pattern(&term)));
                let idx = values.len();
                conditions.push(format!(
                    "(lower(u.phone_number) LIKE ?{idx} ESCAPE '\\' OR o.otp_code LIKE ?{idx} ESCAPE '\\')"
                ));
            }
            if let Some(ts) = filter.created_after {
                values.push(Box::new(ts));
                conditions.push(format!("o.created_at >= ?{}", values.len()));
            }
            if let Some(ts) = filter.created_before {
                values.push(Box::new(ts));
                conditions.push(format!("o.created_at <= ?{}", values.len()));
            }

            let where_clause = if conditions.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", conditions.join(" AND "))
            };
            let limit_clause = filter
                .limit
                .map(|n| format!("LIMIT {}", n))
                .unwrap_or_default();

            let sql = format!(
                "SELECT o.id, o.user_id, o.otp_code, o.is_verified, o.created_at, o.expires_at, u.phone_number
                 FROM otps o JOIN users u ON u.id = o.user_id
                 {}
                 ORDER BY o.created_at DESC, o.rowid DESC
                 {}",
                where_clause, limit_clause
            );

            let mut stmt = conn.prepare(&sql)?;
            let iter = stmt.query_map(
                rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
                |row| {
                    Ok(OtpRecord {
                        otp: otp_from_row(row)?,
                        phone_number: row.get(6)?,
                    })
                },
            )?;

            let mut records = Vec::new();
            for record in iter {
                records.push(record?);
            }
            Ok(records)
        })
        .await
    }

    async fn save_user_profile(&self, profile: &UserProfile) -> Result<()> {
        let profile = profile.clone();
        self.execute(move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO user_profiles ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    USER_PROFILE_COLUMNS
                ),
                rusqlite::params![
                    &profile.user_id,
                    &profile.full_name,
                    profile.email.as_deref(),
                    profile.profile_picture.as_deref(),
                    profile.address.as_deref(),
                    profile.latitude,
                    profile.longitude,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn load_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let profile = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM user_profiles WHERE user_id = ?1",
                        USER_PROFILE_COLUMNS
                    ),
                    [user_id],
                    user_profile_from_row,
                )
                .optional()?;
            Ok(profile)
        })
        .await
    }

    async fn load_user_profiles(&self) -> Result<Vec<UserProfile>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM user_profiles ORDER BY user_id",
                USER_PROFILE_COLUMNS
            ))?;
            let iter = stmt.query_map([], user_profile_from_row)?;

            let mut profiles = Vec::new();
            for profile in iter {
                profiles.push(profile?);
            }
            Ok(profiles)
        })
        .await
    }

    async fn save_patient_profile(&self, profile: &PatientProfile) -> Result<()> {
        let profile = profile.clone();
        self.execute(move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO patient_profiles ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    PATIENT_COLUMNS
                ),
                rusqlite::params![
                    &profile.user_id,
                    profile.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string()),
                    profile.gender.map(|g| g.code()),
                    profile.blood_group.as_deref(),
                    profile.emergency_contact.as_deref(),
                    profile.allergies.as_deref(),
                    profile.chronic_diseases.as_deref(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn load_patient_profile(&self, user_id: &str) -> Result<Option<PatientProfile>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let profile = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM patient_profiles WHERE user_id = ?1",
                        PATIENT_COLUMNS
                    ),
                    [user_id],
                    patient_profile_from_row,
                )
                .optional()?;
            Ok(profile)
        })
        .await
    }

    async fn load_patient_profiles(&self) -> Result<Vec<PatientProfile>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM patient_profiles ORDER BY user_id",
                PATIENT_COLUMNS
            ))?;
            let iter = stmt.query_map([], patient_profile_from_row)?;

            let mut profiles = Vec::new();
            for profile in iter {
                profiles.push(profile?);
            }
            Ok(profiles)
        })
        .await
    }
}
