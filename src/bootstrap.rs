//! # MediLink Bootstrap Module
//!
//! Wires configuration, logging, storage and the HTTP server together.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::application::UserManager;
use crate::config::AppConfig;
use crate::core::store::Store;
use crate::domain::NewUser;
use crate::infrastructure::logger;
use crate::infrastructure::store::SqliteStore;
use crate::infrastructure::web::{start_web_server, AppState};

/// Service launcher
pub struct Launcher {
    config: AppConfig,
}

impl Launcher {
    /// Load configuration from file and environment
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            config: AppConfig::load()?,
        })
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Initialize everything and serve until shutdown
    pub async fn launch(&self) -> Result<()> {
        logger::init(&self.config.log_level);
        info!("Launching MediLink {}", crate::VERSION);
        if self.config.uses_default_secret() {
            warn!("JWT_SECRET not set, using the development default");
        }

        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(&self.config.db_path)?);
        info!("Opened database at {}", self.config.db_path);

        ensure_admin(store.clone(), &self.config).await?;

        let state = AppState::new(store, &self.config);
        start_web_server(&self.config.bind_addr, state).await
    }
}

/// Create the configured superuser if it does not exist yet
pub async fn ensure_admin(store: Arc<dyn Store>, config: &AppConfig) -> Result<bool> {
    let (Some(phone), Some(password)) = (&config.admin_phone, &config.admin_password) else {
        return Ok(false);
    };

    if store.load_user_by_phone(phone.trim()).await?.is_some() {
        return Ok(false);
    }

    let user = UserManager::new(store)
        .create_superuser(phone, password, NewUser::default())
        .await?;
    info!("Created superuser {}", user.phone_number);
    Ok(true)
}
