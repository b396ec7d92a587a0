//! 测试通用工具
//!
//! 提供测试辅助函数和通用测试工具
#![allow(dead_code)]

use std::sync::{Arc, Once};

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use medilink::core::store::{MemoryStore, Store};
use medilink::domain::NewUser;
use medilink::{create_router, AppConfig, AppState, UserManager};

static INIT: Once = Once::new();

/// 初始化测试环境
pub fn setup() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: "test-secret-for-testing".to_string(),
        debug_otp: true,
        ..Default::default()
    }
}

/// 测试应用：路由 + 底层存储
pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn Store>,
}

impl TestApp {
    pub fn new() -> Self {
        setup();
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), &test_config());
        Self {
            router: create_router(Arc::new(state)),
            store,
        }
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::PUT, uri, token, Some(body)).await
    }

    /// 走完整的 send-otp / verify-otp 流程并返回令牌
    pub async fn otp_login(&self, phone: &str) -> String {
        let (status, sent) = self
            .post("/api/accounts/send-otp/", None, json!({ "phone_number": phone }))
            .await;
        assert_eq!(status, StatusCode::OK, "send-otp failed: {}", sent);
        let code = sent["data"]["otp_code"].as_str().unwrap().to_string();

        let (status, verified) = self
            .post(
                "/api/accounts/verify-otp/",
                None,
                json!({ "phone_number": phone, "otp_code": code }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "verify-otp failed: {}", verified);
        verified["data"]["token"].as_str().unwrap().to_string()
    }

    /// 创建超级管理员并以密码登录
    pub async fn admin_login(&self, phone: &str, password: &str) -> String {
        UserManager::new(self.store.clone())
            .create_superuser(phone, password, NewUser::default())
            .await
            .unwrap();

        let (status, body) = self
            .post(
                "/api/accounts/login/",
                None,
                json!({ "phone_number": phone, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["data"]["token"].as_str().unwrap().to_string()
    }
}
