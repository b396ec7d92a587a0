//! Web 服务器模块
//!
//! 提供 HTTP API：账户、后台管理、聊天机器人

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::application::accounts::{self, current_user};
use crate::application::admin::{AddUserForm, OtpQuery, UserQuery};
use crate::application::{chatbot, AdminService, OtpService, ProfileService};
use crate::config::AppConfig;
use crate::core::store::Store;
use crate::domain::chat::{ChatReply, SessionEnded, SessionStarted};
use crate::domain::{PatientProfileUpdate, User, UserProfileUpdate};
use crate::errors::{AppError, Result};
use crate::infrastructure::auth::{JwtService, UserInfo};

// ==================== 状态 ====================

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub jwt_service: JwtService,
    pub otp_service: OtpService,
    pub profiles: ProfileService,
    pub admin: AdminService,
    /// send-otp 是否回显验证码
    pub debug_otp: bool,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: &AppConfig) -> Self {
        Self {
            jwt_service: JwtService::with_ttl(&config.jwt_secret, config.jwt_ttl_secs),
            otp_service: OtpService::new(store.clone(), config.otp_expiry_secs),
            profiles: ProfileService::new(store.clone()),
            admin: AdminService::new(store.clone()),
            store,
            debug_otp: config.debug_otp,
        }
    }
}

// ==================== 请求类型 ====================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub phone_number: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct SendOtpRequest {
    pub phone_number: String,
}

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub phone_number: String,
    pub otp_code: String,
}

#[derive(Deserialize)]
pub struct MedicineSearch {
    pub query: Option<String>,
}

// ==================== API 响应类型 ====================

#[derive(Serialize)]
pub struct SendOtpResponse {
    pub phone_number: String,
    pub expires_at: Option<i64>,
    pub first_login: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_code: Option<String>,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: User,
}

fn success<T: Serialize>(data: T) -> Json<Value> {
    Json(serde_json::json!({
        "success": true,
        "data": data,
    }))
}

// ==================== 认证 ====================

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
}

/// 从 Authorization 头解析当前用户
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User> {
    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))?;
    let info = state
        .jwt_service
        .validate_token(token)
        .map_err(|_| AppError::Unauthorized("Unauthorized".to_string()))?;
    current_user(state.store.as_ref(), &info).await
}

async fn authenticate_staff(state: &AppState, headers: &HeaderMap) -> Result<User> {
    let user = authenticate(state, headers).await?;
    AdminService::ensure_staff(&user)?;
    Ok(user)
}

fn issue_token(state: &AppState, user: User) -> Result<Json<Value>> {
    let token = state
        .jwt_service
        .generate_token(&UserInfo::from(&user))
        .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))?;
    Ok(success(TokenResponse { token, user }))
}

// ==================== 账户处理器 ====================

/// 健康检查
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// 手机号 + 密码登录
async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Value>> {
    info!("Login attempt: {}", req.phone_number);
    let user = accounts::login(state.store.as_ref(), &req.phone_number, &req.password).await?;
    issue_token(&state, user)
}

/// 令牌无状态，客户端丢弃即可
async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Value>> {
    let user = authenticate(&state, &headers).await?;
    info!("Logout: {}", user.phone_number);
    Ok(success(serde_json::json!({ "message": "Logged out" })))
}

async fn send_otp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendOtpRequest>,
) -> Result<Json<Value>> {
    let (user, otp) = state.otp_service.send_otp(&req.phone_number).await?;
    let first_login = user.last_login.is_none();

    Ok(success(SendOtpResponse {
        phone_number: user.phone_number,
        expires_at: otp.expires_at,
        first_login,
        otp_code: state.debug_otp.then_some(otp.otp_code),
    }))
}

async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<Value>> {
    let user = state
        .otp_service
        .verify_otp(&req.phone_number, &req.otp_code)
        .await?;
    issue_token(&state, user)
}

async fn profile_view(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Value>> {
    let user = authenticate(&state, &headers).await?;
    Ok(success(state.profiles.profile(user).await?))
}

async fn edit_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(update): Json<UserProfileUpdate>,
) -> Result<Json<Value>> {
    let user = authenticate(&state, &headers).await?;
    Ok(success(state.profiles.edit_profile(&user, update).await?))
}

async fn edit_patient_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(update): Json<PatientProfileUpdate>,
) -> Result<Json<Value>> {
    let user = authenticate(&state, &headers).await?;
    Ok(success(state.profiles.edit_patient_profile(&user, update).await?))
}

async fn dashboard(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Value>> {
    let user = authenticate(&state, &headers).await?;
    Ok(success(state.profiles.dashboard(user).await?))
}

// ==================== 后台处理器 ====================

async fn admin_list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>> {
    authenticate_staff(&state, &headers).await?;
    Ok(success(state.admin.list_users(query).await?))
}

async fn admin_add_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(form): Json<AddUserForm>,
) -> Result<Json<Value>> {
    let staff = authenticate_staff(&state, &headers).await?;
    let user = state.admin.add_user(form).await?;
    info!("{} added user {}", staff.phone_number, user);
    Ok(success(user))
}

async fn admin_user_detail(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Value>> {
    authenticate_staff(&state, &headers).await?;
    Ok(success(state.admin.user_detail(&user_id).await?))
}

async fn admin_list_otps(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<OtpQuery>,
) -> Result<Json<Value>> {
    authenticate_staff(&state, &headers).await?;
    Ok(success(state.admin.list_otps(query).await?))
}

async fn admin_user_profiles(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    authenticate_staff(&state, &headers).await?;
    Ok(success(state.admin.list_user_profiles().await?))
}

async fn admin_patient_profiles(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    authenticate_staff(&state, &headers).await?;
    Ok(success(state.admin.list_patient_profiles().await?))
}

// ==================== 聊天机器人处理器 ====================

async fn chatbot_interface(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    authenticate(&state, &headers).await?;
    Ok(Json(chatbot::interface()))
}

async fn start_chat_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionStarted>> {
    authenticate(&state, &headers).await?;
    Ok(Json(chatbot::start_session()))
}

async fn end_chat_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<SessionEnded>> {
    authenticate(&state, &headers).await?;
    Ok(Json(chatbot::end_session(&session_id)))
}

async fn chat_send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<ChatReply>> {
    authenticate(&state, &headers).await?;
    Ok(Json(chatbot::send_message(&session_id)))
}

async fn chatbot_list(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Value>> {
    authenticate(&state, &headers).await?;
    Ok(success(chatbot::list()))
}

async fn chatbot_detail(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    authenticate(&state, &headers).await?;
    Ok(success(chatbot::detail(&id)))
}

async fn search_medicines(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(search): Query<MedicineSearch>,
) -> Result<Json<Value>> {
    authenticate(&state, &headers).await?;
    Ok(success(chatbot::search_medicines(search.query)))
}

async fn recommendations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<Value>> {
    authenticate(&state, &headers).await?;
    Ok(success(chatbot::recommendations(&session_id)))
}

async fn chat_session_detail(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<Value>> {
    authenticate(&state, &headers).await?;
    Ok(success(chatbot::session_detail(&session_id)))
}

// ==================== 路由 ====================

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/api/health", get(health_check))
        // 账户
        .route("/api/accounts/login/", post(login))
        .route("/api/accounts/logout/", post(logout))
        .route("/api/accounts/send-otp/", post(send_otp))
        .route("/api/accounts/verify-otp/", post(verify_otp))
        .route("/api/accounts/profile/", get(profile_view))
        .route("/api/accounts/profile/edit/", put(edit_profile))
        .route("/api/accounts/patient-profile/edit/", put(edit_patient_profile))
        .route("/api/accounts/dashboard/", get(dashboard))
        // 后台
        .route("/api/admin/users", get(admin_list_users).post(admin_add_user))
        .route("/api/admin/users/{id}", get(admin_user_detail))
        .route("/api/admin/otps", get(admin_list_otps))
        .route("/api/admin/user-profiles", get(admin_user_profiles))
        .route("/api/admin/patient-profiles", get(admin_patient_profiles))
        // 聊天机器人
        .route("/api/chatbot/", get(chatbot_interface))
        .route("/api/chatbot/session/start", post(start_chat_session))
        .route("/api/chatbot/session/{session_id}/end", post(end_chat_session))
        .route("/api/chatbot/session/{session_id}/message", post(chat_send_message))
        .route("/api/chatbot/symptoms", get(chatbot_list))
        .route("/api/chatbot/symptoms/{id}", get(chatbot_detail))
        .route("/api/chatbot/diseases", get(chatbot_list))
        .route("/api/chatbot/diseases/{id}", get(chatbot_detail))
        .route("/api/chatbot/medicines", get(chatbot_list))
        .route("/api/chatbot/medicines/search", get(search_medicines))
        .route("/api/chatbot/medicines/{id}", get(chatbot_detail))
        .route("/api/chatbot/recommendations/{session_id}", get(recommendations))
        .route("/api/chatbot/history", get(chatbot_list))
        .route("/api/chatbot/history/{session_id}", get(chat_session_detail))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ==================== 服务器启动 ====================

pub async fn start_web_server(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Web server started on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
