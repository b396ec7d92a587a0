//! 账户业务测试

use std::io;
use std::sync::{Arc, Mutex};

use medilink::application::accounts::{self, OtpService, ProfileService, UserManager};
use medilink::core::store::{MemoryStore, Store};
use medilink::domain::{
    NewUser, Otp, PatientProfileUpdate, UserProfileUpdate, UserType,
};
use medilink::AppError;

fn store() -> Arc<dyn Store> {
    Arc::new(MemoryStore::new())
}

#[tokio::test]
async fn test_create_user_defaults() {
    let store = store();
    let manager = UserManager::new(store.clone());

    let user = manager
        .create_user("+15551234", None, NewUser::default())
        .await
        .unwrap();

    assert!(!user.is_staff);
    assert!(!user.is_superuser);
    assert_eq!(user.user_type, UserType::Patient);
    assert!(store.load_user_by_phone("+15551234").await.unwrap().is_some());
}

#[tokio::test]
async fn test_create_user_requires_phone() {
    let manager = UserManager::new(store());
    let err = manager
        .create_user("   ", Some("secret"), NewUser::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(ref m) if m == "The phone number must be set"));
}

#[tokio::test]
async fn test_duplicate_phone_is_conflict() {
    let manager = UserManager::new(store());
    manager
        .create_user("+15551234", None, NewUser::default())
        .await
        .unwrap();

    let err = manager
        .create_user("+15551234", None, NewUser::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_create_superuser_sets_flags() {
    let manager = UserManager::new(store());
    let admin = manager
        .create_superuser("+15550000", "admin-pass", NewUser::default())
        .await
        .unwrap();

    assert!(admin.is_staff);
    assert!(admin.is_superuser);
    assert_eq!(admin.user_type, UserType::Admin);
    assert!(admin.has_usable_password());
}

#[tokio::test]
async fn test_create_superuser_rejects_explicit_false_flags() {
    let manager = UserManager::new(store());

    let err = manager
        .create_superuser("+15550000", "pw", NewUser::default().with_staff(false))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Superuser must have is_staff=True.");

    let err = manager
        .create_superuser("+15550000", "pw", NewUser::default().with_superuser(false))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Superuser must have is_superuser=True.");
}

#[tokio::test]
async fn test_send_and_verify_otp() {
    let store = store();
    let otp_service = OtpService::new(store.clone(), 600);

    let (user, otp) = otp_service.send_otp("+15557777").await.unwrap();
    assert_eq!(user.user_type, UserType::Patient);
    assert!(Otp::is_well_formed(&otp.otp_code));
    assert!(otp.expires_at.is_some());

    let verified = otp_service
        .verify_otp("+15557777", &otp.otp_code)
        .await
        .unwrap();
    assert_eq!(verified.id, user.id);
    assert!(verified.last_login.is_some());

    // 已使用的验证码不能再次使用
    let err = otp_service
        .verify_otp("+15557777", &otp.otp_code)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_send_otp_reuses_existing_user() {
    let store = store();
    let otp_service = OtpService::new(store.clone(), 600);

    let (first, _) = otp_service.send_otp("+15557777").await.unwrap();
    let (second, latest) = otp_service.send_otp("+15557777").await.unwrap();
    assert_eq!(first.id, second.id);

    let pending = store.load_latest_pending_otp(&first.id).await.unwrap().unwrap();
    assert_eq!(pending.id, latest.id);
}

#[tokio::test]
async fn test_verify_rejects_wrong_code() {
    let otp_service = OtpService::new(store(), 600);
    let (_, otp) = otp_service.send_otp("+15557777").await.unwrap();

    let wrong = if otp.otp_code == "000000" { "111111" } else { "000000" };
    let err = otp_service.verify_otp("+15557777", wrong).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    let err = otp_service.verify_otp("+15557777", "12ab").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_verify_rejects_expired_code() {
    let store = store();
    let manager = UserManager::new(store.clone());
    let user = manager
        .create_user("+15558888", None, NewUser::default())
        .await
        .unwrap();

    let mut otp = Otp::new(&user.id);
    otp.otp_code = "123456".to_string();
    otp.expires_at = Some(chrono::Utc::now().timestamp() - 1);
    store.save_otp(&otp).await.unwrap();

    let err = OtpService::new(store, 600)
        .verify_otp("+15558888", "123456")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::OtpExpired));
}

#[tokio::test]
async fn test_verify_unknown_phone() {
    let err = OtpService::new(store(), 600)
        .verify_otp("+15559999", "123456")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_password_login() {
    let store = store();
    UserManager::new(store.clone())
        .create_superuser("+15550000", "admin-pass", NewUser::default())
        .await
        .unwrap();

    let user = accounts::login(store.as_ref(), "+15550000", "admin-pass")
        .await
        .unwrap();
    assert!(user.last_login.is_some());

    let err = accounts::login(store.as_ref(), "+15550000", "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    // OTP 注册的账户没有密码
    OtpService::new(store.clone(), 600)
        .send_otp("+15551111")
        .await
        .unwrap();
    let err = accounts::login(store.as_ref(), "+15551111", "")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
}

#[tokio::test]
async fn test_profiles_are_unique_per_user() {
    let store = store();
    let user = UserManager::new(store.clone())
        .create_user("+15552222", None, NewUser::default())
        .await
        .unwrap();
    let profiles = ProfileService::new(store.clone());

    profiles
        .edit_profile(
            &user,
            UserProfileUpdate {
                full_name: Some("Asha Rao".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let updated = profiles
        .edit_profile(
            &user,
            UserProfileUpdate {
                address: Some("12 Lake Road".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.full_name, "Asha Rao");
    assert_eq!(updated.address.as_deref(), Some("12 Lake Road"));
    assert_eq!(store.load_user_profiles().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_patient_profile_only_for_patients() {
    let store = store();
    let hospital = UserManager::new(store.clone())
        .create_user(
            "+15553333",
            None,
            NewUser::default().with_user_type(UserType::Hospital),
        )
        .await
        .unwrap();

    let err = ProfileService::new(store)
        .edit_patient_profile(&hospital, PatientProfileUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_dashboard_differs_by_role() {
    let store = store();
    let manager = UserManager::new(store.clone());
    let profiles = ProfileService::new(store.clone());

    let patient = manager
        .create_user("+15554444", None, NewUser::default())
        .await
        .unwrap();
    let dashboard = profiles.dashboard(patient).await.unwrap();
    assert_eq!(dashboard.user_type, UserType::Patient);
    assert_eq!(dashboard.patient_profile_complete, Some(false));
    assert!(dashboard
        .pending_actions
        .contains(&"Add your medical details".to_string()));
    assert_eq!(dashboard.greeting, "Welcome, +15554444");

    let hospital = manager
        .create_user(
            "+15555555",
            None,
            NewUser::default()
                .with_user_type(UserType::Hospital)
                .with_name("City", "Hospital"),
        )
        .await
        .unwrap();
    let dashboard = profiles.dashboard(hospital).await.unwrap();
    assert_eq!(dashboard.patient_profile_complete, None);
    assert_eq!(dashboard.greeting, "Welcome, City Hospital");
    assert!(dashboard
        .pending_actions
        .contains(&"Set your hospital location".to_string()));
}

/// 收集日志输出的 writer
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_send_otp_logs_phone_number() {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    OtpService::new(store(), 600)
        .send_otp("+15556666")
        .await
        .unwrap();

    let logs = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("Generated new OTP for +15556666"), "{}", logs);
}
