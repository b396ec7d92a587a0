//! 内存存储与启动流程测试

use std::sync::Arc;

use medilink::bootstrap::ensure_admin;
use medilink::core::store::{DuplicatePhone, MemoryStore, OtpFilter, Store, UserFilter};
use medilink::domain::{NewUser, Otp, User, UserProfile, UserType};
use medilink::AppConfig;

fn user(phone: &str) -> User {
    User::new(phone.to_string(), None, NewUser::default())
}

#[tokio::test]
async fn test_memory_store_users() {
    let store = MemoryStore::new();
    assert!(!store.has_users().await.unwrap());

    store.insert_user(&user("+15550020")).await.unwrap();
    store
        .insert_user(&User::new(
            "+15550010".to_string(),
            None,
            NewUser::default().with_user_type(UserType::Hospital),
        ))
        .await
        .unwrap();
    assert!(store.has_users().await.unwrap());

    let err = store.insert_user(&user("+15550020")).await.unwrap_err();
    assert!(err.downcast_ref::<DuplicatePhone>().is_some());

    let all = store.load_users(UserFilter::new()).await.unwrap();
    assert_eq!(all[0].phone_number, "+15550010");
    assert_eq!(all[1].phone_number, "+15550020");

    let patients = store
        .load_users(UserFilter::new().user_type(UserType::Patient))
        .await
        .unwrap();
    assert_eq!(patients.len(), 1);
}

#[tokio::test]
async fn test_memory_store_latest_pending_otp() {
    let store = MemoryStore::new();
    let patient = user("+15550030");
    store.insert_user(&patient).await.unwrap();

    let mut first = Otp::new(&patient.id);
    first.otp_code = "111111".to_string();
    first.created_at = 100;
    let mut second = Otp::new(&patient.id);
    second.otp_code = "222222".to_string();
    second.created_at = 100;
    store.save_otp(&first).await.unwrap();
    store.save_otp(&second).await.unwrap();

    // 同一时刻创建时取后保存的
    let pending = store
        .load_latest_pending_otp(&patient.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.otp_code, "222222");

    let limited = store
        .load_otps(OtpFilter::new().limit(1))
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn test_memory_store_otp_created_range() {
    let store = MemoryStore::new();
    let patient = user("+15550035");
    store.insert_user(&patient).await.unwrap();
    for (code, created_at) in [("111111", 1_000), ("222222", 2_000), ("333333", 3_000)] {
        let mut otp = Otp::new(&patient.id);
        otp.otp_code = code.to_string();
        otp.created_at = created_at;
        store.save_otp(&otp).await.unwrap();
    }

    let window = store
        .load_otps(OtpFilter::new().created_after(1_500).created_before(3_000))
        .await
        .unwrap();
    let codes: Vec<_> = window.iter().map(|r| r.otp.otp_code.as_str()).collect();
    assert_eq!(codes, vec!["333333", "222222"]);

    let none = store
        .load_otps(OtpFilter::new().search("_"))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_memory_store_cascade_delete() {
    let store = MemoryStore::new();
    let patient = user("+15550040");
    store.insert_user(&patient).await.unwrap();
    store.save_otp(&Otp::new(&patient.id)).await.unwrap();
    store
        .save_user_profile(&UserProfile::new(&patient.id))
        .await
        .unwrap();

    store.delete_user(&patient.id).await.unwrap();
    assert!(store.load_otps(OtpFilter::new()).await.unwrap().is_empty());
    assert!(store.load_user_profiles().await.unwrap().is_empty());

    // 外键：用户不存在时不能保存
    assert!(store.save_otp(&Otp::new(&patient.id)).await.is_err());
}

#[tokio::test]
async fn test_ensure_admin_is_idempotent() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let config = AppConfig {
        admin_phone: Some("+15550001".to_string()),
        admin_password: Some("admin-pass".to_string()),
        ..Default::default()
    };

    assert!(ensure_admin(store.clone(), &config).await.unwrap());
    assert!(!ensure_admin(store.clone(), &config).await.unwrap());

    let admin = store.load_user_by_phone("+15550001").await.unwrap().unwrap();
    assert!(admin.is_superuser);
    assert_eq!(admin.user_type, UserType::Admin);

    let unset = AppConfig::default();
    assert!(!ensure_admin(store, &unset).await.unwrap());
}
