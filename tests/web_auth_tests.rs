use medilink::domain::UserType;
use medilink::infrastructure::auth::{JwtService, PasswordService, UserInfo};

fn patient_info() -> UserInfo {
    UserInfo {
        id: "user123".to_string(),
        phone_number: "+15550100".to_string(),
        user_type: UserType::Patient,
        is_staff: false,
        is_superuser: false,
    }
}

#[tokio::test]
async fn test_password_hashing() {
    let password = "test_password";
    let hashed = PasswordService::hash_password(password).expect("Failed to hash password");
    assert!(PasswordService::verify_password(&hashed, password).expect("Failed to verify password"));
    assert!(!PasswordService::verify_password(&hashed, "wrong_password").expect("Failed to verify password"));
}

#[tokio::test]
async fn test_jwt_generation() {
    let jwt_service = JwtService::new("secret_key_for_testing");
    let user = patient_info();

    let token = jwt_service.generate_token(&user).expect("Failed to generate token");
    let decoded_user = jwt_service.validate_token(&token).expect("Failed to validate token");
    assert_eq!(decoded_user, user);
}

#[tokio::test]
async fn test_jwt_rejects_foreign_secret() {
    let token = JwtService::new("one-secret")
        .generate_token(&patient_info())
        .unwrap();
    assert!(JwtService::new("another-secret").validate_token(&token).is_err());
    assert!(JwtService::new("one-secret").validate_token("not-a-token").is_err());
}

#[tokio::test]
async fn test_jwt_rejects_expired_token() {
    // 手动构造早已过期的令牌
    use jsonwebtoken::{encode, EncodingKey, Header};
    use medilink::infrastructure::auth::Claims;

    let claims = Claims {
        id: "user123".to_string(),
        phone_number: "+15550100".to_string(),
        user_type: UserType::Patient,
        is_staff: false,
        is_superuser: false,
        exp: 1_000,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"secret"),
    )
    .unwrap();

    assert!(JwtService::new("secret").validate_token(&token).is_err());
}
