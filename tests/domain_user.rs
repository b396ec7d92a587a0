use chrono::NaiveDate;

use medilink::domain::{
    Gender, NewUser, PatientProfile, PatientProfileUpdate, User, UserProfile, UserProfileUpdate,
    UserType,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_user_defaults_and_display() {
    let user = User::new("+15550001".to_string(), None, NewUser::default());

    assert_eq!(user.user_type, UserType::Patient);
    assert!(user.is_active);
    assert!(!user.is_staff);
    assert!(!user.is_superuser);
    assert!(!user.has_usable_password());
    assert_eq!(user.to_string(), "+15550001 - Patient");

    let hospital = User::new(
        "+15550002".to_string(),
        None,
        NewUser::default().with_user_type(UserType::Hospital),
    );
    assert_eq!(hospital.to_string(), "+15550002 - Hospital");
}

#[test]
fn test_user_type_serializes_upper_case() {
    let json = serde_json::to_string(&UserType::Admin).unwrap();
    assert_eq!(json, "\"ADMIN\"");
    let parsed: UserType = serde_json::from_str("\"HOSPITAL\"").unwrap();
    assert_eq!(parsed, UserType::Hospital);
}

#[test]
fn test_password_hash_never_serialized() {
    let user = User::new(
        "+15550003".to_string(),
        Some("$2b$12$hash".to_string()),
        NewUser::default(),
    );
    let json = serde_json::to_value(&user).unwrap();
    assert!(json.get("password_hash").is_none());
    assert_eq!(json["phone_number"], "+15550003");
}

#[test]
fn test_calculate_age() {
    let mut profile = PatientProfile::new("u1");
    assert_eq!(profile.calculate_age(date(2024, 6, 1)), None);

    profile.date_of_birth = Some(date(1990, 6, 15));
    assert_eq!(profile.calculate_age(date(2024, 6, 14)), Some(33));
    assert_eq!(profile.calculate_age(date(2024, 6, 15)), Some(34));
    assert_eq!(profile.calculate_age(date(2024, 12, 31)), Some(34));
}

#[test]
fn test_patient_profile_partial_update() {
    let mut profile = PatientProfile::new("u1");
    profile.allergies = Some("penicillin".to_string());

    profile
        .apply(PatientProfileUpdate {
            gender: Some(Gender::Female),
            blood_group: Some("AB+".to_string()),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(profile.gender, Some(Gender::Female));
    assert_eq!(profile.blood_group.as_deref(), Some("AB+"));
    assert_eq!(profile.allergies.as_deref(), Some("penicillin"));

    let too_long = PatientProfileUpdate {
        blood_group: Some("ABCDEF".to_string()),
        ..Default::default()
    };
    assert!(profile.apply(too_long).is_err());
}

#[test]
fn test_user_profile_rejects_bad_coordinates() {
    let mut profile = UserProfile::new("u1");
    let result = profile.apply(UserProfileUpdate {
        latitude: Some(91.0),
        ..Default::default()
    });
    assert!(result.is_err());
    assert!(profile.latitude.is_none());

    profile
        .apply(UserProfileUpdate {
            full_name: Some("City Hospital".to_string()),
            latitude: Some(12.97),
            longitude: Some(77.59),
            ..Default::default()
        })
        .unwrap();
    assert!(profile.has_location());
    assert_eq!(profile.full_name, "City Hospital");
}

#[test]
fn test_gender_codes() {
    assert_eq!(serde_json::to_string(&Gender::Other).unwrap(), "\"O\"");
    assert_eq!(Gender::from_code("M"), Some(Gender::Male));
    assert_eq!(Gender::from_code("X"), None);
}

#[test]
fn test_profile_display() {
    assert_eq!(UserProfile::new("u1").to_string(), "Profile of u1");
    assert_eq!(PatientProfile::new("u1").to_string(), "Patient Profile of u1");
}
