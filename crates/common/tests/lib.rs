// crates/common/tests/lib.rs
use serde_json::json;
use scholarflow_common::{
    ApiResponse, CreateEstablishmentRequest, EstablishmentStatus, FieldErrors, Role,
};

#[test]
fn test_success_envelope_omits_error_fields() {
    let response = ApiResponse::ok(json!({ "id": 7 })).with_message("done");
    let value = serde_json::to_value(&response).unwrap();

    assert_eq!(value["success"], json!(true));
    assert_eq!(value["message"], json!("done"));
    assert_eq!(value["data"]["id"], json!(7));
    assert!(value.get("errors").is_none());
    assert!(value.get("code").is_none());
}

#[test]
fn test_failure_envelope_carries_field_errors() {
    let mut errors = FieldErrors::new();
    errors.insert("email".to_string(), vec!["Enter a valid email address".to_string()]);

    let response = ApiResponse::failure("VAL_001", "Invalid input provided", Some(errors));
    let value = serde_json::to_value(&response).unwrap();

    assert_eq!(value["success"], json!(false));
    assert_eq!(value["code"], json!("VAL_001"));
    assert_eq!(value["errors"]["email"][0], json!("Enter a valid email address"));
    assert!(value.get("data").is_none());
}

#[test]
fn test_role_accepts_legacy_spellings() {
    let role: Role = serde_json::from_value(json!("enseignant")).unwrap();
    assert_eq!(role, Role::Instructor);

    let role: Role = serde_json::from_value(json!("guardian")).unwrap();
    assert_eq!(role, Role::Guardian);

    assert_eq!(serde_json::to_value(Role::Administrator).unwrap(), json!("administrator"));
    assert_eq!("ADMINISTRATEUR".parse::<Role>().unwrap(), Role::Administrator);
    assert!("janitor".parse::<Role>().is_err());
}

#[test]
fn test_establishment_request_accepts_legacy_field_names() {
    let request: CreateEstablishmentRequest = serde_json::from_value(json!({
        "code_etablissement": "LYC-001",
        "nom": "Lycee Bilingue",
        "adresse": "Rue 12",
        "date_creation": "1998-09-01",
        "statut": "actif"
    }))
    .unwrap();

    assert_eq!(request.code, "LYC-001");
    assert_eq!(request.name, "Lycee Bilingue");
    assert_eq!(request.address.as_deref(), Some("Rue 12"));
    assert_eq!(request.status, Some(EstablishmentStatus::Active));
    assert!(request.created_at.is_some());
}
