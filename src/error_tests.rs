use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
    assert_eq!(AppError::auth("auth", "no").http_status(), 401);
    assert_eq!(AppError::config("invalid_config", "bad port").http_status(), 500);
    assert_eq!(AppError::io("io", "io").http_status(), 503);
    assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
}

#[test]
fn display_joins_code_and_message() {
    let e = AppError::user("unknown_role", "unknown role 'maire'");
    assert_eq!(e.to_string(), "unknown_role: unknown role 'maire'");
}

#[test]
fn json_errors_become_user_input() {
    let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let app: AppError = err.into();
    assert_eq!(app.code_str(), "invalid_json");
    assert_eq!(app.http_status(), 400);
}

#[test]
fn config_errors_keep_variable_name() {
    let app: AppError = ConfigError::InvalidValue { var: "CIVIQ_HTTP_PORT", value: "abc".into() }.into();
    assert_eq!(app.code_str(), "invalid_config");
    assert!(app.message().contains("CIVIQ_HTTP_PORT"));
}

#[test]
fn serializes_with_type_tag() {
    let v = serde_json::to_value(AppError::auth("invalid_credentials", "bad password")).unwrap();
    assert_eq!(v["type"], "auth");
    assert_eq!(v["code"], "invalid_credentials");
}
