use serde_json::Value;
use taskboard::assign::Rejection;
use taskboard::error::{exit_codes, Error, JsonError};

#[test]
fn exit_code_user_error() {
    let err = Error::NotFound { kind: "task", id: 9 };
    assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    assert_eq!(Error::InvalidCredentials.exit_code(), exit_codes::USER_ERROR);
}

#[test]
fn exit_code_policy_blocked() {
    assert_eq!(Error::NotAuthenticated.exit_code(), exit_codes::POLICY_BLOCKED);
    let err = Error::DeleteRefused("user 1 holds task 2".to_string());
    assert_eq!(err.exit_code(), exit_codes::POLICY_BLOCKED);
}

#[test]
fn exit_code_operation_failed() {
    let err = Error::QuotaExceeded {
        key: "tasks".to_string(),
        needed: 10,
        available: 2,
    };
    assert_eq!(err.exit_code(), exit_codes::OPERATION_FAILED);
    let details = err.details().expect("details");
    assert_eq!(details["key"], Value::String("tasks".to_string()));
    assert_eq!(details["available"], 2);
}

#[test]
fn rejections_map_to_policy_or_not_found() {
    let busy = Rejection::UserBusy {
        user_id: 1,
        task_id: 2,
    }
    .into_error();
    assert_eq!(busy.exit_code(), exit_codes::POLICY_BLOCKED);
    assert!(busy.to_string().contains("working on task 2"));

    let missing = Rejection::UserNotFound { user_id: 8 }.into_error();
    assert_eq!(missing.exit_code(), exit_codes::USER_ERROR);
    assert_eq!(missing.to_string(), "user not found: 8");
}

#[test]
fn json_error_includes_details() {
    let err = Error::NotFound { kind: "user", id: 4 };
    let json = JsonError::from(&err);
    assert_eq!(json.code, exit_codes::USER_ERROR);
    let details = json.details.expect("details");
    assert_eq!(details["kind"], Value::String("user".to_string()));
    assert_eq!(details["id"], 4);
}
