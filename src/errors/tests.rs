use super::*;

#[test]
fn config_error_display() {
    let err = NanobotError::Config("bad value".into());
    assert_eq!(err.to_string(), "Configuration error: bad value");
    assert!(!err.is_retryable());
}

#[test]
fn provider_error_retryable_flag() {
    let err = NanobotError::Provider {
        message: "timeout".into(),
        retryable: true,
    };
    assert_eq!(err.to_string(), "Provider error: timeout");
    assert!(err.is_retryable());

    let err = NanobotError::Provider {
        message: "bad request".into(),
        retryable: false,
    };
    assert!(!err.is_retryable());
}

#[test]
fn feishu_channel_error_display() {
    let err = NanobotError::feishu("code=99991663, msg=token invalid");
    assert_eq!(
        err.to_string(),
        "Channel error: feishu: code=99991663, msg=token invalid"
    );
    assert!(!err.is_retryable());
}

#[test]
fn internal_from_anyhow() {
    let err: NanobotError = anyhow::anyhow!("something broke").into();
    assert!(matches!(err, NanobotError::Internal(_)));
    assert!(err.is_retryable());
}
