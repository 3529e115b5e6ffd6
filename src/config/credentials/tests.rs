use super::*;

#[test]
fn test_env_var_names_are_prefixed() {
    for (_, env) in CREDENTIAL_ENV_VARS {
        assert!(env.starts_with("NANOBOT_"), "{env}");
    }
}

#[test]
fn test_get_credential_value_unknown_slot() {
    let config = Config::default();
    assert!(get_credential_value(&config, "nope").is_none());
}

#[test]
fn test_configured_credentials_lists_non_empty() {
    let mut config = Config::default();
    assert!(configured_credentials(&config).is_empty());

    config.channels.feishu.app_id = "cli_1".to_string();
    config.providers.groq.api_key = "gsk".to_string();
    assert_eq!(
        configured_credentials(&config),
        vec!["feishu-app-id", "groq-api-key"]
    );
}

#[test]
fn test_apply_env_override() {
    // Unique to this test so parallel tests never observe it.
    unsafe { std::env::set_var("NANOBOT_IMAGE_PARSER_API_KEY", "from-env") };
    let mut config = Config::default();
    apply_env_overrides(&mut config);
    unsafe { std::env::remove_var("NANOBOT_IMAGE_PARSER_API_KEY") };
    assert_eq!(config.providers.image_parser.api_key, "from-env");
}
