use super::*;
use clap::Parser;
use serde_json::Value;

#[test]
fn test_parse_gateway_flags() {
    let cli = Cli::try_parse_from(["nanobot-feishu", "gateway", "--echo"]).unwrap();
    assert!(matches!(cli.command, Commands::Gateway { echo: true }));

    let cli = Cli::try_parse_from(["nanobot-feishu", "gateway"]).unwrap();
    assert!(matches!(cli.command, Commands::Gateway { echo: false }));
}

#[test]
fn test_parse_config_and_render() {
    let cli = Cli::try_parse_from(["nanobot-feishu", "config", "check"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Config {
            cmd: ConfigCommands::Check
        }
    ));

    let cli = Cli::try_parse_from(["nanobot-feishu", "render", "reply.md"]).unwrap();
    let Commands::Render { file } = cli.command else {
        panic!("expected render");
    };
    assert_eq!(file, PathBuf::from("reply.md"));

    assert!(Cli::try_parse_from(["nanobot-feishu", "render"]).is_err());
    assert!(Cli::try_parse_from(["nanobot-feishu", "agent"]).is_err());
}

#[test]
fn test_render_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reply.md");
    std::fs::write(&path, "## Result\n\n| a | b |\n|---|---|\n| 1 | 2 |\n").unwrap();

    let card: Value = serde_json::from_str(&render_file(&path).unwrap()).unwrap();
    let elements = card["elements"].as_array().unwrap();
    assert_eq!(elements[0]["content"], "**Result**");
    assert_eq!(elements[1]["tag"], "table");

    assert!(render_file(&dir.path().join("missing.md")).is_err());
}

#[test]
fn test_check_config_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"channels": {"feishu": {"enabled": true, "appId": "cli_a", "appSecret": "s"}}}"#,
    )
    .unwrap();

    let report = check_config(Some(&path)).unwrap();
    assert!(report.starts_with("Configuration OK"));
    assert!(report.contains("feishu: enabled"));
    assert!(report.contains("image parser: disabled"));
}

#[test]
fn test_check_config_rejects_missing_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"channels": {"feishu": {"enabled": true}}}"#).unwrap();
    assert!(check_config(Some(&path)).is_err());
}

#[test]
fn test_echo_reply_targets_sender_chat() {
    let mut msg = InboundMessage::new("feishu", "ou_1", "oc_chat", "ping");
    msg.metadata
        .insert("message_id".to_string(), Value::from("om_1"));
    let reply = echo_reply(&msg);
    assert_eq!(reply.channel, "feishu");
    assert_eq!(reply.chat_id, "oc_chat");
    assert_eq!(
        reply.content,
        "[echo] channel=feishu | sender=ou_1 | message: ping"
    );
    assert_eq!(reply.metadata["message_id"], "om_1");
}

#[tokio::test]
async fn test_record_appends_to_session() {
    let dir = tempfile::tempdir().unwrap();
    let sessions = SessionManager::new(dir.path()).unwrap();
    record(Some(&sessions), "feishu:oc_chat", "user", "hi").await;
    record(Some(&sessions), "feishu:oc_chat", "assistant", "hello").await;
    record(None, "feishu:oc_chat", "user", "dropped").await;

    let session = sessions.get_or_create("feishu:oc_chat").await.unwrap();
    let roles: Vec<&str> = session.messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["user", "assistant"]);
}
