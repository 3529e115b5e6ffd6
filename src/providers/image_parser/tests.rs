use super::*;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(api_base: &str) -> ImageParserConfig {
    ImageParserConfig {
        enabled: true,
        api_base: api_base.to_string(),
        model: "vision-test".to_string(),
        ..ImageParserConfig::default()
    }
}

fn write_image(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, [0x89, b'P', b'N', b'G', 0x0D, 0x0A]).unwrap();
    path
}

#[test]
fn test_normalize_api_base() {
    assert_eq!(normalize_api_base("http://h:8000"), "http://h:8000/v1");
    assert_eq!(normalize_api_base("http://h:8000/"), "http://h:8000/v1");
    assert_eq!(normalize_api_base("http://h:8000/v1/"), "http://h:8000/v1");
    assert_eq!(normalize_api_base("http://h:8000/v1"), "http://h:8000/v1");
}

#[test]
fn test_from_config_requires_enabled_base_and_model() {
    let mut cfg = config("http://h");
    assert!(VllmImageParser::from_config(&cfg).is_some());
    cfg.model.clear();
    assert!(VllmImageParser::from_config(&cfg).is_none());
    let mut cfg = config("http://h");
    cfg.enabled = false;
    assert!(VllmImageParser::from_config(&cfg).is_none());
}

#[test]
fn test_parse_content_strips_special_tokens() {
    let json = json!({
        "choices": [{"message": {"content": "<|begin_of_box|> # Title <|end_of_box|>"}}]
    });
    assert_eq!(VllmImageParser::parse_content(&json), "# Title");
}

#[test]
fn test_parse_content_no_choices() {
    assert_eq!(VllmImageParser::parse_content(&json!({"choices": []})), "");
}

#[tokio::test]
async fn test_describe_sends_instruction_and_data_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer EMPTY"))
        .and(body_partial_json(json!({
            "model": "vision-test",
            "max_tokens": 4096,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "a receipt"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let image = write_image(&dir, "shot.png");
    let parser = VllmImageParser::new(&config(&server.uri()));
    let text = parser.describe(&image, "what is this?").await;
    assert_eq!(text, "a receipt");

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let parts = &body["messages"][1]["content"];
    assert_eq!(parts[0]["text"], "what is this?");
    assert!(
        parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,")
    );
}

#[tokio::test]
async fn test_describe_blank_instruction_uses_default_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "ok"}}]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let image = write_image(&dir, "a.jpg");
    let mut cfg = config(&server.uri());
    cfg.prompt = "describe it".to_string();
    let parser = VllmImageParser::new(&cfg);
    parser.describe(&image, "   ").await;

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["messages"][1]["content"][0]["text"], "describe it");
    assert!(
        body["messages"][1]["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,")
    );
}

#[tokio::test]
async fn test_describe_server_error_returns_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let image = write_image(&dir, "a.png");
    let parser = VllmImageParser::new(&config(&server.uri()));
    assert_eq!(parser.describe(&image, "").await, "");
}

#[tokio::test]
async fn test_describe_missing_file_returns_empty() {
    let parser = VllmImageParser::new(&config("http://127.0.0.1:9"));
    let text = parser
        .describe(Path::new("/nonexistent/nanobot/img.png"), "")
        .await;
    assert_eq!(text, "");
}
