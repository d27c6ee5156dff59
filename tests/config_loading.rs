use std::io::Write;

use flowline_core::config::AppConfig;
use flowline_core::FlowlineError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
flows_dir = "/srv/flows"
max_steps = 50

[llm.openai]
api_key = "sk-test-key"
model = "gpt-4o"
max_tokens = 2048
temperature = 0.3

[llm.claude]
api_key = "sk-ant-test"
base_url = "http://localhost:8080/v1/messages"

[github]
token = "ghp_test"
api_base = "https://ghe.example.com/api/v3"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.flows_dir, "/srv/flows");
    assert_eq!(config.engine.step_limit(), Some(50));

    let openai = config.llm.openai.expect("openai present");
    assert_eq!(openai.api_key.as_deref(), Some("sk-test-key"));
    assert_eq!(openai.model.as_deref(), Some("gpt-4o"));
    assert_eq!(openai.max_tokens, 2048);
    assert_eq!(openai.temperature, Some(0.3));

    let claude = config.llm.claude.expect("claude present");
    assert_eq!(claude.max_tokens, 4096);
    assert!(claude.model.is_none());
    assert!(config.llm.gemini.is_none());

    assert_eq!(config.github.token.as_deref(), Some("ghp_test"));
    assert_eq!(config.github.api_base, "https://ghe.example.com/api/v3");
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("FLOWLINE_TEST_GITHUB_TOKEN", "expanded-token");

    let toml_content = r#"
[github]
token = "${FLOWLINE_TEST_GITHUB_TOKEN}"

[llm.gemini]
api_key = "${FLOWLINE_TEST_UNSET_VAR}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.github.token.as_deref(), Some("expanded-token"));
    // Unset variables are left as written.
    assert_eq!(
        config.llm.gemini.and_then(|g| g.api_key).as_deref(),
        Some("${FLOWLINE_TEST_UNSET_VAR}")
    );

    std::env::remove_var("FLOWLINE_TEST_GITHUB_TOKEN");
}

#[test]
fn test_empty_config_uses_defaults() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"").expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.flows_dir, "flows");
    assert_eq!(config.engine.max_steps, 1000);
    assert!(config.llm.openai.is_none());
    assert!(config.github.token.is_none());
    assert_eq!(config.github.api_base, "https://api.github.com");
}

#[test]
fn test_zero_max_steps_means_unlimited() {
    let config = AppConfig::parse("[engine]\nmax_steps = 0\n").expect("parse config");
    assert_eq!(config.engine.step_limit(), None);
}

#[test]
fn test_missing_and_malformed_files() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/flowline.toml")).unwrap_err();
    assert!(matches!(err, FlowlineError::ConfigNotFound(_)));

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[engine\nflows_dir = 1").expect("write toml");
    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, FlowlineError::Config(_)));
}
