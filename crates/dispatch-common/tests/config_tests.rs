use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use dispatch_common::config::{normalize_base_url, DispatchConfig, EndpointKind, ExecutionStrategy};
use dispatch_common::DispatchError;

#[test]
fn base_url_gets_scheme_and_loses_trailing_slash() {
    assert_eq!(normalize_base_url("localhost:8001"), "http://localhost:8001");
    assert_eq!(normalize_base_url("https://api.example.com/"), "https://api.example.com");
    assert_eq!(normalize_base_url(" http://10.0.0.1:8000// "), "http://10.0.0.1:8000");
}

#[test]
fn stats_path_defaults_next_to_input() {
    let mut cfg = DispatchConfig::default();
    cfg.input_path = PathBuf::from("data/prompts.jsonl");
    assert_eq!(cfg.stats_path(), PathBuf::from("data/prompts_stats.json"));
    cfg.stats_path = Some(PathBuf::from("out/stats.json"));
    assert_eq!(cfg.stats_path(), PathBuf::from("out/stats.json"));
}

#[test]
fn validate_rejects_zero_concurrency_and_empty_model() {
    let mut cfg = DispatchConfig::default();
    assert!(cfg.validate().is_ok());
    cfg.concurrency = 0;
    assert!(matches!(cfg.validate(), Err(DispatchError::Config(_))));
    cfg.concurrency = 4;
    cfg.model = "  ".into();
    assert!(matches!(cfg.validate(), Err(DispatchError::Config(_))));
}

#[test]
fn overrides_apply_and_ignore_garbage() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("DISPATCH_MODEL", "qwen"),
        ("DISPATCH_CONCURRENCY", "32"),
        ("DISPATCH_TIMEOUT_SECS", "not-a-number"),
        ("DISPATCH_ENDPOINT", "chat"),
        ("DISPATCH_STRATEGY", "pool"),
    ]);
    let mut cfg = DispatchConfig::default();
    cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
    assert_eq!(cfg.model, "qwen");
    assert_eq!(cfg.concurrency, 32);
    assert_eq!(cfg.timeout_secs, 1200);
    assert_eq!(cfg.endpoint, EndpointKind::Chat);
    assert_eq!(cfg.strategy, ExecutionStrategy::Pool);
}

#[test]
fn partial_yaml_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "model: mistral\nconcurrency: 3\nsampling:\n  max_tokens: 64").unwrap();
    let cfg = DispatchConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(cfg.model, "mistral");
    assert_eq!(cfg.concurrency, 3);
    assert_eq!(cfg.sampling().max_tokens, 64);
    assert_eq!(cfg.sampling().seed, Some(42));
    assert_eq!(cfg.timeout_secs, 1200);
}

#[test]
fn missing_yaml_is_io_error() {
    let err = DispatchConfig::from_yaml_file("/definitely/not/here.yaml").unwrap_err();
    assert!(matches!(err, DispatchError::Io { .. }));
}

#[test]
fn chat_has_its_own_sampling_defaults() {
    let mut cfg = DispatchConfig::default();
    let completions = cfg.sampling();
    assert_eq!(completions.temperature, 0.0);
    assert_eq!(completions.stop.len(), 5);
    assert_eq!(cfg.system_prompt(), None);

    cfg.endpoint = EndpointKind::Chat;
    let chat = cfg.sampling();
    assert_eq!(chat.temperature, 0.7);
    assert_eq!(chat.top_p, Some(0.8));
    assert_eq!(chat.repetition_penalty, Some(1.05));
    assert_eq!(chat.seed, None);
    assert!(chat.stop.is_empty());
    assert_eq!(cfg.system_prompt().as_deref(), Some("You are a helpful assistant."));

    cfg.system_prompt = Some(String::new());
    assert_eq!(cfg.system_prompt(), None);
}

#[test]
fn explicit_sampling_survives_endpoint_switch() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "endpoint: chat\nsampling:\n  temperature: 0.2").unwrap();
    let cfg = DispatchConfig::from_yaml_file(file.path()).unwrap();
    let sampling = cfg.sampling();
    assert_eq!(sampling.temperature, 0.2);
    assert_eq!(sampling.top_p, Some(0.8));
}
