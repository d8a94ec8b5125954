use std::io::Write;

use dispatch_common::DispatchError;
use dispatch_core::source::load_prompts;

fn jsonl(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".jsonl").tempfile().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

#[test]
fn loads_in_file_order_with_sequential_ids() {
    let file = jsonl(&[r#"{"id": 7, "prompt": "A"}"#, r#"{"prompt": "B", "extra": true}"#, r#"{"prompt": "C"}"#]);
    let prompts = load_prompts(file.path()).unwrap();
    let got: Vec<(usize, &str)> = prompts.iter().map(|p| (p.id, p.text.as_str())).collect();
    assert_eq!(got, vec![(0, "A"), (1, "B"), (2, "C")]);
}

#[test]
fn empty_file_is_empty_batch() {
    let file = jsonl(&[]);
    assert!(load_prompts(file.path()).unwrap().is_empty());
}

#[test]
fn blank_lines_do_not_consume_ids() {
    let file = jsonl(&[r#"{"prompt": "A"}"#, "", "   ", r#"{"prompt": "B"}"#]);
    let prompts = load_prompts(file.path()).unwrap();
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[1].id, 1);
    assert_eq!(prompts[1].text, "B");
}

#[test]
fn missing_prompt_field_names_the_line() {
    let file = jsonl(&[r#"{"prompt": "A"}"#, r#"{"text": "B"}"#]);
    match load_prompts(file.path()).unwrap_err() {
        DispatchError::Load { line, reason, .. } => {
            assert_eq!(line, 2);
            assert!(reason.contains("prompt"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn invalid_json_is_fatal() {
    let file = jsonl(&[r#"{"prompt": "A"}"#, r#"{"prompt": "#]);
    assert!(matches!(load_prompts(file.path()), Err(DispatchError::Load { line: 2, .. })));
}

#[test]
fn non_string_prompt_and_non_object_are_fatal() {
    let file = jsonl(&[r#"{"prompt": 5}"#]);
    assert!(matches!(load_prompts(file.path()), Err(DispatchError::Load { line: 1, .. })));
    let file = jsonl(&[r#"["prompt"]"#]);
    assert!(matches!(load_prompts(file.path()), Err(DispatchError::Load { line: 1, .. })));
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_prompts(dir.path().join("nope.jsonl")).unwrap_err();
    assert!(matches!(err, DispatchError::Io { .. }));
}
