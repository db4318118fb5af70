use agent_pulse::tail::entry::{batch_has_interrupt, line_is_interrupt, LogEntry};

const MARKER: &str = "[Request interrupted by user";

#[test]
fn detects_string_content() {
    let line = r#"{"type":"user","message":{"content":"[Request interrupted by user]"}}"#;
    assert!(line_is_interrupt(line, MARKER));
}

#[test]
fn detects_string_item() {
    let line = r#"{"type":"user","message":{"content":["[Request interrupted by user for tool use]"]}}"#;
    assert!(line_is_interrupt(line, MARKER));
}

#[test]
fn detects_text_block_item() {
    let line = r#"{"type":"user","message":{"role":"user","content":[{"type":"text","text":"[Request interrupted by user]"}]}}"#;
    assert!(line_is_interrupt(line, MARKER));
}

#[test]
fn ignores_non_user_records() {
    let line = r#"{"type":"assistant","message":{"content":"[Request interrupted by user]"}}"#;
    assert!(!line_is_interrupt(line, MARKER));
}

#[test]
fn ignores_marker_outside_content() {
    let line = r#"{"type":"user","summary":"[Request interrupted by user]","message":{"content":"hello"}}"#;
    assert!(!line_is_interrupt(line, MARKER));
}

#[test]
fn ignores_marker_in_non_text_items() {
    let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","content":"[Request interrupted by user]"}]}}"#;
    assert!(!line_is_interrupt(line, MARKER));
}

#[test]
fn malformed_lines_are_not_interrupts() {
    assert!(!line_is_interrupt("{not json [Request interrupted by user", MARKER));
    assert!(!line_is_interrupt("", MARKER));
    assert!(!line_is_interrupt(r#"{"type":"user"}"#, MARKER));
}

#[test]
fn entry_without_message_is_not_interrupt() {
    let entry: LogEntry = serde_json::from_str(r#"{"type":"user"}"#).expect("parse");
    assert!(!entry.is_interrupt(MARKER));
}

#[test]
fn batch_detects_any_interrupt_line() {
    let batch = [
        r#"{"type":"assistant","message":{"content":"working"}}"#,
        "garbage",
        r#"{"type":"user","message":{"content":"[Request interrupted by user]"}}"#,
    ];
    assert!(batch_has_interrupt(batch, MARKER));
    assert!(!batch_has_interrupt(batch[..2].iter().copied(), MARKER));
}
