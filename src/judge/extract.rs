//! Verdict extraction from raw judge output.
//!
//! Models wrap their JSON in prose, code fences, or both. The cascade:
//! direct parse, then fenced-code-block extraction, then a brace-counting
//! scan for the last JSON object containing the key `"judgments"`.

use crate::error::{Error, Result};

use super::types::JudgmentSet;

/// Extract a judgment set from judge output via the parse cascade.
pub fn extract_judgments(output: &str) -> Result<JudgmentSet> {
    if let Ok(set) = serde_json::from_str::<JudgmentSet>(output.trim()) {
        return Ok(set);
    }

    for block in fenced_blocks(output) {
        if let Ok(set) = serde_json::from_str::<JudgmentSet>(block.trim()) {
            return Ok(set);
        }
    }

    for candidate in brace_objects(output).into_iter().rev() {
        if !candidate.contains("\"judgments\"") {
            continue;
        }
        if let Ok(set) = serde_json::from_str::<JudgmentSet>(&candidate) {
            return Ok(set);
        }
    }

    Err(Error::Judge(
        "no parseable judgments object in judge output".to_string(),
    ))
}

/// Contents of ``` fenced blocks, language tag stripped.
fn fenced_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            match current.take() {
                Some(block) => blocks.push(block),
                None => current = Some(String::new()),
            }
            continue;
        }
        if let Some(ref mut block) = current {
            block.push_str(line);
            block.push('\n');
        }
    }
    blocks
}

/// Top-level `{...}` spans found by brace counting, in order of
/// appearance. String literals are respected so braces inside them do not
/// confuse the scan.
fn brace_objects(text: &str) -> Vec<String> {
    let mut objects = Vec::new();
    let bytes: Vec<char> = text.chars().collect();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start.take() {
                            objects.push(bytes[s..=i].iter().collect());
                        }
                    }
                }
            }
            _ => {}
        }
    }
    objects
}
