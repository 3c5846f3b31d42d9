//! Recovery ladder for JSON emitted by generative models. Model output is
//! frequently wrapped in markdown fences, prefixed with prose, or sloppy
//! about commas and quoting; each step here is a strictly weaker parse
//! attempt, tried in order until one yields a value.

use serde_json::Value as JsonValue;

/// Remove markdown code fences (```json ... ```) around a payload.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Slice out the first top-level `{...}` block, if any.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Best-effort repair of the two syntax issues models produce most:
/// trailing commas before a closing brace/bracket, and single-quoted
/// strings.
pub fn repair_json(text: &str) -> String {
    let mut repaired = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => repaired.push('"'),
            ',' => {
                // Drop the comma when the next non-whitespace closes a scope.
                let next_meaningful = chars.clone().find(|n| !n.is_whitespace());
                match next_meaningful {
                    Some('}') | Some(']') => {}
                    _ => repaired.push(','),
                }
            }
            other => repaired.push(other),
        }
    }
    repaired
}

/// The full chain: fences → direct parse → first object block → repaired
/// block. Returns `None` only when every stage fails.
pub fn recover_json(text: &str) -> Option<JsonValue> {
    let cleaned = strip_code_fences(text);

    if let Ok(value) = serde_json::from_str::<JsonValue>(&cleaned) {
        return Some(value);
    }

    let block = extract_json_block(&cleaned)?;
    if let Ok(value) = serde_json::from_str::<JsonValue>(block) {
        return Some(value);
    }

    let repaired = repair_json(block);
    serde_json::from_str::<JsonValue>(&repaired).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"answers\": {\"1\": \"x\"}}\n```";
        let value = recover_json(raw).expect("fenced JSON should parse");
        assert_eq!(value["answers"]["1"], "x");
    }

    #[test]
    fn extracts_embedded_object() {
        let raw = "Here is the result you asked for: {\"score\": 3} hope it helps";
        let value = recover_json(raw).expect("embedded object should parse");
        assert_eq!(value["score"], 3);
    }

    #[test]
    fn repairs_trailing_commas() {
        let raw = "{\"a\": 1, \"b\": [1, 2,],}";
        let value = recover_json(raw).expect("trailing commas should be repaired");
        assert_eq!(value["b"][1], 2);
    }

    #[test]
    fn repairs_single_quotes() {
        let raw = "{'marks': 4, 'feedback': 'ok'}";
        let value = recover_json(raw).expect("single quotes should be repaired");
        assert_eq!(value["marks"], 4);
    }

    #[test]
    fn gives_up_on_garbage() {
        assert!(recover_json("not json at all").is_none());
        assert!(recover_json("").is_none());
    }
}
