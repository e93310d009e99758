//! Recovery of a JSON payload from a free-form model reply.

use once_cell::sync::Lazy;
use regex::Regex;

/// Pull the JSON payload out of a model reply.
///
/// Replies arrive in three shapes, tried in order: a fenced ```json block,
/// bare JSON, or JSON buried in surrounding prose (outermost-brace scan).
/// The first candidate that parses as JSON wins; `None` means no parseable
/// payload exists anywhere in the reply.
pub fn extract_json_payload(text: &str) -> Option<&str> {
    static FENCE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").unwrap());

    if let Some(cap) = FENCE.captures(text) {
        let candidate = cap.get(1).map(|m| m.as_str()).unwrap_or("");
        if is_valid_json(candidate) {
            return Some(candidate);
        }
    }

    let trimmed = text.trim();
    if is_valid_json(trimmed) {
        return Some(trimmed);
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            let candidate = &text[start..=end];
            if is_valid_json(candidate) {
                return Some(candidate);
            }
        }
    }

    None
}

fn is_valid_json(s: &str) -> bool {
    !s.is_empty() && serde_json::from_str::<serde_json::Value>(s).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_block() {
        let text = "Here is the data:\n```json\n{\"name\": \"Ahmad\"}\n```\nDone.";
        assert_eq!(extract_json_payload(text), Some("{\"name\": \"Ahmad\"}"));
    }

    #[test]
    fn fenced_block_without_language_tag() {
        let text = "```\n{\"name\": \"Ahmad\"}\n```";
        assert_eq!(extract_json_payload(text), Some("{\"name\": \"Ahmad\"}"));
    }

    #[test]
    fn bare_json() {
        let text = "  {\"name\": \"Ahmad\"}  ";
        assert_eq!(extract_json_payload(text), Some("{\"name\": \"Ahmad\"}"));
    }

    #[test]
    fn json_buried_in_prose() {
        let text = "The record you asked for is {\"name\": \"Ahmad\"} as extracted.";
        assert_eq!(extract_json_payload(text), Some("{\"name\": \"Ahmad\"}"));
    }

    #[test]
    fn invalid_fence_falls_back_to_brace_scan() {
        let text = "```json\nnot json at all\n``` but later {\"name\": \"Yusuf\"}";
        assert_eq!(extract_json_payload(text), Some("{\"name\": \"Yusuf\"}"));
    }

    #[test]
    fn garbage_yields_none() {
        assert_eq!(extract_json_payload("I could not find any data."), None);
        assert_eq!(extract_json_payload(""), None);
    }

    #[test]
    fn unbalanced_braces_yield_none() {
        assert_eq!(extract_json_payload("{\"name\": \"Ahmad\""), None);
    }
}
