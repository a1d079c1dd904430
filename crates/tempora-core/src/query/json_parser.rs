//! JSON helpers for model replies.

use once_cell::sync::Lazy;
use regex::Regex;

static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)\s*```").unwrap());
static THINK_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

/// Strip reasoning tags and a surrounding code fence.
pub fn remove_code_blocks(content: &str) -> String {
    let content = THINK_TAGS.replace_all(content, "");
    let content = content.trim();
    CODE_BLOCK
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| content.to_string())
}

/// The outermost JSON object in `text`, if braces are present.
pub fn extract_json(text: &str) -> String {
    let cleaned = remove_code_blocks(text);
    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => cleaned[start..=end].to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_code_blocks() {
        assert_eq!(remove_code_blocks("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(remove_code_blocks("<think>hmm</think>{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(remove_code_blocks("  plain "), "plain");
    }

    #[test]
    fn test_extract_json_skips_prose() {
        assert_eq!(
            extract_json("Here you go: {\"a\": [\"x\"]} hope it helps"),
            "{\"a\": [\"x\"]}"
        );
        assert_eq!(extract_json("no json"), "no json");
    }
}
