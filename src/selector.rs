//! Auto-selection of a model when the caller asks for `"auto"`.
//!
//! Pure function over the latest user message and the request mode. The
//! rules are ordered and first-match-wins, so the same input always picks
//! the same model.

/// Request mode hint supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Normal,
    Think,
    Search,
}

const THINK_KEYWORDS: &[&str] = &["analyze", "reason", "solve", "explain", "complex"];
const IMAGE_KEYWORDS: &[&str] = &["image", "picture", "draw", "generate", "create visual"];
const CODE_KEYWORDS: &[&str] = &["code", "program", "function", "debug", "programming"];
const CREATIVE_KEYWORDS: &[&str] = &["creative", "story", "poem", "write", "creative writing"];

pub const SEARCH_MODEL: &str = "tavily-search";
pub const THINK_MODEL: &str = "deepseek-r1-free";
pub const IMAGE_MODEL: &str = "imagen-4-premium";
pub const CODE_MODEL: &str = "llama-3-1-405b-free";
pub const CREATIVE_MODEL: &str = "qwen-3-235b-free";
pub const DEFAULT_MODEL: &str = "gemini-2-5-pro-free";

fn matches_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// Pick a model key for the given message text and mode.
///
/// Search mode always wins. Think mode only applies when the text carries
/// an analytical keyword; otherwise it falls through to the content rules.
pub fn select(text: &str, mode: Mode) -> &'static str {
    if mode == Mode::Search {
        return SEARCH_MODEL;
    }

    let text = text.to_lowercase();

    if mode == Mode::Think && matches_any(&text, THINK_KEYWORDS) {
        return THINK_MODEL;
    }
    if matches_any(&text, IMAGE_KEYWORDS) {
        return IMAGE_MODEL;
    }
    if matches_any(&text, CODE_KEYWORDS) {
        return CODE_MODEL;
    }
    if matches_any(&text, CREATIVE_KEYWORDS) {
        return CREATIVE_MODEL;
    }
    DEFAULT_MODEL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_mode_overrides_everything() {
        assert_eq!(select("write me a poem about code", Mode::Search), SEARCH_MODEL);
        assert_eq!(select("", Mode::Search), SEARCH_MODEL);
    }

    #[test]
    fn think_mode_requires_analytical_keyword() {
        assert_eq!(select("solve this equation", Mode::Think), THINK_MODEL);
        assert_eq!(select("Analyze the results", Mode::Think), THINK_MODEL);
        // No analytical keyword: think mode falls through.
        assert_eq!(select("hello there", Mode::Think), DEFAULT_MODEL);
        assert_eq!(select("debug my program", Mode::Think), CODE_MODEL);
    }

    #[test]
    fn think_keywords_ignored_in_normal_mode() {
        assert_eq!(select("explain this to me", Mode::Normal), DEFAULT_MODEL);
    }

    #[test]
    fn content_rules_in_order() {
        assert_eq!(select("draw a cat", Mode::Normal), IMAGE_MODEL);
        assert_eq!(select("fix this function", Mode::Normal), CODE_MODEL);
        assert_eq!(select("write a story", Mode::Normal), CREATIVE_MODEL);
        // Image beats code when both match.
        assert_eq!(select("generate code", Mode::Normal), IMAGE_MODEL);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(select("DRAW a PICTURE", Mode::Normal), IMAGE_MODEL);
    }

    #[test]
    fn default_when_nothing_matches() {
        assert_eq!(select("what's the weather like", Mode::Normal), DEFAULT_MODEL);
    }

    #[test]
    fn selection_is_deterministic() {
        let text = "please analyze and solve this complex problem";
        let first = select(text, Mode::Think);
        for _ in 0..10 {
            assert_eq!(select(text, Mode::Think), first);
        }
    }
}
