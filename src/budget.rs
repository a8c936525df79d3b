/// Character budgets for text sent to the hosted models.
pub const SENTIMENT_INPUT_CHARS: usize = 512;
pub const SUMMARY_BODY_CHARS: usize = 800;
/// Summary used when per-item analysis fails outright.
pub const FALLBACK_SUMMARY_CHARS: usize = 200;
/// Body-only CSV rows borrow this much of the body as their title.
pub const DERIVED_TITLE_CHARS: usize = 100;

pub fn approx_tokens(s: &str) -> usize {
    // heuristic ~4 chars/token
    (s.chars().count() + 3) / 4
}

/// First `max_chars` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Summary for an item whose analysis failed: the head of the body, or the
/// title when there is no body.
pub fn fallback_summary(title: &str, body: &str) -> String {
    let head = truncate_chars(body, FALLBACK_SUMMARY_CHARS);
    if head.is_empty() {
        title.to_string()
    } else {
        head.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn fallback_summary_prefers_body_head() {
        let body = "x".repeat(500);
        assert_eq!(fallback_summary("Title", &body).len(), 200);
        assert_eq!(fallback_summary("Title", ""), "Title");
    }

    #[test]
    fn approx_tokens_rounds_up() {
        assert_eq!(approx_tokens(""), 0);
        assert_eq!(approx_tokens("abcde"), 2);
    }
}
