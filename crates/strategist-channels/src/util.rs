use strategist_core::types::Severity;

/// Break `text` into pieces of at most `max_len` bytes for channels with a
/// message size limit.
///
/// Each piece ends at the last newline that fits; a piece with no newline
/// is cut at a char boundary instead. The newline a cut lands on is dropped.
/// Empty text yields no pieces.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.len() > max_len {
        let window = floor_char_boundary(rest, max_len);
        // A newline right after the window still counts as a clean break
        let search_end = if rest.as_bytes().get(window) == Some(&b'\n') {
            window + 1
        } else {
            window
        };
        match rest[..search_end].rfind('\n') {
            Some(nl) if nl > 0 => {
                chunks.push(rest[..nl].to_string());
                rest = &rest[nl + 1..];
            }
            _ => {
                chunks.push(rest[..window].to_string());
                rest = &rest[window..];
            }
        }
    }

    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Largest char boundary <= `index`, but never 0 for a non-empty string.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    if i == 0 {
        // max_len smaller than the first char; emit that char whole
        s.chars().next().map(char::len_utf8).unwrap_or(s.len())
    } else {
        i
    }
}

/// Message text with its severity tag prepended. Info messages are unchanged.
pub fn with_severity(severity: Severity, text: &str) -> String {
    match severity {
        Severity::Info => text.to_string(),
        Severity::Warning => format!("⚠️ {}", text),
        Severity::Critical => format!("🚨 {}", text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_in_one_piece() {
        assert_eq!(split_message("BTC 61000", 100), vec!["BTC 61000"]);
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(split_message("", 100).is_empty());
        assert_eq!(split_message("abc\n", 3), vec!["abc"]);
    }

    #[test]
    fn test_breaks_at_last_fitting_newline() {
        let pieces = split_message("price: 1\nflag: true\ntrend: up", 19);
        assert_eq!(pieces, vec!["price: 1\nflag: true", "trend: up"]);
    }

    #[test]
    fn test_cuts_lines_without_newlines() {
        let pieces = split_message(&"x".repeat(23), 10);
        let lens: Vec<usize> = pieces.iter().map(String::len).collect();
        assert_eq!(lens, vec![10, 10, 3]);
    }

    #[test]
    fn test_cut_respects_char_boundaries() {
        // 'é' is two bytes; a naive byte split at 5 would land mid-char
        let text = "éééééé";
        let result = split_message(text, 5);
        assert_eq!(result.concat(), text);
        for chunk in &result {
            assert!(chunk.len() <= 5);
        }
    }

    #[test]
    fn test_telegram_limit() {
        let text = "₿".repeat(3000);
        for chunk in split_message(&text, 4096) {
            assert!(chunk.len() <= 4096);
        }
    }

    #[test]
    fn test_severity_prefix() {
        assert_eq!(with_severity(Severity::Info, "x"), "x");
        assert!(with_severity(Severity::Critical, "x").ends_with(" x"));
        assert_ne!(
            with_severity(Severity::Warning, "x"),
            with_severity(Severity::Critical, "x")
        );
    }
}
