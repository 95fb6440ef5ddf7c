/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip markdown code fences and inline backticks from a response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
        .trim_matches('`')
        .trim()
}

/// Parse the number a model was asked to reply with.
///
/// Accepts the longest numeric prefix of the trimmed response ("0.8",
/// "0.8 - looks fine", ".5", "1e-5"). Returns `None` when there is no
/// leading number.
pub fn leading_number(response: &str) -> Option<f64> {
    let text = strip_code_blocks(response);
    let bytes = text.as_bytes();

    let mut end = 0;
    if matches!(bytes.first(), Some(b'-' | b'+')) {
        end = 1;
    }
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'-' | b'+')) {
            exp_end += 1;
        }
        let digits = bytes[exp_end..].iter().take_while(|b| b.is_ascii_digit()).count();
        if digits > 0 {
            end = exp_end + digits;
        }
    }

    let mut candidate = &text[..end];
    // "0.8." or "1..": back off until it parses.
    while !candidate.is_empty() {
        if let Ok(n) = candidate.parse::<f64>() {
            return n.is_finite().then_some(n);
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_to_char_boundary() {
        let text = "Hello 世界";
        let truncated = truncate_to_char_boundary(text, 8);
        assert!(truncated.len() <= 8);
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn test_truncate_within_bounds() {
        let text = "Hello";
        assert_eq!(truncate_to_char_boundary(text, 100), "Hello");
    }

    #[test]
    fn test_strip_code_blocks() {
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("```\n0.7\n```"), "0.7");
        assert_eq!(strip_code_blocks("`0.7`"), "0.7");
    }

    #[test]
    fn leading_number_accepts_bare_and_prefixed_scores() {
        assert_eq!(leading_number("0.85"), Some(0.85));
        assert_eq!(leading_number("  1\n"), Some(1.0));
        assert_eq!(leading_number("0.2 - looks like a wire transfer scam"), Some(0.2));
        assert_eq!(leading_number(".5"), Some(0.5));
        assert_eq!(leading_number("0.9."), Some(0.9));
    }

    #[test]
    fn leading_number_reads_exponents() {
        assert_eq!(leading_number("1e-5"), Some(0.00001));
        assert_eq!(leading_number("0.2e1"), Some(2.0));
        assert_eq!(leading_number("5E+0 fine"), Some(5.0));
        // A bare "e" is not an exponent.
        assert_eq!(leading_number("1e"), Some(1.0));
        assert_eq!(leading_number("3 eggs"), Some(3.0));
        assert_eq!(leading_number("excellent"), None);
    }

    #[test]
    fn leading_number_rejects_text() {
        assert_eq!(leading_number("legitimate"), None);
        assert_eq!(leading_number(""), None);
        assert_eq!(leading_number("."), None);
    }
}
