//! UTF-8 safe truncation helpers.
//!
//! Titles and summaries are cut by character count, never by byte index,
//! so multibyte text cannot cause a panic.

/// Return the first `n` characters of `s` as a `String` (no ellipsis).
pub fn prefix_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Return `s` cut to `n` characters with a trailing `…` when anything was cut.
pub fn truncate_with_ellipsis(s: &str, n: usize) -> String {
    let mut prefix = prefix_chars(s, n);
    if s.chars().count() > n {
        prefix.push('…');
    }
    prefix
}

/// First non-empty line of `s`, trimmed.
pub fn first_line(s: &str) -> &str {
    s.trim().lines().next().unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_counts_chars_not_bytes() {
        assert_eq!(prefix_chars("héllo wörld", 7), "héllo w");
        assert_eq!(prefix_chars("abc", 10), "abc");
    }

    #[test]
    fn truncate_adds_ellipsis_only_when_cut() {
        assert_eq!(truncate_with_ellipsis("hello world", 5), "hello…");
        assert_eq!(truncate_with_ellipsis("hello", 5), "hello");
    }

    #[test]
    fn truncate_cjk() {
        let s = "宇树科技是最强的选手";
        assert_eq!(truncate_with_ellipsis(s, 4), "宇树科技…");
    }

    #[test]
    fn first_line_skips_leading_whitespace() {
        assert_eq!(first_line("\n  first\nsecond"), "first");
        assert_eq!(first_line(""), "");
    }
}
