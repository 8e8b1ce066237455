//! Glob-style key matching.
//!
//! Supported syntax:
//! - `*` matches any run of bytes, including an empty one
//! - `?` matches exactly one byte
//! - `[abc]`, `[^abc]`, `[a-z]` match one byte from (or outside) a class
//! - `\x` matches `x` literally
//!
//! An unterminated class is closed by the end of the pattern and a trailing
//! backslash matches itself.

/// Reports whether `input` matches the glob `pattern`.
pub fn matches(pattern: &[u8], input: &[u8]) -> bool {
    let mut p = pattern;
    let mut s = input;

    while let Some((&c, rest)) = p.split_first() {
        match c {
            b'*' => {
                let rest = trim_stars(rest);
                if rest.is_empty() {
                    return true;
                }
                return (0..=s.len()).any(|i| matches(rest, &s[i..]));
            }
            b'?' => {
                let Some((_, s_rest)) = s.split_first() else {
                    return false;
                };
                s = s_rest;
                p = rest;
            }
            b'[' => {
                let Some((&ch, s_rest)) = s.split_first() else {
                    return false;
                };
                let (found, after) = match_class(rest, ch);
                if !found {
                    return false;
                }
                s = s_rest;
                p = after;
            }
            b'\\' if !rest.is_empty() => {
                if s.first() != Some(&rest[0]) {
                    return false;
                }
                s = &s[1..];
                p = &rest[1..];
            }
            _ => {
                if s.first() != Some(&c) {
                    return false;
                }
                s = &s[1..];
                p = rest;
            }
        }
    }

    s.is_empty()
}

fn trim_stars(mut p: &[u8]) -> &[u8] {
    while let Some((&b'*', rest)) = p.split_first() {
        p = rest;
    }
    p
}

/// Matches one byte against the class body following `[`.
///
/// Returns whether the byte is accepted and the pattern after the class.
fn match_class(p: &[u8], ch: u8) -> (bool, &[u8]) {
    let (negate, mut p) = match p.split_first() {
        Some((&b'^', rest)) => (true, rest),
        _ => (false, p),
    };

    let mut found = false;
    loop {
        match p {
            [] => break,
            [b'\\', esc, rest @ ..] => {
                found |= *esc == ch;
                p = rest;
            }
            [b']', rest @ ..] => {
                p = rest;
                break;
            }
            [start, b'-', end, rest @ ..] => {
                let (lo, hi) = if start <= end { (*start, *end) } else { (*end, *start) };
                found |= (lo..=hi).contains(&ch);
                p = rest;
            }
            [c, rest @ ..] => {
                found |= *c == ch;
                p = rest;
            }
        }
    }

    (found != negate, p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pattern: &str, input: &str) -> bool {
        matches(pattern.as_bytes(), input.as_bytes())
    }

    #[test]
    fn test_literal() {
        assert!(m("session:user:123", "session:user:123"));
        assert!(!m("session:user:123", "session:user:1234"));
        assert!(!m("abc", "ab"));
        assert!(m("", ""));
        assert!(!m("", "a"));
    }

    #[test]
    fn test_star() {
        assert!(m("*", ""));
        assert!(m("*", "anything"));
        assert!(m("a*", "a1"));
        assert!(m("a*", "a"));
        assert!(!m("a*", "b1"));
        assert!(m("session:*", "session:user:123"));
        assert!(m("*:user:*", "session:user:123"));
        assert!(m("a**b", "axxb"));
        assert!(!m("*x", "abc"));
    }

    #[test]
    fn test_question_mark() {
        assert!(m("a?", "a1"));
        assert!(!m("a?", "a"));
        assert!(!m("a?", "a12"));
        assert!(m("h?llo", "hello"));
    }

    #[test]
    fn test_classes() {
        assert!(m("h[ae]llo", "hello"));
        assert!(m("h[ae]llo", "hallo"));
        assert!(!m("h[ae]llo", "hillo"));
        assert!(m("h[^e]llo", "hallo"));
        assert!(!m("h[^e]llo", "hello"));
        assert!(m("h[a-b]llo", "hbllo"));
        assert!(m("h[b-a]llo", "hallo"));
        assert!(!m("h[a-b]llo", "hcllo"));
        assert!(!m("[a]", ""));
    }

    #[test]
    fn test_escapes() {
        assert!(m("a\\*", "a*"));
        assert!(!m("a\\*", "ab"));
        assert!(m("a\\?", "a?"));
        assert!(m("[\\]]", "]"));
        assert!(m("a\\", "a\\"));
    }

    #[test]
    fn test_unterminated_class() {
        assert!(m("[ab", "a"));
        assert!(!m("[ab", "c"));
    }
}
