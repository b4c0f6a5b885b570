//! OSC address-pattern matching.
//!
//! Patterns select literal addresses with a glob-like, per-segment language:
//!
//! - `?` matches exactly one character
//! - `*` matches zero or more characters, never crossing a `/`
//! - `[abc]` matches one character in the set, `[!abc]` one character not in
//!   it; `a-z` inside brackets is an inclusive range unless the `-` is the
//!   first or last set character
//! - `{foo,bar}` matches any one of the comma-separated alternatives in full
//! - anything else matches itself literally
//!
//! Matching is anchored: a segment matches only if the whole address segment
//! is consumed. Malformed patterns never fail; an unterminated `[` or `{`
//! consumes the remainder of the segment as its body.

/// Tests a literal OSC address against an address pattern.
///
/// Both strings are split on `/` with empty segments discarded, so leading or
/// duplicated slashes are normalized away. A pattern never matches across a
/// different number of segments.
///
/// Pure and stateless; safe to call from any thread.
pub fn matches(pattern: &str, address: &str) -> bool {
    let mut pattern_parts = pattern.split('/').filter(|s| !s.is_empty());
    let mut address_parts = address.split('/').filter(|s| !s.is_empty());

    loop {
        match (pattern_parts.next(), address_parts.next()) {
            (Some(p), Some(a)) => {
                let p: Vec<char> = p.chars().collect();
                let a: Vec<char> = a.chars().collect();
                if !match_segment(&p, &a) {
                    return false;
                }
            }
            (None, None) => return true,
            // Differing segment counts never match.
            _ => return false,
        }
    }
}

fn match_segment(pat: &[char], addr: &[char]) -> bool {
    let Some((&c, rest)) = pat.split_first() else {
        // Pattern exhausted: anchored match requires the address to be too.
        return addr.is_empty();
    };

    match c {
        '?' => addr
            .split_first()
            .is_some_and(|(_, addr)| match_segment(rest, addr)),

        '*' => (0..=addr.len()).any(|skip| match_segment(rest, &addr[skip..])),

        '[' => {
            let (body, rest) = split_bracketed(rest, ']');
            let (negated, body) = match body.split_first() {
                Some(('!', body)) => (true, body),
                _ => (false, body),
            };

            addr.split_first().is_some_and(|(&a, addr)| {
                (set_contains(body, a) != negated) && match_segment(rest, addr)
            })
        }

        '{' => {
            let (body, rest) = split_bracketed(rest, '}');
            let body: String = body.iter().collect();

            body.split(',').any(|alt| {
                let alt: Vec<char> = alt.chars().collect();
                addr.starts_with(&alt) && match_segment(rest, &addr[alt.len()..])
            })
        }

        literal => addr.first() == Some(&literal) && match_segment(rest, &addr[1..]),
    }
}

/// Splits `pat` at the first `closer` into (body, remainder). An unterminated
/// construct takes the whole remainder of the segment as its body.
fn split_bracketed(pat: &[char], closer: char) -> (&[char], &[char]) {
    match pat.iter().position(|&c| c == closer) {
        Some(i) => (&pat[..i], &pat[i + 1..]),
        None => (pat, &[]),
    }
}

/// Membership test for a bracketed set body. A `-` that is neither the first
/// nor the last set character denotes an inclusive range.
fn set_contains(body: &[char], ch: char) -> bool {
    let mut i = 0;
    while i < body.len() {
        if body[i + 1..].first() == Some(&'-') && i + 2 < body.len() {
            if body[i] <= ch && ch <= body[i + 2] {
                return true;
            }
            i += 3;
        } else {
            if body[i] == ch {
                return true;
            }
            i += 1;
        }
    }
    false
}
