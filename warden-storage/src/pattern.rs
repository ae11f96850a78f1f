//! Redis-compatible glob matching.
//!
//! The in-memory backend answers `KEYS pattern` with [`glob_match`], which
//! follows the server's `stringmatchlen` rules byte for byte: `*`, `?`,
//! `[abc]`, `[^abc]`, `[a-z]` (reversed ranges allowed) and `\` escapes. A
//! pattern that selects a key on Redis selects it here too, and the reverse.

/// Characters with a meaning inside a glob pattern.
const META: &[u8] = b"*?[]\\";

/// Whether `key` matches `pattern`.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    match_bytes(pattern.as_bytes(), key.as_bytes())
}

/// Quote glob metacharacters so `raw` matches only itself.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() && META.contains(&(c as u8)) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Pattern selecting every key that starts with the literal `prefix`.
pub fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = escape(prefix);
    pattern.push('*');
    pattern
}

fn match_bytes(mut p: &[u8], mut s: &[u8]) -> bool {
    while let Some(&c) = p.first() {
        match c {
            b'*' => {
                while p.len() > 1 && p[1] == b'*' {
                    p = &p[1..];
                }
                if p.len() == 1 {
                    return true;
                }
                return (0..=s.len()).any(|i| match_bytes(&p[1..], &s[i..]));
            }
            b'?' => {
                if s.is_empty() {
                    return false;
                }
                s = &s[1..];
                p = &p[1..];
            }
            b'[' => {
                let Some((&ch, rest)) = s.split_first() else {
                    return false;
                };
                let (matched, after) = match_class(&p[1..], ch);
                if !matched {
                    return false;
                }
                s = rest;
                p = after;
            }
            b'\\' if p.len() >= 2 => {
                if s.first() != Some(&p[1]) {
                    return false;
                }
                s = &s[1..];
                p = &p[2..];
            }
            // A trailing backslash is a literal.
            _ => {
                if s.first() != Some(&c) {
                    return false;
                }
                s = &s[1..];
                p = &p[1..];
            }
        }
    }
    s.is_empty()
}

/// Match one byte against a class body (after `[`). Returns the verdict and
/// the pattern remaining after the closing `]`. An unterminated class runs
/// to the end of the pattern.
fn match_class(mut p: &[u8], ch: u8) -> (bool, &[u8]) {
    let negate = p.first() == Some(&b'^');
    if negate {
        p = &p[1..];
    }

    let mut matched = false;
    loop {
        match p {
            [] => break,
            [b']', rest @ ..] => {
                p = rest;
                break;
            }
            [b'\\', escaped, rest @ ..] => {
                matched |= *escaped == ch;
                p = rest;
            }
            [lo, b'-', hi, rest @ ..] => {
                let (start, end) = if lo <= hi { (*lo, *hi) } else { (*hi, *lo) };
                matched |= (start..=end).contains(&ch);
                p = rest;
            }
            [c, rest @ ..] => {
                matched |= *c == ch;
                p = rest;
            }
        }
    }

    (matched != negate, p)
}
