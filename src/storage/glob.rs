//! Glob matching for KEYS and the scan family.
//!
//! Supported patterns:
//! - `*` matches any run of bytes (including none)
//! - `?` matches exactly one byte
//! - `[abc]`, `[a-z]`, `[^a]` match one byte from (or outside) a class
//! - `\x` matches `x` literally

/// A compiled glob pattern over raw bytes.
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: Vec<u8>,
    match_all: bool,
}

impl Glob {
    pub fn new(pattern: impl AsRef<[u8]>) -> Self {
        let pattern = pattern.as_ref().to_vec();
        let match_all = pattern == b"*";
        Self { pattern, match_all }
    }

    /// Returns true if the pattern matches every input.
    pub fn is_match_all(&self) -> bool {
        self.match_all
    }

    pub fn matches(&self, text: &[u8]) -> bool {
        self.match_all || matches_at(&self.pattern, text)
    }
}

impl Default for Glob {
    fn default() -> Self {
        Self::new("*")
    }
}

fn matches_at(pattern: &[u8], text: &[u8]) -> bool {
    if pattern.is_empty() {
        return text.is_empty();
    }

    match pattern[0] {
        b'*' => (0..=text.len()).any(|i| matches_at(&pattern[1..], &text[i..])),
        b'?' => !text.is_empty() && matches_at(&pattern[1..], &text[1..]),
        b'[' => {
            if text.is_empty() {
                return false;
            }

            let mut i = 1;
            let negate = pattern.get(1) == Some(&b'^');
            if negate {
                i += 1;
            }

            let mut matched = false;
            while i < pattern.len() && pattern[i] != b']' {
                if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
                    if (pattern[i]..=pattern[i + 2]).contains(&text[0]) {
                        matched = true;
                    }
                    i += 3;
                    continue;
                }
                if pattern[i] == text[0] {
                    matched = true;
                }
                i += 1;
            }

            // Unterminated class never matches
            if i >= pattern.len() {
                return false;
            }
            matched != negate && matches_at(&pattern[i + 1..], &text[1..])
        }
        b'\\' if pattern.len() > 1 => {
            !text.is_empty() && pattern[1] == text[0] && matches_at(&pattern[2..], &text[1..])
        }
        c => !text.is_empty() && c == text[0] && matches_at(&pattern[1..], &text[1..]),
    }
}
