//! Shell-style wildcard patterns
//!
//! Supported syntax is `*` (any run of characters), `?` (any single
//! character), `[abc]` and `[a-z]` (character classes), and a backtick to
//! escape the next character. Matching is case-insensitive and anchored on
//! both ends.

use crate::method::MethodInfo;
use regex::RegexSet;
use thiserror::Error;

/// Translate a wildcard pattern into an equivalent regex
fn to_regex(pattern: &str) -> Result<String, WildcardError> {
    let mut regex = String::from("(?is)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '`' => {
                let escaped = chars.next().ok_or(WildcardError::TrailingEscape)?;
                push_literal(&mut regex, escaped);
            }
            '[' => {
                let mut class = Vec::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some('`') => {
                            class.push((chars.next().ok_or(WildcardError::TrailingEscape)?, true))
                        }
                        Some(c) => class.push((c, false)),
                        None => return Err(WildcardError::UnterminatedClass),
                    }
                }
                if class.is_empty() {
                    return Err(WildcardError::EmptyClass);
                }
                regex.push('[');
                let last = class.len() - 1;
                for (idx, (c, escaped)) in class.into_iter().enumerate() {
                    if c == '-' && !escaped && idx != 0 && idx != last {
                        regex.push('-');
                    } else {
                        push_literal(&mut regex, c);
                    }
                }
                regex.push(']');
            }
            c => push_literal(&mut regex, c),
        }
    }
    regex.push('$');
    Ok(regex)
}

/// Append a character to a regex, escaping it if needed
fn push_literal(regex: &mut String, c: char) {
    let mut buf = [0; 4];
    regex.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}

/// Set of wildcard patterns, which matches if any pattern matches
#[derive(Clone, Debug)]
pub struct WildcardSet {
    /// Patterns, as written by the user
    patterns: Box<[Box<str>]>,

    /// Equivalent regexes
    regexes: RegexSet,
}
//
impl WildcardSet {
    /// Compile a set of patterns
    pub fn new<S: AsRef<str>>(
        patterns: impl IntoIterator<Item = S>,
    ) -> Result<Self, WildcardError> {
        let mut sources = Vec::<Box<str>>::new();
        let mut regexes = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            regexes.push(to_regex(pattern)?);
            sources.push(pattern.into());
        }
        Ok(Self {
            patterns: sources.into(),
            regexes: RegexSet::new(regexes)?,
        })
    }

    /// Patterns, as written by the user
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| &**p)
    }

    /// Truth that this set has no pattern, and thus never matches
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Truth that any pattern matches some text
    pub fn is_match(&self, text: &str) -> bool {
        self.regexes.is_match(text)
    }

    /// Truth that any pattern matches the identity of a method
    ///
    /// The method name, declaring type name, module name and type-qualified
    /// method name are all tried.
    pub fn matches_method(&self, method: &MethodInfo) -> bool {
        [&*method.method_name, &*method.type_name, &*method.module_name]
            .into_iter()
            .any(|text| self.is_match(text))
            || self.is_match(&method.full_name())
    }
}

/// What can go wrong while compiling a wildcard pattern
#[derive(Debug, Error)]
pub enum WildcardError {
    /// A character class was opened with `[` but never closed
    #[error("unterminated character class")]
    UnterminatedClass,

    /// A character class has no characters
    #[error("empty character class")]
    EmptyClass,

    /// The pattern ends with the escape character
    #[error("escape character at end of pattern")]
    TrailingEscape,

    /// The translated regex was rejected
    #[error("failed to compile pattern ({0})")]
    Regex(#[from] regex::Error),
}
