// LIKE Pattern Matching
//
// SQL LIKE patterns are translated to anchored, case-insensitive regular
// expressions. A pattern known when the comparison is built is compiled once;
// a pattern coming from a variable or a path is compiled on demand and the last
// compilation is cached.

use std::fmt;

use log::trace;
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};

use crate::query::executor::result::{QueryError, QueryResult};

/// Translate a LIKE pattern to a whole-string regular expression
pub fn like_to_regex(pattern: &str, escape: Option<char>) -> QueryResult<Regex> {
    let mut expression = String::with_capacity(pattern.len() + 8);
    expression.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if Some(c) == escape {
            let escaped = chars.next().ok_or_else(|| {
                QueryError::InvalidOperation(format!("LIKE pattern '{}' ends with its escape character", pattern))
            })?;
            expression.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4])));
            continue;
        }
        match c {
            '%' => expression.push_str(".*"),
            '_' => expression.push('.'),
            other => expression.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expression.push('$');
    Ok(RegexBuilder::new(&expression)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()?)
}

enum PatternKind {
    Static(Regex),
    Dynamic(Mutex<Option<(String, Regex)>>),
}

/// A compiled or lazily compiled LIKE pattern
pub struct LikePattern {
    escape: Option<char>,
    kind: PatternKind,
}

impl LikePattern {
    /// Pattern text known up front
    pub fn fixed(pattern: &str, escape: Option<char>) -> QueryResult<Self> {
        Ok(LikePattern {
            escape,
            kind: PatternKind::Static(like_to_regex(pattern, escape)?),
        })
    }

    /// Pattern text supplied at evaluation time
    pub fn dynamic(escape: Option<char>) -> Self {
        LikePattern {
            escape,
            kind: PatternKind::Dynamic(Mutex::new(None)),
        }
    }

    pub fn escape(&self) -> Option<char> {
        self.escape
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.kind, PatternKind::Dynamic(_))
    }

    /// Match `text` against the pattern; `pattern` is only consulted for dynamic patterns
    pub fn matches(&self, text: &str, pattern: &str) -> QueryResult<bool> {
        match &self.kind {
            PatternKind::Static(regex) => Ok(regex.is_match(text)),
            PatternKind::Dynamic(cache) => {
                let mut cache = cache.lock();
                if let Some((cached, regex)) = cache.as_ref() {
                    if cached == pattern {
                        return Ok(regex.is_match(text));
                    }
                }
                trace!("Compiling LIKE pattern '{}'", pattern);
                let regex = like_to_regex(pattern, self.escape)?;
                let matched = regex.is_match(text);
                *cache = Some((pattern.to_string(), regex));
                Ok(matched)
            }
        }
    }
}

impl Clone for LikePattern {
    fn clone(&self) -> Self {
        let kind = match &self.kind {
            PatternKind::Static(regex) => PatternKind::Static(regex.clone()),
            PatternKind::Dynamic(_) => PatternKind::Dynamic(Mutex::new(None)),
        };
        LikePattern {
            escape: self.escape,
            kind,
        }
    }
}

impl fmt::Debug for LikePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PatternKind::Static(regex) => write!(f, "LikePattern({})", regex.as_str()),
            PatternKind::Dynamic(_) => write!(f, "LikePattern(dynamic)"),
        }
    }
}
