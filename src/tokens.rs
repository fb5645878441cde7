use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token keys must not be empty")]
    EmptyKey,

    #[error("token {key:?} has a {kind} value; only strings, numbers and booleans are allowed")]
    UnsupportedValue { key: String, kind: &'static str },

    #[error("expected KEY=VALUE, got {0:?}")]
    BadAssignment(String),

    #[error("token file must contain a JSON object")]
    NotAnObject,
}

/// Ordered mapping from literal token to replacement text.
///
/// Order matters when one replacement contains another key: entries are
/// applied one after the other, so `{"${A}": "${B}", "${B}": "X"}` turns
/// `"${A}"` into `"X"`, while the reverse order leaves `"${B}"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMap {
    entries: Vec<(String, String)>,
}

impl TokenMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a token. A replaced token keeps its position.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), TokenError> {
        let key = key.into();
        if key.is_empty() {
            return Err(TokenError::EmptyKey);
        }
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    /// Parses a `KEY=VALUE` command-line assignment, splitting at the first `=`.
    pub fn insert_assignment(&mut self, assignment: &str) -> Result<(), TokenError> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| TokenError::BadAssignment(assignment.to_string()))?;
        self.insert(key, value)
    }

    /// Adds every member of a JSON object, in document order.
    pub fn extend_from_json(&mut self, value: &Value) -> Result<(), TokenError> {
        let object = value.as_object().ok_or(TokenError::NotAnObject)?;
        for (key, value) in object {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => return Err(unsupported(key, "null")),
                Value::Array(_) => return Err(unsupported(key, "array")),
                Value::Object(_) => return Err(unsupported(key, "object")),
            };
            self.insert(key.as_str(), text)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn unsupported(key: &str, kind: &'static str) -> TokenError {
    TokenError::UnsupportedValue {
        key: key.to_string(),
        kind,
    }
}

/// Replaces every token of `tokens` in `text`, entry by entry.
///
/// Each entry replaces all non-overlapping literal occurrences of its key in
/// the output of the previous entry. The flag is set as soon as any step
/// leaves the text different from the input, even if a later step happens
/// to restore it.
pub fn substitute(text: &str, tokens: &TokenMap) -> (String, bool) {
    let mut current = text.to_string();
    let mut changed = false;
    for (key, value) in tokens.iter() {
        if !current.contains(key) {
            continue;
        }
        current = current.replace(key, value);
        changed |= current != text;
    }
    (current, changed)
}
