//! Template error types with suggestions

use thiserror::Error;

/// Notification template errors
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Referenced field is not in the run data
    #[error("undefined field '{name}' on line {line}{}", .suggestion.as_ref().map(|s| format!(", did you mean '{}'?", s)).unwrap_or_default())]
    UndefinedField {
        name: String,
        line: usize,
        suggestion: Option<String>,
    },

    /// Template syntax error
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { message: String, line: usize },

    /// Filter execution error
    #[error("filter failed: {message}")]
    FilterError { message: String },

    /// Wrapped minijinja error
    #[error("template error: {0}")]
    Internal(#[from] minijinja::Error),
}

impl TemplateError {
    /// Undefined field error with a suggestion drawn from the known fields
    pub fn undefined_field(name: impl Into<String>, line: usize, known: &[&str]) -> Self {
        let name = name.into();
        let suggestion = suggest_correction(&name, known);
        Self::UndefinedField {
            name,
            line,
            suggestion,
        }
    }

    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        Self::SyntaxError {
            message: message.into(),
            line,
        }
    }

    pub fn filter(message: impl Into<String>) -> Self {
        Self::FilterError {
            message: message.into(),
        }
    }
}

/// Closest candidate within half the typo's length in edits
pub fn suggest_correction(typo: &str, candidates: &[&str]) -> Option<String> {
    let max_distance = (typo.len() / 2).max(2);

    candidates
        .iter()
        .map(|c| (levenshtein_distance(typo, c), *c))
        .filter(|(d, _)| *d <= max_distance)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c.to_string())
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b_chars.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let above = row[j + 1];
            let cost = usize::from(ca != *cb);
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }

    row[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("client", "cleint"), 2);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("same", "same"), 0);
    }

    #[test]
    fn test_suggest_correction() {
        let fields = ["client_name", "piano_make", "amount", "due_date"];

        assert_eq!(
            suggest_correction("client_nmae", &fields),
            Some("client_name".into())
        );
        assert_eq!(suggest_correction("amont", &fields), Some("amount".into()));
        assert_eq!(suggest_correction("technician_phone", &fields), None);
        assert_eq!(suggest_correction("anything", &[]), None);
    }

    #[test]
    fn test_error_display() {
        let err = TemplateError::undefined_field("amont", 3, &["amount"]);
        let msg = err.to_string();
        assert!(msg.contains("undefined field 'amont'"));
        assert!(msg.contains("line 3"));
        assert!(msg.contains("did you mean 'amount'"));
    }
}
