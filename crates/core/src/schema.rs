//! Declarative input schemas for request bodies and query strings.
//!
//! A schema validates a JSON value and returns a normalized copy: undeclared
//! fields are dropped, defaults are filled in and, for query strings, numeric
//! and boolean strings are coerced to their typed form. Every violated field is
//! reported, not just the first.

use serde_json::{Map, Value as JsonValue};

use crate::outcome::FieldError;

/// Parse-and-validate primitive consumed by the validation layers
pub trait Schema: Send + Sync + 'static {
    fn validate(&self, input: &JsonValue) -> Result<JsonValue, Vec<FieldError>>;
}

#[derive(Debug, Clone)]
enum FieldKind {
    String {
        min_len: usize,
        max_len: Option<usize>,
    },
    Integer {
        min: Option<i64>,
        max: Option<i64>,
    },
    Boolean,
    OneOf(Vec<String>),
}

/// Constraints on one object field
#[derive(Debug, Clone)]
pub struct FieldRule {
    kind: FieldKind,
    required: bool,
    default: Option<JsonValue>,
}

impl FieldRule {
    fn of(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            default: None,
        }
    }

    pub fn string() -> Self {
        Self::of(FieldKind::String {
            min_len: 0,
            max_len: None,
        })
    }

    pub fn integer() -> Self {
        Self::of(FieldKind::Integer {
            min: None,
            max: None,
        })
    }

    pub fn boolean() -> Self {
        Self::of(FieldKind::Boolean)
    }

    pub fn one_of(choices: &[&str]) -> Self {
        Self::of(FieldKind::OneOf(
            choices.iter().map(|c| c.to_string()).collect(),
        ))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value substituted when the field is absent
    pub fn default(mut self, value: impl Into<JsonValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Minimum string length, in characters
    pub fn min_len(mut self, len: usize) -> Self {
        if let FieldKind::String { min_len, .. } = &mut self.kind {
            *min_len = len;
        }
        self
    }

    /// Maximum string length, in characters
    pub fn max_len(mut self, len: usize) -> Self {
        if let FieldKind::String { max_len, .. } = &mut self.kind {
            *max_len = Some(len);
        }
        self
    }

    pub fn min(mut self, bound: i64) -> Self {
        if let FieldKind::Integer { min, .. } = &mut self.kind {
            *min = Some(bound);
        }
        self
    }

    pub fn max(mut self, bound: i64) -> Self {
        if let FieldKind::Integer { max, .. } = &mut self.kind {
            *max = Some(bound);
        }
        self
    }

    fn check(&self, value: &JsonValue, coerce: bool) -> Result<JsonValue, String> {
        match &self.kind {
            FieldKind::String { min_len, max_len } => {
                let s = value.as_str().ok_or("must be a string")?;
                let len = s.chars().count();
                if len < *min_len {
                    return Err(format!("must be at least {min_len} characters"));
                }
                if let Some(max_len) = max_len {
                    if len > *max_len {
                        return Err(format!("must be at most {max_len} characters"));
                    }
                }
                Ok(value.clone())
            }
            FieldKind::Integer { min, max } => {
                let n = match value {
                    JsonValue::Number(n) => n.as_i64(),
                    JsonValue::String(s) if coerce => s.trim().parse::<i64>().ok(),
                    _ => None,
                }
                .ok_or("must be an integer")?;
                if let Some(min) = min {
                    if n < *min {
                        return Err(format!("must be at least {min}"));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(format!("must be at most {max}"));
                    }
                }
                Ok(JsonValue::from(n))
            }
            FieldKind::Boolean => match value {
                JsonValue::Bool(b) => Ok(JsonValue::Bool(*b)),
                JsonValue::String(s) if coerce && (s == "true" || s == "false") => {
                    Ok(JsonValue::Bool(s == "true"))
                }
                _ => Err("must be a boolean".to_string()),
            },
            FieldKind::OneOf(choices) => {
                let s = value.as_str().ok_or("must be a string")?;
                if choices.iter().any(|c| c == s) {
                    Ok(value.clone())
                } else {
                    Err(format!("must be one of: {}", choices.join(", ")))
                }
            }
        }
    }
}

/// Schema for a JSON object with named fields
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: Vec<(String, FieldRule)>,
    coerce_strings: bool,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.push((name.into(), rule));
        self
    }

    /// Accept string encodings of integers and booleans, as found in query strings
    pub fn coerce_strings(mut self) -> Self {
        self.coerce_strings = true;
        self
    }
}

impl Schema for ObjectSchema {
    fn validate(&self, input: &JsonValue) -> Result<JsonValue, Vec<FieldError>> {
        let object = input
            .as_object()
            .ok_or_else(|| vec![FieldError::new("$", "must be a JSON object")])?;

        let mut output = Map::new();
        let mut errors = Vec::new();

        for (name, rule) in &self.fields {
            match object.get(name).filter(|v| !v.is_null()) {
                Some(value) => match rule.check(value, self.coerce_strings) {
                    Ok(normalized) => {
                        output.insert(name.clone(), normalized);
                    }
                    Err(message) => errors.push(FieldError::new(name.as_str(), message)),
                },
                None => {
                    if let Some(default) = &rule.default {
                        output.insert(name.clone(), default.clone());
                    } else if rule.required {
                        errors.push(FieldError::new(name.as_str(), "is required"));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(JsonValue::Object(output))
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attempt_schema() -> ObjectSchema {
        ObjectSchema::new()
            .field("caseId", FieldRule::string().required().min_len(1).max_len(64))
            .field("answer", FieldRule::string().required().max_len(10))
            .field("confidence", FieldRule::integer().min(1).max(5))
    }

    #[test]
    fn test_valid_input_is_normalized() {
        let parsed = attempt_schema()
            .validate(&json!({"caseId": "c-1", "answer": "MI", "extra": true}))
            .unwrap();
        assert_eq!(parsed, json!({"caseId": "c-1", "answer": "MI"}));
    }

    #[test]
    fn test_all_violations_are_reported() {
        let errors = attempt_schema()
            .validate(&json!({"answer": "far too long an answer", "confidence": 9}))
            .unwrap_err();

        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["caseId", "answer", "confidence"]);
        assert_eq!(errors[0].message, "is required");
    }

    #[test]
    fn test_non_object_is_rejected() {
        let errors = attempt_schema().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(errors, vec![FieldError::new("$", "must be a JSON object")]);
    }

    #[test]
    fn test_query_coercion_and_defaults() {
        let schema = ObjectSchema::new()
            .coerce_strings()
            .field("page", FieldRule::integer().min(1).default(1))
            .field("archived", FieldRule::boolean().default(false))
            .field("difficulty", FieldRule::one_of(&["beginner", "advanced"]));

        let parsed = schema
            .validate(&json!({"archived": "true", "difficulty": "advanced"}))
            .unwrap();
        assert_eq!(
            parsed,
            json!({"page": 1, "archived": true, "difficulty": "advanced"})
        );

        let errors = schema
            .validate(&json!({"page": "0", "difficulty": "expert"}))
            .unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_strings_are_not_coerced_for_bodies() {
        let schema = ObjectSchema::new().field("page", FieldRule::integer());
        assert!(schema.validate(&json!({"page": "2"})).is_err());
    }
}
