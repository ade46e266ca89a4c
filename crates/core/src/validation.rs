use std::{fmt, sync::LazyLock};

use regex::Regex;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Largest amount accepted in a money field.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("Invalid regex")
});

/// A single rejected field with a human readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation failure carrying every offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", describe(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    /// Builds an error for a single field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    /// Returns `true` when `field` is among the rejected fields.
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|error| error.field == field)
    }
}

fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(FieldError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Accumulates field errors while a record is checked.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn require(&mut self, field: &'static str, value: &str) {
        if value.trim().is_empty() {
            self.reject(field, "is required");
        }
    }

    pub fn check(&mut self, field: &'static str, ok: bool, message: &str) {
        if !ok {
            self.reject(field, message);
        }
    }

    /// Rejects money outside `[minimum, MAX_AMOUNT]`; `inclusive` decides whether `minimum` itself passes.
    pub fn amount(&mut self, field: &'static str, value: Decimal, minimum: Decimal, inclusive: bool) {
        let above_floor = if inclusive { value >= minimum } else { value > minimum };
        if !above_floor {
            let relation = if inclusive { "must not be less than" } else { "must be greater than" };
            self.reject(field, format!("{relation} {minimum}"));
        } else if value > Decimal::from(MAX_AMOUNT) {
            self.reject(field, format!("must not exceed {MAX_AMOUNT}"));
        }
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                errors: self.errors,
            })
        }
    }
}

/// Decodes a JSON document into `T`. Shape errors name the offending field.
pub fn decode_document<T: DeserializeOwned>(document: Value) -> Result<T, ValidationError> {
    serde_path_to_error::deserialize(document).map_err(shape_error)
}

fn shape_error(err: serde_path_to_error::Error<serde_json::Error>) -> ValidationError {
    let path = err.path().to_string();
    let message = err.into_inner().to_string();
    if path == "." {
        if let Some(field) = missing_field(&message) {
            return ValidationError::field(field.to_string(), "is required");
        }
        return ValidationError::field("body", message);
    }
    ValidationError::field(path, message)
}

fn missing_field(message: &str) -> Option<&str> {
    message.strip_prefix("missing field `")?.strip_suffix('`')
}

/// Checks the `local@domain.tld` shape accepted by the customer forms.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Phone numbers must carry 10 to 15 digits once punctuation is stripped.
pub fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    (10..=15).contains(&digits)
}
