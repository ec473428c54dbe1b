//! Field-level and record-level errors raised while turning markup into listings.

use std::fmt;

use thiserror::Error;

/// Failure to normalize a single raw field value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Nothing numeric left once the prefix and unit are stripped
    #[error("distance `{0}` is not a number")]
    InvalidDistance(String),

    /// Relative date with a malformed time of day
    #[error("time of day in `{0}` is not HH:MM")]
    InvalidTime(String),

    /// Neither a relative marker nor a `day.month.year` date
    #[error("date `{0}` could not be resolved")]
    UnresolvableDate(String),
}

/// Listing fields that can fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Link,
    Location,
    Distance,
    PostedAt,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Title => "title",
            Field::Link => "link",
            Field::Location => "location",
            Field::Distance => "distance",
            Field::PostedAt => "posted_at",
        };
        f.write_str(name)
    }
}

/// One failing field and why it failed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{field}: {reason}")]
pub struct FieldFailure {
    pub field: Field,
    pub reason: String,
}

impl FieldFailure {
    pub fn new(field: Field, reason: impl fmt::Display) -> Self {
        Self {
            field,
            reason: reason.to_string(),
        }
    }
}

/// A candidate listing rejected by the validator, with every failing field.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid listing: {}", join_failures(.failures))]
pub struct ValidationError {
    pub failures: Vec<FieldFailure>,
}

impl ValidationError {
    /// Fields that failed, in the order they were checked.
    pub fn fields(&self) -> Vec<Field> {
        self.failures.iter().map(|f| f.field).collect()
    }

    pub fn has(&self, field: Field) -> bool {
        self.failures.iter().any(|f| f.field == field)
    }
}

fn join_failures(failures: &[FieldFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
