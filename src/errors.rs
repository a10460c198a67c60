//! Typed error hierarchy for forms.
//!
//! - `FieldError` / `FieldErrors`: per-field validation, always handled locally
//! - `SchemaError`: a malformed form definition
//! - `ApiError`: transport and backend failures
//! - `GateError`: a form that is no longer available to this session
//! - `BuilderError`, `SaveError`, `SubmitRejected`: refused operations

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("required")]
    Required,

    #[error("invalid email")]
    InvalidEmail,

    #[error("not a number")]
    NotANumber,

    #[error("must be at least {0}")]
    BelowMin(f64),

    #[error("must be at most {0}")]
    AboveMax(f64),

    #[error("must be at least {0} characters")]
    TooShort(usize),

    #[error("must be at most {0} characters")]
    TooLong(usize),

    #[error("'{0}' is not one of the options")]
    NotAnOption(String),

    #[error("invalid date (expected YYYY-MM-DD)")]
    InvalidDate,

    #[error("invalid phone number")]
    InvalidPhone,

    #[error("invalid url")]
    InvalidUrl,

    #[error("expected {0}")]
    WrongType(&'static str),
}

/// Validation failures for one pass, in definition order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldErrors(Vec<(String, FieldError)>);

impl FieldErrors {
    pub fn push(&mut self, field_id: impl Into<String>, err: FieldError) {
        self.0.push((field_id.into(), err));
    }

    pub fn remove(&mut self, field_id: &str) {
        self.0.retain(|(id, _)| id != field_id);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field_id: &str) -> Option<&FieldError> {
        self.0.iter().find(|(id, _)| id == field_id).map(|(_, e)| e)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldError)> {
        self.0.iter().map(|(id, e)| (id.as_str(), e))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(id, e)| format!("{id}: {e}")).collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("form title must not be empty")]
    EmptyTitle,

    #[error("section '{0}' has an empty title")]
    EmptySectionTitle(String),

    #[error("duplicate section id '{0}'")]
    DuplicateSection(String),

    #[error("duplicate field id '{0}'")]
    DuplicateField(String),

    #[error("field '{0}' has an empty label")]
    EmptyLabel(String),

    #[error("field '{0}' needs at least one option")]
    MissingOptions(String),

    #[error("field '{field}' has min {min} greater than max {max}")]
    InvertedRange { field: String, min: f64, max: f64 },

    #[error("empty id")]
    EmptyId,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("form '{0}' not found")]
    NotFound(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    /// Authorization/expiry refusals from the backend end the session rather than inviting a retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApiError::Status { status, .. } if *status == 401 || *status == 403 || *status == 410)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("this link expired")]
    LinkExpired,

    #[error("the time limit of {0} minute(s) is exceeded")]
    TimeLimitExceeded(u32),

    #[error("this form accepts a single submission")]
    AttemptsExhausted,

    #[error("{0}")]
    Refused(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuilderError {
    #[error("unknown section '{0}'")]
    UnknownSection(String),

    #[error("unknown field '{field}' in section '{section}'")]
    UnknownField { section: String, field: String },

    #[error("new order is not a permutation of the existing ids")]
    NotAPermutation,

    #[error("id '{0}' is already taken")]
    DuplicateId(String),

    #[error("a save is in progress")]
    SaveInProgress,

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditRefused {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("the form is read-only right now")]
    Locked,
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("cannot save: {0}")]
    Invalid(#[from] SchemaError),

    #[error("a save is already in progress")]
    InProgress,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Why a submit attempt did not start.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitRejected {
    #[error("please fix {} highlighted field(s)", .0.len())]
    Invalid(FieldErrors),

    #[error("submission is disabled in preview")]
    Preview,

    #[error("a submission is already in progress")]
    InFlight,

    #[error("already submitted; start a new response first")]
    RestartRequired,

    #[error(transparent)]
    Gate(#[from] GateError),
}

/// Outcome of the synchronous submit path.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Rejected(#[from] SubmitRejected),

    #[error(transparent)]
    Api(#[from] ApiError),
}
