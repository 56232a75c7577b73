use std::fmt;

/// Input field a [`FieldError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Email,
    Password,
    FirstName,
    LastName,
    Group,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Email => "email",
            Field::Password => "password",
            Field::FirstName => "first name",
            Field::LastName => "last name",
            Field::Group => "group",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Problem {
    Missing,
    InvalidFormat,
    Negative,
    NotSupported,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Problem::Missing => "is required",
            Problem::InvalidFormat => "has an invalid format",
            Problem::Negative => "must not be negative",
            Problem::NotSupported => "is not supported by this configuration",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub problem: Problem,
}

impl FieldError {
    pub fn new(field: Field, problem: Problem) -> Self {
        Self { field, problem }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.problem)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("password hashing failed: {0}")]
pub struct HashingError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("a user with this email already exists")]
    DuplicateEmail,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("invalid user: {}", join_field_errors(.0))]
    Validation(Vec<FieldError>),

    #[error(transparent)]
    Hashing(#[from] HashingError),

    #[error("a user with email {email} already exists")]
    DuplicateEmail { email: String },

    #[error("storage error: {0}")]
    Storage(#[source] sqlx::Error),
}

impl ProvisionError {
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ProvisionError::Validation(errors) => errors,
            _ => &[],
        }
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
