use std::fmt;

use crate::users::error::{Field, FieldError, Problem};

/// Raw values for the user to create, as extracted from the command line.
///
/// `None` means the value was not given at all; `Some("")` means it was
/// given empty. Required fields reject both, while `group` only accepts
/// `None` as "no group".
#[derive(Clone, Default)]
pub struct NewUserInput {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub group: Option<String>,
}

impl NewUserInput {
    /// Required fields that are absent or empty, in declaration order.
    pub fn missing_fields(&self) -> Vec<FieldError> {
        [
            (Field::Email, &self.email),
            (Field::Password, &self.password),
            (Field::FirstName, &self.first_name),
            (Field::LastName, &self.last_name),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
        .map(|(field, _)| FieldError::new(field, Problem::Missing))
        .collect()
    }
}

impl fmt::Debug for NewUserInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUserInput")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("group", &self.group)
            .finish()
    }
}
