use lazy_static::lazy_static;
use regex::Regex;
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::users::error::{Field, FieldError, Problem};

lazy_static! {
    // local@label(.label)+ where no domain label is empty
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s.]+(?:\.[^@\s.]+)+$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// A user about to be written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub email: String,
    pub password_hash: String,   // Argon2 PHC string, never the plaintext
    pub first_name: String,
    pub last_name: String,
    pub group_id: Option<i64>,   // None means no group
}

impl UserRecord {
    /// Every rule is checked so the caller sees all problems at once.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.email.is_empty() {
            errors.push(FieldError::new(Field::Email, Problem::Missing));
        } else if !is_valid_email(&self.email) {
            errors.push(FieldError::new(Field::Email, Problem::InvalidFormat));
        }

        if self.password_hash.is_empty() {
            errors.push(FieldError::new(Field::Password, Problem::Missing));
        }
        if self.first_name.is_empty() {
            errors.push(FieldError::new(Field::FirstName, Problem::Missing));
        }
        if self.last_name.is_empty() {
            errors.push(FieldError::new(Field::LastName, Problem::Missing));
        }

        if matches!(self.group_id, Some(id) if id < 0) {
            errors.push(FieldError::new(Field::Group, Problem::Negative));
        }

        errors
    }
}

/// User row as stored in the database.
#[derive(Debug, Clone, FromRow)]
pub struct StoredUser {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub group_id: Option<i64>,
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> UserRecord {
        UserRecord {
            email: "a@b.com".into(),
            password_hash: "$argon2id$v=19$m=64,t=1,p=1$c2FsdHNhbHQ$aGFzaA".into(),
            first_name: "Ana".into(),
            last_name: "Lee".into(),
            group_id: None,
        }
    }

    #[test]
    fn valid_record_has_no_errors() {
        assert!(valid().validate().is_empty());
        let with_group = UserRecord {
            group_id: Some(0),
            ..valid()
        };
        assert!(with_group.validate().is_empty());
    }

    #[test]
    fn each_missing_field_is_reported_alone() {
        let cases: Vec<(UserRecord, Field)> = vec![
            (UserRecord { email: String::new(), ..valid() }, Field::Email),
            (UserRecord { password_hash: String::new(), ..valid() }, Field::Password),
            (UserRecord { first_name: String::new(), ..valid() }, Field::FirstName),
            (UserRecord { last_name: String::new(), ..valid() }, Field::LastName),
        ];
        for (record, field) in cases {
            assert_eq!(
                record.validate(),
                vec![FieldError::new(field, Problem::Missing)],
                "only {} should fail",
                field
            );
        }
    }

    #[test]
    fn all_problems_are_reported_together() {
        let record = UserRecord {
            email: "not-an-email".into(),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: "Lee".into(),
            group_id: Some(-1),
        };
        assert_eq!(
            record.validate(),
            vec![
                FieldError::new(Field::Email, Problem::InvalidFormat),
                FieldError::new(Field::Password, Problem::Missing),
                FieldError::new(Field::FirstName, Problem::Missing),
                FieldError::new(Field::Group, Problem::Negative),
            ]
        );
    }

    #[test]
    fn negative_group_is_rejected() {
        let record = UserRecord {
            group_id: Some(-1),
            ..valid()
        };
        assert_eq!(
            record.validate(),
            vec![FieldError::new(Field::Group, Problem::Negative)]
        );
    }

    #[test]
    fn email_syntax() {
        for ok in ["a@b.com", "first.last+tag@mail.example.org", "x@y.co.uk"] {
            assert!(is_valid_email(ok), "{ok} should be accepted");
        }
        for bad in [
            "",
            "a@b",
            "@b.com",
            "a@",
            "a b@c.com",
            "a@@b.com",
            "a@b.com.",
            "a@.b.com",
            "a@b..com",
        ] {
            assert!(!is_valid_email(bad), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn empty_and_trailing_dot_emails_fail_validation() {
        let empty = UserRecord {
            email: String::new(),
            ..valid()
        };
        assert_eq!(
            empty.validate(),
            vec![FieldError::new(Field::Email, Problem::Missing)]
        );

        let trailing_dot = UserRecord {
            email: "a@b.com.".into(),
            ..valid()
        };
        assert_eq!(
            trailing_dot.validate(),
            vec![FieldError::new(Field::Email, Problem::InvalidFormat)]
        );
    }
}
