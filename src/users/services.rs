use std::fmt;

use tracing::{debug, info, warn};

use crate::users::{
    dto::NewUserInput,
    error::{Field, FieldError, Problem, ProvisionError, SaveError},
    password::CredentialHasher,
    repo::UserRepository,
    repo_types::{StoredUser, UserRecord},
};

/// Where a provisioning attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Unvalidated,
    Validated,
    Persisted,
    Rejected,
    PersistFailed,
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProvisioningState::Unvalidated => "unvalidated",
            ProvisioningState::Validated => "validated",
            ProvisioningState::Persisted => "persisted",
            ProvisioningState::Rejected => "rejected",
            ProvisioningState::PersistFailed => "persist_failed",
        })
    }
}

/// Receives the progress of a provisioning attempt. Supplied by the caller.
pub trait ProvisioningObserver: Send + Sync {
    fn transition(&self, email: &str, from: ProvisioningState, to: ProvisioningState);

    fn persisted(&self, _user: &StoredUser) {}
}

/// Forwards workflow progress to `tracing`.
pub struct TracingObserver;

impl ProvisioningObserver for TracingObserver {
    fn transition(&self, email: &str, from: ProvisioningState, to: ProvisioningState) {
        match to {
            ProvisioningState::Rejected | ProvisioningState::PersistFailed => {
                warn!(email, %from, %to, "user provisioning failed")
            }
            _ => debug!(email, %from, %to, "user provisioning state"),
        }
    }

    fn persisted(&self, user: &StoredUser) {
        info!(
            user_id = user.id,
            email = %user.email,
            group_id = ?user.group_id,
            "user created"
        );
    }
}

pub struct ProvisioningWorkflow {
    hasher: CredentialHasher,
    repository: Box<dyn UserRepository>,
    group_assignment: bool,
}

impl ProvisioningWorkflow {
    pub fn new(
        hasher: CredentialHasher,
        repository: Box<dyn UserRepository>,
        group_assignment: bool,
    ) -> Self {
        Self {
            hasher,
            repository,
            group_assignment,
        }
    }

    /// Hashes, validates and saves one user.
    ///
    /// Missing required fields are rejected before anything else happens.
    /// The repository is only reached with a record that passed validation.
    pub async fn provision(
        &self,
        input: NewUserInput,
        observer: &dyn ProvisioningObserver,
    ) -> Result<StoredUser, ProvisionError> {
        use ProvisioningState::*;

        let missing = input.missing_fields();
        let NewUserInput {
            email,
            password,
            first_name,
            last_name,
            group,
        } = input;
        let email = email.unwrap_or_default();

        if !missing.is_empty() {
            observer.transition(&email, Unvalidated, Rejected);
            return Err(ProvisionError::Validation(missing));
        }

        let (group_id, group_error) = self.resolve_group(group.as_deref());

        let password_hash = match self.hasher.hash(password.as_deref().unwrap_or_default()) {
            Ok(hash) => hash,
            Err(e) => {
                observer.transition(&email, Unvalidated, Rejected);
                return Err(e.into());
            }
        };

        let record = UserRecord {
            email,
            password_hash,
            first_name: first_name.unwrap_or_default(),
            last_name: last_name.unwrap_or_default(),
            group_id,
        };

        let mut errors = record.validate();
        errors.extend(group_error);
        if !errors.is_empty() {
            observer.transition(&record.email, Unvalidated, Rejected);
            return Err(ProvisionError::Validation(errors));
        }
        observer.transition(&record.email, Unvalidated, Validated);

        match self.repository.save(&record).await {
            Ok(user) => {
                observer.transition(&record.email, Validated, Persisted);
                observer.persisted(&user);
                Ok(user)
            }
            Err(e) => {
                observer.transition(&record.email, Validated, PersistFailed);
                Err(match e {
                    SaveError::DuplicateEmail => ProvisionError::DuplicateEmail {
                        email: record.email,
                    },
                    SaveError::Storage(cause) => ProvisionError::Storage(cause),
                })
            }
        }
    }

    fn resolve_group(&self, raw: Option<&str>) -> (Option<i64>, Option<FieldError>) {
        let Some(raw) = raw else {
            return (None, None);
        };
        if !self.group_assignment {
            return (None, Some(FieldError::new(Field::Group, Problem::NotSupported)));
        }
        match raw.trim().parse::<i64>() {
            Ok(id) => (Some(id), None),
            Err(_) => (None, Some(FieldError::new(Field::Group, Problem::InvalidFormat))),
        }
    }
}
