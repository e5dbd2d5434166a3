//! Error types for the Keycloak operator

use thiserror::Error;

use crate::keycloak::KeycloakError;

/// Main error type for reconciliation
///
/// Display strings chain their causes inline because the rendered message
/// is persisted verbatim into `status.value`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error not covered by a more specific variant
    #[error("kubernetes error: {source}")]
    Kube {
        /// Underlying client error
        #[from]
        source: kube::Error,
    },

    /// The reconciled record no longer exists
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Resource kind
        kind: String,
        /// Namespace
        namespace: String,
        /// Name
        name: String,
    },

    /// A referenced Secret or ConfigMap does not exist
    #[error("{kind} {namespace}/{name} not found")]
    ReferenceNotFound {
        /// Referenced kind
        kind: &'static str,
        /// Namespace
        namespace: String,
        /// Name
        name: String,
    },

    /// Credential material is present but unusable
    #[error("invalid credentials in {namespace}/{name}: {message}")]
    InvalidCredentials {
        /// Namespace
        namespace: String,
        /// Object holding the material
        name: String,
        /// What is wrong with it
        message: String,
    },

    /// Optimistic-concurrency violation on a record write
    #[error("conflicting write to {kind} {namespace}/{name}")]
    Conflict {
        /// Resource kind
        kind: String,
        /// Namespace
        namespace: String,
        /// Name
        name: String,
    },

    /// The owner chain of a record cannot be resolved
    #[error("unable to resolve owner of {kind} {name}: {message}")]
    OwnerUnresolved {
        /// Resource kind
        kind: String,
        /// Name
        name: String,
        /// Reason
        message: String,
    },

    /// A Keycloak call failed
    #[error("{operation} failed for {entity}: {source}")]
    Remote {
        /// Operation name, e.g. `createRealmRole`
        operation: &'static str,
        /// Natural key of the entity
        entity: String,
        /// Adapter error
        #[source]
        source: KeycloakError,
    },

    /// A pipeline step failed
    #[error("unable to {step}: {source}")]
    Step {
        /// Step name
        step: &'static str,
        /// Cause
        #[source]
        source: Box<Error>,
    },

    /// Remote cleanup of a terminating record failed
    #[error("error during deletion of {entity}: {source}")]
    Deletion {
        /// Natural key of the entity
        entity: String,
        /// Cause
        #[source]
        source: Box<Error>,
    },

    /// Object is missing a required metadata field
    #[error("object is missing {0}")]
    MissingObjectKey(&'static str),

    /// The invocation was cancelled during shutdown
    #[error("cancelled during {operation}")]
    Cancelled {
        /// Operation in flight
        operation: &'static str,
    },

    /// Invariant breach or panic inside a reconciliation
    #[error("internal error: {message}")]
    Internal {
        /// Description
        message: String,
    },
}

impl Error {
    /// Create a not-found error for a record
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a conflict error for a record
    pub fn conflict(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create an error for invalid credential material
    pub fn invalid_credentials(
        namespace: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidCredentials {
            namespace: namespace.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an owner resolution error
    pub fn owner_unresolved(
        kind: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::OwnerUnresolved {
            kind: kind.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Wrap an adapter error with the operation and entity it concerned
    pub fn remote(operation: &'static str, entity: impl Into<String>, source: KeycloakError) -> Self {
        Self::Remote {
            operation,
            entity: entity.into(),
            source,
        }
    }

    /// Wrap an error with the pipeline step it came from
    pub fn step(step: &'static str, source: Error) -> Self {
        Self::Step {
            step,
            source: Box::new(source),
        }
    }

    /// Wrap an error raised while deleting a remote entity
    pub fn deletion(entity: impl Into<String>, source: Error) -> Self {
        Self::Deletion {
            entity: entity.into(),
            source: Box::new(source),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: &'static str) -> Self {
        Self::Cancelled { operation }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true for optimistic-concurrency violations
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true when the reconciled record itself is gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true when the invocation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: What operators read in status.value
    // ==========================================================================

    /// Story: a failed role creation names the step, the call and the cause
    ///
    /// The whole chain ends up in status.value, so a user looking at the
    /// resource sees which step broke and what Keycloak answered.
    #[test]
    fn story_pipeline_failure_reads_as_a_chain() {
        let remote = Error::remote(
            "createRealmRole",
            "realm role ns.test/role-test",
            KeycloakError::api(500, "test mock fatal"),
        );
        let err = Error::step("put realm roles", remote);

        assert_eq!(
            err.to_string(),
            "unable to put realm roles: createRealmRole failed for realm role \
             ns.test/role-test: keycloak api error (500): test mock fatal"
        );
    }

    /// Story: deletion failures keep the entity in the message
    #[test]
    fn story_deletion_failure_names_the_entity() {
        let remote = Error::remote(
            "deleteRealm",
            "realm ns.test",
            KeycloakError::api(503, "unavailable"),
        );
        let err = Error::deletion("realm ns.test", remote);

        assert!(err.to_string().starts_with("error during deletion of realm ns.test"));
        assert!(err.to_string().contains("unavailable"));
    }

    /// Story: the controller branches on error classes, not strings
    #[test]
    fn story_errors_are_classified_for_the_controller() {
        assert!(Error::conflict("KeycloakRealm", "ns", "main").is_conflict());
        assert!(Error::not_found("KeycloakRealm", "ns", "main").is_not_found());
        assert!(Error::cancelled("get record").is_cancelled());

        let owner = Error::owner_unresolved("KeycloakRealm", "main", "keycloak is not connected");
        assert!(!owner.is_conflict());
        assert!(!owner.is_not_found());
        assert!(owner.to_string().contains("keycloak is not connected"));
    }

    /// Story: credential problems point at the Secret to fix
    #[test]
    fn story_credential_errors_point_at_the_secret() {
        let err = Error::invalid_credentials("identity", "keycloak-admin", "missing field password");
        assert_eq!(
            err.to_string(),
            "invalid credentials in identity/keycloak-admin: missing field password"
        );

        let err = Error::ReferenceNotFound {
            kind: "secret",
            namespace: "identity".into(),
            name: "keycloak-admin".into(),
        };
        assert_eq!(err.to_string(), "secret identity/keycloak-admin not found");
    }
}
