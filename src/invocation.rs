//! Per-reconciliation context
//!
//! An [`Invocation`] is created for every reconcile call and handed to each
//! component it touches. It carries the tracing span that tags all log lines
//! with the resource identity, and a cancellation token derived from the
//! process shutdown token. Every store and remote call is raced against the
//! token so shutdown never waits on a hung Keycloak.

use std::fmt::Display;
use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::keycloak::KeycloakError;
use crate::Error;

/// Context of one reconcile call
#[derive(Clone, Debug)]
pub struct Invocation {
    span: Span,
    cancel: CancellationToken,
}

impl Invocation {
    /// Create an invocation for the given resource
    pub fn new(kind: &str, namespace: &str, name: &str, cancel: CancellationToken) -> Self {
        let span = tracing::info_span!("reconcile", %kind, %namespace, %name);
        Self { span, cancel }
    }

    /// Span all log lines of this invocation belong to
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Run a store operation unless the invocation is cancelled first
    pub async fn store<T, F>(&self, operation: &'static str, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::cancelled(operation)),
            result = fut => result,
        }
    }

    /// Run a Keycloak call, wrapping failures with the operation and entity
    pub async fn remote<T, F>(
        &self,
        operation: &'static str,
        entity: impl Display,
        fut: F,
    ) -> Result<T, Error>
    where
        F: Future<Output = Result<T, KeycloakError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::cancelled(operation)),
            result = fut => result.map_err(|source| Error::remote(operation, entity.to_string(), source)),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_testing() -> Self {
        Self::new("Test", "default", "test", CancellationToken::new())
    }
}
