//! Keycloak connection management
//!
//! A fresh client is built for every reconciliation. Connection failures
//! are not errors from the controller's point of view: they become
//! `connected = false` in status and a fixed-period requeue.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::credentials::ConnectionCredential;
use crate::invocation::Invocation;
use crate::keycloak::{ClientFactory, IdentityProviderClient};
use crate::Error;

/// Outcome of a connection attempt
#[derive(Clone)]
pub struct Connection {
    client: Option<Arc<dyn IdentityProviderClient>>,
    cause: Option<String>,
}

impl Connection {
    fn connected(client: Arc<dyn IdentityProviderClient>) -> Self {
        Self {
            client: Some(client),
            cause: None,
        }
    }

    fn disconnected(cause: String) -> Self {
        Self {
            client: None,
            cause: Some(cause),
        }
    }

    /// Returns true if authentication succeeded
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// The authenticated client, if connected
    pub fn client(&self) -> Option<&Arc<dyn IdentityProviderClient>> {
        self.client.as_ref()
    }

    /// Why the connection failed, if it did
    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }
}

/// Opens connections through a [`ClientFactory`]
#[derive(Clone)]
pub struct ConnectionManager {
    factory: Arc<dyn ClientFactory>,
}

impl ConnectionManager {
    /// Create a manager using `factory`
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self { factory }
    }

    /// Authenticate with `credential`
    ///
    /// Only fails when the invocation is cancelled; authentication errors
    /// are logged and returned as a disconnected [`Connection`].
    pub async fn connect(
        &self,
        inv: &Invocation,
        credential: &ConnectionCredential,
    ) -> Result<Connection, Error> {
        let attempt = async { Ok(self.factory.authenticate(credential).await) };
        match inv.store("authenticate", attempt).await? {
            Ok(client) => {
                debug!(url = %credential.url, "connected to keycloak");
                Ok(Connection::connected(client))
            }
            Err(e) => {
                warn!(url = %credential.url, error = %e, "unable to connect to keycloak");
                Ok(Connection::disconnected(e.to_string()))
            }
        }
    }
}
