//! Keycloak operator - reconciles Keycloak realms, realm roles and clients
//!
//! Custom resources declare the desired state of a Keycloak server; the
//! operator converges the server towards it through the admin REST API and
//! reports progress on each resource's status.
//!
//! # Architecture
//!
//! Every reconciliation follows the same path:
//! - Re-read the record and resolve its owner chain up to a connected
//!   Keycloak resource
//! - Resolve credentials and open a connection
//! - Run the finalizer protocol, which deletes the remote entity once the
//!   record is terminating
//! - Otherwise run the kind's pipeline of steps
//! - Write the status exactly once
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (Keycloak, KeycloakRealm, ...)
//! - [`controller`] - Reconcilers and the shared controller context
//! - [`pipeline`] - Ordered steps converging one remote entity
//! - [`deletion`] - Finalizer protocol
//! - [`keycloak`] - Identity provider port and its HTTP adapter
//! - [`store`] - Record and object access with optimistic concurrency
//! - [`credentials`] - Connection credentials from Secrets and ConfigMaps
//! - [`connection`] - Keycloak connection management
//! - [`invocation`] - Per-reconciliation span and cancellation
//! - [`retry`] - Backoff and conflict retry helpers
//! - [`config`] - Controller tuning
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod connection;
pub mod controller;
pub mod credentials;
pub mod crd;
pub mod deletion;
pub mod error;
pub mod invocation;
pub mod keycloak;
pub mod pipeline;
pub mod retry;
pub mod store;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager recorded on every write the operator makes
pub const FIELD_MANAGER: &str = "keycloak-operator";
