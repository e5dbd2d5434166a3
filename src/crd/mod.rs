//! Custom Resource Definitions for the Keycloak operator
//!
//! All kinds live in the `keycloak.operator.dev/v1alpha1` group and share
//! the [`SyncStatus`] status block.

mod client;
mod keycloak;
mod realm;
mod realm_role;
mod types;

use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use client::{KeycloakClient, KeycloakClientSpec};
pub use keycloak::{Keycloak, KeycloakSpec, DEFAULT_AUTH_REALM};
pub use realm::{KeycloakRealm, KeycloakRealmSpec};
pub use realm_role::{KeycloakRealmRole, KeycloakRealmRoleSpec};
pub use types::{CertificateSource, RealmRoleRef, SyncStatus};

/// A namespaced custom resource carrying a [`SyncStatus`]
pub trait TrackedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Current status, if any was written
    fn sync_status(&self) -> Option<&SyncStatus>;

    /// Replace the status in place
    fn set_sync_status(&mut self, status: SyncStatus);

    /// Consecutive failures recorded on the object
    fn failure_count(&self) -> i64 {
        self.sync_status().map_or(0, |s| s.failure_count)
    }
}

macro_rules! tracked_resource {
    ($($kind:ty),+ $(,)?) => {
        $(
            impl TrackedResource for $kind {
                fn sync_status(&self) -> Option<&SyncStatus> {
                    self.status.as_ref()
                }

                fn set_sync_status(&mut self, status: SyncStatus) {
                    self.status = Some(status);
                }
            }
        )+
    };
}

tracked_resource!(Keycloak, KeycloakRealm, KeycloakRealmRole, KeycloakClient);

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn all_kinds_share_the_group() {
        for crd in [
            Keycloak::crd(),
            KeycloakRealm::crd(),
            KeycloakRealmRole::crd(),
            KeycloakClient::crd(),
        ] {
            assert_eq!(crd.spec.group, "keycloak.operator.dev");
            assert_eq!(crd.spec.scope, "Namespaced");
        }
        assert_eq!(KeycloakRealm::crd_name(), "keycloakrealms.keycloak.operator.dev");
    }

    #[test]
    fn failure_count_defaults_to_zero_without_status() {
        let realm = KeycloakRealm::new(
            "main",
            KeycloakRealmSpec {
                realm_name: "ns.test".into(),
                keycloak_owner: None,
                display_name: None,
            },
        );
        assert_eq!(realm.failure_count(), 0);
    }
}
