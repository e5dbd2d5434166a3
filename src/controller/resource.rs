//! Per-kind wiring of the managed resources
//!
//! [`ManagedResource`] tells the generic reconciler, for each kind, which
//! finalizer it owns, where its parent lives, which pipeline to run and how
//! to address its remote entity.

use kube::ResourceExt;

use crate::crd::{KeycloakClient, KeycloakRealm, KeycloakRealmRole, TrackedResource};
use crate::keycloak::{
    ClientRepresentation, IncludedRealmRole, PrimaryRealmRole, RealmRepresentation,
    RemoteEntityHandle,
};
use crate::pipeline::{
    ClientDesired, ClientStep, PipelineStep, RealmDesired, RealmRoleDesired, RealmRoleStep,
    RealmStep,
};

/// Finalizer guarding remote realms
pub const REALM_FINALIZER: &str = "keycloak.operator.dev/realm-cleanup";
/// Finalizer guarding remote realm roles
pub const REALM_ROLE_FINALIZER: &str = "keycloak.operator.dev/realm-role-cleanup";
/// Finalizer guarding remote clients
pub const CLIENT_FINALIZER: &str = "keycloak.operator.dev/client-cleanup";

/// Where a record's parent is found
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parent<'a> {
    /// Directly under a Keycloak resource
    Keycloak {
        /// Keycloak resource named in the spec
        name: Option<&'a str>,
        /// Realm name of this record
        realm_name: &'a str,
    },
    /// Under a KeycloakRealm resource
    Realm {
        /// KeycloakRealm resource named in the spec
        name: Option<&'a str>,
        /// Realm name overriding the parent realm's
        target_realm: Option<&'a str>,
    },
}

/// A kind reconciled against a remote entity
pub trait ManagedResource: TrackedResource {
    /// Finalizer owned by this kind
    const FINALIZER: &'static str;

    /// Pipeline step type
    type Step: PipelineStep + 'static;

    /// Pipeline steps in execution order
    fn pipeline() -> &'static [Self::Step];

    /// Where the parent resource is found
    fn parent(&self) -> Parent<'_>;

    /// Desired remote state, given the resolved realm name
    fn desired(&self, realm: &str) -> <Self::Step as PipelineStep>::Desired;

    /// Natural key of the remote entity, given the resolved realm name
    fn remote_handle(&self, realm: &str) -> RemoteEntityHandle;
}

impl ManagedResource for KeycloakRealm {
    const FINALIZER: &'static str = REALM_FINALIZER;
    type Step = RealmStep;

    fn pipeline() -> &'static [RealmStep] {
        RealmStep::PIPELINE
    }

    fn parent(&self) -> Parent<'_> {
        Parent::Keycloak {
            name: self.spec.keycloak_owner.as_deref(),
            realm_name: &self.spec.realm_name,
        }
    }

    fn desired(&self, realm: &str) -> RealmDesired {
        RealmDesired {
            realm: RealmRepresentation {
                display_name: self.spec.display_name.clone(),
                ..RealmRepresentation::enabled(realm)
            },
        }
    }

    fn remote_handle(&self, realm: &str) -> RemoteEntityHandle {
        RemoteEntityHandle::Realm {
            realm: realm.to_string(),
        }
    }
}

impl ManagedResource for KeycloakRealmRole {
    const FINALIZER: &'static str = REALM_ROLE_FINALIZER;
    type Step = RealmRoleStep;

    fn pipeline() -> &'static [RealmRoleStep] {
        RealmRoleStep::PIPELINE
    }

    fn parent(&self) -> Parent<'_> {
        Parent::Realm {
            name: self.spec.realm.as_deref(),
            target_realm: None,
        }
    }

    fn desired(&self, realm: &str) -> RealmRoleDesired {
        RealmRoleDesired {
            realm: realm.to_string(),
            role: PrimaryRealmRole {
                name: self.spec.name.clone(),
                description: self.spec.description.clone(),
                composite: self.spec.composite,
                composites: self.spec.composites.clone(),
                attributes: self.spec.attributes.clone(),
            },
        }
    }

    fn remote_handle(&self, realm: &str) -> RemoteEntityHandle {
        RemoteEntityHandle::RealmRole {
            realm: realm.to_string(),
            name: self.spec.name.clone(),
        }
    }
}

impl ManagedResource for KeycloakClient {
    const FINALIZER: &'static str = CLIENT_FINALIZER;
    type Step = ClientStep;

    fn pipeline() -> &'static [ClientStep] {
        ClientStep::PIPELINE
    }

    fn parent(&self) -> Parent<'_> {
        Parent::Realm {
            name: self.spec.realm.as_deref(),
            target_realm: self.spec.target_realm.as_deref(),
        }
    }

    fn desired(&self, realm: &str) -> ClientDesired {
        let spec = &self.spec;
        let redirect_uris = spec
            .web_url
            .iter()
            .map(|url| format!("{}/*", url.trim_end_matches('/')))
            .collect();

        ClientDesired {
            realm: realm.to_string(),
            client: ClientRepresentation {
                id: None,
                client_id: spec.client_id.clone(),
                enabled: true,
                public_client: spec.public,
                direct_access_grants_enabled: spec.direct_access,
                root_url: spec.web_url.clone(),
                redirect_uris,
            },
            realm_roles: spec
                .realm_roles
                .iter()
                .map(|role| IncludedRealmRole {
                    name: role.name.clone(),
                    composite: role.composite,
                })
                .collect(),
            client_roles: spec.client_roles.clone(),
        }
    }

    fn remote_handle(&self, realm: &str) -> RemoteEntityHandle {
        RemoteEntityHandle::Client {
            realm: realm.to_string(),
            client_id: self.spec.client_id.clone(),
        }
    }
}

/// Name of the owner of kind `kind`, preferring owner references
///
/// Returns the name and whether it came from the spec rather than an
/// owner reference.
pub(crate) fn owner_name<K: ResourceExt>(
    record: &K,
    kind: &str,
    spec_name: Option<&str>,
) -> Option<(String, bool)> {
    record
        .owner_references()
        .iter()
        .find(|o| o.kind == kind)
        .map(|o| (o.name.clone(), false))
        .or_else(|| spec_name.map(|name| (name.to_string(), true)))
}
