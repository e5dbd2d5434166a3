//! Owner resolution
//!
//! Realms hang off a Keycloak resource; realm roles and clients hang off a
//! realm, which in turn hangs off a Keycloak resource. Owner references win
//! over names in the spec. When the direct owner was found through the
//! spec, the record is adopted so later lookups and garbage collection
//! follow the reference.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use tracing::debug;

use super::resource::{owner_name, ManagedResource, Parent};
use crate::crd::{Keycloak, KeycloakRealm};
use crate::invocation::Invocation;
use crate::store::{record_key, ObjectStore};
use crate::Error;

/// Connected Keycloak a record reconciles against
#[derive(Clone, Debug)]
pub struct ResolvedOwner {
    /// The Keycloak resource at the top of the chain
    pub keycloak: Keycloak,
    /// Remote realm the record lives in
    pub realm_name: String,
    /// Owner reference to add to the record, when found by spec name
    pub adopt: Option<OwnerReference>,
}

/// Walk the owner chain of `record` up to a connected Keycloak
pub async fn resolve_owner<K: ManagedResource>(
    record: &K,
    objects: &dyn ObjectStore,
    inv: &Invocation,
) -> Result<ResolvedOwner, Error> {
    let (namespace, _) = record_key(record)?;

    let resolved = match record.parent() {
        Parent::Keycloak { name, realm_name } => {
            let (keycloak, from_spec) =
                find_keycloak(record, name, &namespace, objects, inv).await?;
            let adopt = if from_spec {
                Some(adoption(record, &keycloak)?)
            } else {
                None
            };
            ResolvedOwner {
                keycloak,
                realm_name: realm_name.to_string(),
                adopt,
            }
        }
        Parent::Realm { name, target_realm } => {
            let kind = KeycloakRealm::kind(&());
            let (realm_owner, from_spec) = owner_name(record, &kind, name)
                .ok_or_else(|| unresolved(record, "realm is not specified in ownerReferences or spec"))?;
            let realm = inv
                .store("get realm", objects.realm(&namespace, &realm_owner))
                .await?
                .ok_or_else(|| unresolved(record, format!("realm {realm_owner} not found")))?;

            let (keycloak, _) = find_keycloak(
                &realm,
                realm.spec.keycloak_owner.as_deref(),
                &namespace,
                objects,
                inv,
            )
            .await
            .map_err(|e| match e {
                Error::OwnerUnresolved { message, .. } => {
                    unresolved(record, format!("realm {realm_owner}: {message}"))
                }
                other => other,
            })?;

            let adopt = if from_spec {
                Some(adoption(record, &realm)?)
            } else {
                None
            };
            ResolvedOwner {
                keycloak,
                realm_name: target_realm
                    .map(str::to_string)
                    .unwrap_or_else(|| realm.spec.realm_name.clone()),
                adopt,
            }
        }
    };

    if !resolved.keycloak.is_connected() {
        return Err(unresolved(
            record,
            format!(
                "owner keycloak {} is not in connected status",
                resolved.keycloak.name_any()
            ),
        ));
    }

    debug!(
        keycloak = %resolved.keycloak.name_any(),
        realm = %resolved.realm_name,
        "owner resolved"
    );
    Ok(resolved)
}

async fn find_keycloak<R: Resource<DynamicType = ()>>(
    record: &R,
    spec_name: Option<&str>,
    namespace: &str,
    objects: &dyn ObjectStore,
    inv: &Invocation,
) -> Result<(Keycloak, bool), Error> {
    let kind = Keycloak::kind(&());
    let (name, from_spec) = owner_name(record, &kind, spec_name).ok_or_else(|| {
        unresolved(record, "keycloak is not specified in ownerReferences or spec")
    })?;
    let keycloak = inv
        .store("get keycloak", objects.keycloak(namespace, &name))
        .await?
        .ok_or_else(|| unresolved(record, format!("keycloak {name} not found")))?;
    Ok((keycloak, from_spec))
}

/// Owner reference pointing at `owner`
///
/// Marked as controller unless the record already has one.
fn adoption<K: Resource, O: Resource<DynamicType = ()>>(
    record: &K,
    owner: &O,
) -> Result<OwnerReference, Error> {
    let mut reference = owner
        .controller_owner_ref(&())
        .ok_or(Error::MissingObjectKey("metadata.uid"))?;
    if record
        .owner_references()
        .iter()
        .any(|o| o.controller == Some(true))
    {
        reference.controller = Some(false);
    }
    Ok(reference)
}

fn unresolved<R: Resource<DynamicType = ()>>(record: &R, message: impl Into<String>) -> Error {
    Error::owner_unresolved(R::kind(&()), record.name_any(), message)
}
