//! Declarative store access
//!
//! [`RecordStore`] covers the reconciled records themselves. Writes carry the
//! record's `resourceVersion` and fail with [`Error::Conflict`] when it is
//! stale. [`RecordWriter`] wraps them with an immediate re-read-and-retry
//! loop. [`ObjectStore`] covers the read-only collaborators: Secrets,
//! ConfigMaps and owner resources.

mod kubernetes;
#[cfg(test)]
pub(crate) mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use tracing::debug;

use crate::crd::{Keycloak, KeycloakRealm, SyncStatus, TrackedResource};
use crate::invocation::Invocation;
use crate::retry::retry_on_conflict;
use crate::Error;

pub use kubernetes::{KubeObjectStore, KubeRecordStore};

/// Reads and optimistic-concurrency writes of reconciled records
#[async_trait]
pub trait RecordStore<K: TrackedResource>: Send + Sync {
    /// Fetch the current record; `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, Error>;

    /// Replace `metadata.finalizers`, guarded by the record's resourceVersion
    async fn replace_finalizers(&self, record: &K, finalizers: Vec<String>) -> Result<K, Error>;

    /// Replace `metadata.ownerReferences`, guarded by the record's resourceVersion
    async fn replace_owner_references(
        &self,
        record: &K,
        owners: Vec<OwnerReference>,
    ) -> Result<K, Error>;

    /// Replace the status subresource, guarded by the record's resourceVersion
    async fn replace_status(&self, record: &K, status: &SyncStatus) -> Result<K, Error>;
}

/// Read access to objects a reconciliation depends on
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Data of a Secret; `None` if the Secret does not exist
    async fn secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, Error>;

    /// Data of a ConfigMap; `None` if the ConfigMap does not exist
    async fn config_map_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, Error>;

    /// A Keycloak resource
    async fn keycloak(&self, namespace: &str, name: &str) -> Result<Option<Keycloak>, Error>;

    /// A KeycloakRealm resource
    async fn realm(&self, namespace: &str, name: &str) -> Result<Option<KeycloakRealm>, Error>;
}

/// Namespace and name of a record
pub fn record_key<K: TrackedResource>(record: &K) -> Result<(String, String), Error> {
    let namespace = record
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
    Ok((namespace, record.name_any()))
}

/// Conflict-retrying writes of one record
pub struct RecordWriter<'a, K: TrackedResource> {
    store: &'a dyn RecordStore<K>,
    inv: &'a Invocation,
    max_attempts: u32,
}

impl<'a, K: TrackedResource> RecordWriter<'a, K> {
    /// Create a writer allowing `max_attempts` tries per write
    pub fn new(store: &'a dyn RecordStore<K>, inv: &'a Invocation, max_attempts: u32) -> Self {
        Self {
            store,
            inv,
            max_attempts,
        }
    }

    /// The record to apply a mutation to on the given attempt
    async fn current(&self, record: &K, attempt: u32) -> Result<K, Error> {
        if attempt == 1 {
            return Ok(record.clone());
        }
        let (namespace, name) = record_key(record)?;
        self.inv
            .store("get record", self.store.get(&namespace, &name))
            .await?
            .ok_or_else(|| Error::not_found(K::kind(&()), namespace, name))
    }

    /// Apply a finalizer edit, re-evaluated against the latest record
    ///
    /// `edit` returns the new finalizer list, or `None` when the current
    /// record needs no write.
    pub async fn update_finalizers<F>(&self, record: &K, edit: F) -> Result<K, Error>
    where
        F: Fn(&K) -> Option<Vec<String>> + Sync,
    {
        let edit = &edit;
        retry_on_conflict(self.max_attempts, "update finalizers", move |attempt| async move {
            let current = self.current(record, attempt).await?;
            match edit(&current) {
                Some(finalizers) => {
                    self.inv
                        .store(
                            "update finalizers",
                            self.store.replace_finalizers(&current, finalizers),
                        )
                        .await
                }
                None => Ok(current),
            }
        })
        .await
    }

    /// Add `owner` to the record's owner references unless already present
    pub async fn adopt(&self, record: &K, owner: OwnerReference) -> Result<K, Error> {
        let owner = &owner;
        retry_on_conflict(self.max_attempts, "set owner reference", move |attempt| async move {
            let current = self.current(record, attempt).await?;
            if current.owner_references().iter().any(|o| o.uid == owner.uid) {
                return Ok(current);
            }
            let mut owners = current.owner_references().to_vec();
            owners.push(owner.clone());
            debug!(owner = %owner.name, kind = %owner.kind, "setting owner reference");
            self.inv
                .store(
                    "set owner reference",
                    self.store.replace_owner_references(&current, owners),
                )
                .await
        })
        .await
    }

    /// Write `status`, overwriting whatever the latest record carries
    pub async fn write_status(&self, record: &K, status: &SyncStatus) -> Result<K, Error> {
        retry_on_conflict(self.max_attempts, "update status", move |attempt| async move {
            let current = self.current(record, attempt).await?;
            self.inv
                .store("update status", self.store.replace_status(&current, status))
                .await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use crate::crd::{KeycloakRealmSpec, TrackedResource};

    fn realm() -> KeycloakRealm {
        let mut realm = KeycloakRealm::new(
            "main",
            KeycloakRealmSpec {
                realm_name: "ns.test".into(),
                keycloak_owner: Some("keycloak".into()),
                display_name: None,
            },
        );
        realm.metadata.namespace = Some("identity".into());
        realm
    }

    #[tokio::test]
    async fn status_write_survives_a_concurrent_writer() {
        let store = MemoryStore::new();
        let stored = store.insert(realm());
        store.inject_conflicts(2);

        let inv = Invocation::for_testing();
        let writer = RecordWriter::new(&store, &inv, 5);
        let status = SyncStatus {
            connected: true,
            ..Default::default()
        };
        let updated = writer.write_status(&stored, &status).await.unwrap();

        assert_eq!(updated.sync_status(), Some(&status));
        assert_eq!(store.status_writes().len(), 1);
    }

    #[tokio::test]
    async fn conflicts_surface_after_max_attempts() {
        let store = MemoryStore::new();
        let stored = store.insert(realm());
        store.inject_conflicts(3);

        let inv = Invocation::for_testing();
        let writer = RecordWriter::new(&store, &inv, 3);
        let err = writer
            .write_status(&stored, &SyncStatus::default())
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn finalizer_edit_is_reevaluated_after_conflict() {
        let store = MemoryStore::new();
        let stored = store.insert(realm());
        store.inject_conflicts(1);

        let inv = Invocation::for_testing();
        let writer = RecordWriter::new(&store, &inv, 5);
        let updated = writer
            .update_finalizers(&stored, |current| {
                let mut finalizers = current.finalizers().to_vec();
                if finalizers.iter().any(|f| f == "test/cleanup") {
                    return None;
                }
                finalizers.push("test/cleanup".to_string());
                Some(finalizers)
            })
            .await
            .unwrap();

        assert_eq!(updated.finalizers(), ["test/cleanup".to_string()]);
    }

    #[tokio::test]
    async fn adopt_is_idempotent() {
        let store = MemoryStore::new();
        let stored = store.insert(realm());
        let owner = OwnerReference {
            api_version: "keycloak.operator.dev/v1alpha1".into(),
            kind: "Keycloak".into(),
            name: "keycloak".into(),
            uid: "uid-1".into(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        };

        let inv = Invocation::for_testing();
        let writer = RecordWriter::new(&store, &inv, 5);
        let once = writer.adopt(&stored, owner.clone()).await.unwrap();
        let twice = writer.adopt(&once, owner).await.unwrap();

        assert_eq!(twice.owner_references().len(), 1);
        assert_eq!(store.journal().len(), 1);
    }

    #[tokio::test]
    async fn vanished_record_is_not_found_on_retry() {
        let store = MemoryStore::new();
        let stored = store.insert(realm());
        store.inject_conflicts(1);
        store.remove("identity", "main");

        let inv = Invocation::for_testing();
        let writer = RecordWriter::new(&store, &inv, 5);
        let err = writer
            .write_status(&stored, &SyncStatus::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
