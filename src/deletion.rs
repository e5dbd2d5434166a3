//! Finalizer protocol
//!
//! A record is `Active` until the API server sets its deletion marker, and
//! `Terminating` afterwards. While active, the record must carry our
//! finalizer before anything is created remotely, so deleting it can
//! never orphan a remote entity. Once terminating, the remote entity is
//! deleted first and the finalizer is stripped only after that succeeded.

use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use crate::crd::TrackedResource;
use crate::invocation::Invocation;
use crate::keycloak::{IdentityProviderClient, RemoteEntityHandle};
use crate::store::RecordWriter;
use crate::Error;

/// Deletion state of a record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// No deletion marker
    Active,
    /// Deletion marker set; waiting for finalizers
    Terminating,
}

impl Lifecycle {
    /// Lifecycle state of `record`
    pub fn of<K: Resource>(record: &K) -> Self {
        if record.meta().deletion_timestamp.is_some() {
            Self::Terminating
        } else {
            Self::Active
        }
    }
}

/// Returns true if `record` carries `finalizer`
pub fn has_finalizer<K: Resource>(record: &K, finalizer: &str) -> bool {
    record.finalizers().iter().any(|f| f == finalizer)
}

/// Result of [`DeletionProtocol::try_delete`]
#[derive(Debug)]
pub struct Finalization<K> {
    /// True once the remote entity is gone and the finalizer stripped
    pub finalized: bool,
    /// Latest version of the record
    pub record: K,
}

/// Drives one finalizer on one kind of record
pub struct DeletionProtocol<'a, K: TrackedResource> {
    writer: RecordWriter<'a, K>,
    finalizer: &'static str,
}

impl<'a, K: TrackedResource> DeletionProtocol<'a, K> {
    /// Create a protocol writing through `writer`
    pub fn new(writer: RecordWriter<'a, K>, finalizer: &'static str) -> Self {
        Self { writer, finalizer }
    }

    /// Advance the finalizer protocol for `record`
    ///
    /// Active records get the finalizer attached (`finalized = false`).
    /// Terminating records get `handle` deleted remotely and the finalizer
    /// stripped (`finalized = true`). A failed remote delete keeps the
    /// finalizer and returns the error.
    pub async fn try_delete(
        &self,
        inv: &Invocation,
        record: &K,
        client: &dyn IdentityProviderClient,
        handle: &RemoteEntityHandle,
    ) -> Result<Finalization<K>, Error> {
        let record = match Lifecycle::of(record) {
            Lifecycle::Active => {
                let updated = self.ensure_finalizer(record).await?;
                if Lifecycle::of(&updated) == Lifecycle::Active {
                    return Ok(Finalization {
                        finalized: false,
                        record: updated,
                    });
                }
                // Deleted while we were attaching the finalizer.
                updated
            }
            Lifecycle::Terminating => record.clone(),
        };

        self.finalize(inv, record, client, handle).await
    }

    async fn ensure_finalizer(&self, record: &K) -> Result<K, Error> {
        let finalizer = self.finalizer;
        let updated = self
            .writer
            .update_finalizers(record, |current| {
                if Lifecycle::of(current) == Lifecycle::Terminating
                    || has_finalizer(current, finalizer)
                {
                    return None;
                }
                let mut finalizers = current.finalizers().to_vec();
                finalizers.push(finalizer.to_string());
                Some(finalizers)
            })
            .await?;

        if !has_finalizer(record, finalizer) && has_finalizer(&updated, finalizer) {
            info!(finalizer, "finalizer added");
        }
        Ok(updated)
    }

    async fn finalize(
        &self,
        inv: &Invocation,
        record: K,
        client: &dyn IdentityProviderClient,
        handle: &RemoteEntityHandle,
    ) -> Result<Finalization<K>, Error> {
        inv.remote(handle.delete_operation(), handle, handle.delete(client))
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    e
                } else {
                    Error::deletion(handle.to_string(), e)
                }
            })?;
        info!(entity = %handle, "remote entity deleted");

        let finalizer = self.finalizer;
        let stripped = self
            .writer
            .update_finalizers(&record, |current| {
                if !has_finalizer(current, finalizer) {
                    return None;
                }
                Some(
                    current
                        .finalizers()
                        .iter()
                        .filter(|f| *f != finalizer)
                        .cloned()
                        .collect(),
                )
            })
            .await;

        match stripped {
            Ok(record) => {
                debug!(finalizer, "finalizer removed");
                Ok(Finalization {
                    finalized: true,
                    record,
                })
            }
            // Already removed from the store.
            Err(e) if e.is_not_found() => Ok(Finalization {
                finalized: true,
                record,
            }),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{KeycloakRealm, KeycloakRealmSpec};
    use crate::keycloak::{KeycloakError, MockIdentityProviderClient};
    use crate::store::memory::MemoryStore;

    const FINALIZER: &str = "keycloak.operator.dev/realm-cleanup";

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

    fn handle() -> RemoteEntityHandle {
        RemoteEntityHandle::Realm {
            realm: "ns.test".into(),
        }
    }

    #[tokio::test]
    async fn active_record_gets_the_finalizer_and_nothing_remote() {
        let store = MemoryStore::new();
        let stored = store.insert(realm());
        let mut client = MockIdentityProviderClient::new();
        client.expect_delete_realm().never();

        let inv = Invocation::for_testing();
        let protocol = DeletionProtocol::new(RecordWriter::new(&store, &inv, 5), FINALIZER);
        let outcome = protocol
            .try_delete(&inv, &stored, &client, &handle())
            .await
            .unwrap();

        assert!(!outcome.finalized);
        assert!(has_finalizer(&outcome.record, FINALIZER));
        assert!(has_finalizer(&store.current("identity", "main").unwrap(), FINALIZER));
    }

    #[tokio::test]
    async fn finalizer_is_not_written_twice() {
        let store = MemoryStore::new();
        let mut record = realm();
        record.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
        let stored = store.insert(record);
        let client = MockIdentityProviderClient::new();

        let inv = Invocation::for_testing();
        let protocol = DeletionProtocol::new(RecordWriter::new(&store, &inv, 5), FINALIZER);
        protocol
            .try_delete(&inv, &stored, &client, &handle())
            .await
            .unwrap();

        assert!(store.journal().is_empty());
    }

    #[tokio::test]
    async fn terminating_record_is_deleted_remotely_then_released() {
        let store = MemoryStore::new();
        let mut record = realm();
        record.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
        store.insert(record);
        let terminating = store.mark_deleted("identity", "main");

        let mut client = MockIdentityProviderClient::new();
        client
            .expect_delete_realm()
            .withf(|realm| realm == "ns.test")
            .times(1)
            .returning(|_| Ok(()));

        let inv = Invocation::for_testing();
        let protocol = DeletionProtocol::new(RecordWriter::new(&store, &inv, 5), FINALIZER);
        let outcome = protocol
            .try_delete(&inv, &terminating, &client, &handle())
            .await
            .unwrap();

        assert!(outcome.finalized);
        assert!(store.current("identity", "main").is_none());
    }

    #[tokio::test]
    async fn failed_remote_delete_keeps_the_finalizer() {
        let store = MemoryStore::new();
        let mut record = realm();
        record.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
        store.insert(record);
        let terminating = store.mark_deleted("identity", "main");

        let mut client = MockIdentityProviderClient::new();
        client
            .expect_delete_realm()
            .returning(|_| Err(KeycloakError::api(500, "test mock fatal")));

        let inv = Invocation::for_testing();
        let protocol = DeletionProtocol::new(RecordWriter::new(&store, &inv, 5), FINALIZER);
        let err = protocol
            .try_delete(&inv, &terminating, &client, &handle())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Deletion { .. }));
        assert!(err.to_string().contains("test mock fatal"));
        let current = store.current("identity", "main").unwrap();
        assert!(has_finalizer(&current, FINALIZER));
    }

    #[tokio::test]
    async fn finalizer_is_never_added_to_a_terminating_record() {
        let store = MemoryStore::new();
        let stored = store.insert(realm());
        // Deleted by someone else between our read and our write.
        store.mark_deleted("identity", "main");

        let mut client = MockIdentityProviderClient::new();
        client.expect_delete_realm().times(1).returning(|_| Ok(()));

        let inv = Invocation::for_testing();
        let protocol = DeletionProtocol::new(RecordWriter::new(&store, &inv, 5), FINALIZER);
        let outcome = protocol
            .try_delete(&inv, &stored, &client, &handle())
            .await
            .unwrap();

        assert!(outcome.finalized);
        assert!(!store
            .journal()
            .iter()
            .any(|entry| entry.contains(FINALIZER)));
    }
}
