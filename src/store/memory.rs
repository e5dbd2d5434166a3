//! In-memory store used by unit tests
//!
//! Mirrors the API server's optimistic concurrency: each write bumps the
//! record's resourceVersion and rejects callers holding a stale one.
//! Conflicts can be injected to simulate a concurrent writer, and every
//! successful write is appended to a journal that can be shared with mock
//! Keycloak clients to assert ordering.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use kube::ResourceExt;

use super::{record_key, ObjectStore, RecordStore};
use crate::crd::{Keycloak, KeycloakRealm, SyncStatus, TrackedResource};
use crate::Error;

/// Shared, ordered log of side effects
pub type Journal = Arc<Mutex<Vec<String>>>;

/// Record store holding records of one kind
pub struct MemoryStore<K> {
    records: Mutex<BTreeMap<(String, String), K>>,
    conflicts: AtomicU32,
    status_writes: Mutex<Vec<SyncStatus>>,
    journal: Journal,
}

impl<K: TrackedResource> MemoryStore<K> {
    pub fn new() -> Self {
        Self::with_journal(Journal::default())
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            conflicts: AtomicU32::new(0),
            status_writes: Mutex::new(Vec::new()),
            journal,
        }
    }

    /// Store a record, assigning a resourceVersion, and return the stored copy
    pub fn insert(&self, mut record: K) -> K {
        if record.meta().resource_version.is_none() {
            record.meta_mut().resource_version = Some("1".to_string());
        }
        let key = record_key(&record).unwrap();
        self.records.lock().unwrap().insert(key, record.clone());
        record
    }

    pub fn current(&self, namespace: &str, name: &str) -> Option<K> {
        self.records
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        self.records
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Set the deletion marker, as the API server does on delete
    pub fn mark_deleted(&self, namespace: &str, name: &str) -> K {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&(namespace.to_string(), name.to_string()))
            .unwrap();
        record.meta_mut().deletion_timestamp = Some(Time(chrono::Utc::now()));
        bump(record);
        record.clone()
    }

    /// Make the next `n` writes fail as if another writer got there first
    pub fn inject_conflicts(&self, n: u32) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    pub fn status_writes(&self) -> Vec<SyncStatus> {
        self.status_writes.lock().unwrap().clone()
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    fn write(&self, record: &K, entry: String, apply: impl FnOnce(&mut K)) -> Result<K, Error> {
        let (namespace, name) = record_key(record)?;
        let mut records = self.records.lock().unwrap();
        let key = (namespace.clone(), name.clone());
        let Some(stored) = records.get_mut(&key) else {
            return Err(Error::not_found(K::kind(&()), namespace, name));
        };

        if self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            bump(stored);
            return Err(Error::conflict(K::kind(&()), namespace, name));
        }
        if stored.resource_version() != record.resource_version() {
            return Err(Error::conflict(K::kind(&()), namespace, name));
        }

        apply(stored);
        bump(stored);
        self.journal.lock().unwrap().push(entry);

        let updated = stored.clone();
        if updated.meta().deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            records.remove(&key);
        }
        Ok(updated)
    }
}

fn bump<K: TrackedResource>(record: &mut K) {
    let next = record
        .resource_version()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    record.meta_mut().resource_version = Some(next.to_string());
}

#[async_trait]
impl<K: TrackedResource> RecordStore<K> for MemoryStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, Error> {
        Ok(self.current(namespace, name))
    }

    async fn replace_finalizers(&self, record: &K, finalizers: Vec<String>) -> Result<K, Error> {
        let entry = format!("finalizers {finalizers:?}");
        self.write(record, entry, |stored| {
            stored.meta_mut().finalizers = Some(finalizers);
        })
    }

    async fn replace_owner_references(
        &self,
        record: &K,
        owners: Vec<OwnerReference>,
    ) -> Result<K, Error> {
        let entry = format!("owners {:?}", owners.iter().map(|o| &o.name).collect::<Vec<_>>());
        self.write(record, entry, |stored| {
            stored.meta_mut().owner_references = Some(owners);
        })
    }

    async fn replace_status(&self, record: &K, status: &SyncStatus) -> Result<K, Error> {
        let updated = self.write(record, "status".to_string(), |stored| {
            stored.set_sync_status(status.clone());
        })?;
        self.status_writes.lock().unwrap().push(status.clone());
        Ok(updated)
    }
}

/// Object store with fixed contents
#[derive(Default)]
pub struct MemoryObjects {
    pub secrets: BTreeMap<(String, String), BTreeMap<String, Vec<u8>>>,
    pub config_maps: BTreeMap<(String, String), BTreeMap<String, String>>,
    pub keycloaks: BTreeMap<(String, String), Keycloak>,
    pub realms: BTreeMap<(String, String), KeycloakRealm>,
}

impl MemoryObjects {
    pub fn with_secret(mut self, namespace: &str, name: &str, data: &[(&str, &str)]) -> Self {
        let data = data
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect();
        self.secrets
            .insert((namespace.to_string(), name.to_string()), data);
        self
    }

    pub fn with_config_map(mut self, namespace: &str, name: &str, data: &[(&str, &str)]) -> Self {
        let data = data
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.config_maps
            .insert((namespace.to_string(), name.to_string()), data);
        self
    }

    pub fn with_keycloak(mut self, keycloak: Keycloak) -> Self {
        let key = record_key(&keycloak).unwrap();
        self.keycloaks.insert(key, keycloak);
        self
    }

    pub fn with_realm(mut self, realm: KeycloakRealm) -> Self {
        let key = record_key(&realm).unwrap();
        self.realms.insert(key, realm);
        self
    }
}

fn lookup<V: Clone>(
    map: &BTreeMap<(String, String), V>,
    namespace: &str,
    name: &str,
) -> Option<V> {
    map.get(&(namespace.to_string(), name.to_string())).cloned()
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    async fn secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, Error> {
        Ok(lookup(&self.secrets, namespace, name))
    }

    async fn config_map_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, Error> {
        Ok(lookup(&self.config_maps, namespace, name))
    }

    async fn keycloak(&self, namespace: &str, name: &str) -> Result<Option<Keycloak>, Error> {
        Ok(lookup(&self.keycloaks, namespace, name))
    }

    async fn realm(&self, namespace: &str, name: &str) -> Result<Option<KeycloakRealm>, Error> {
        Ok(lookup(&self.realms, namespace, name))
    }
}
