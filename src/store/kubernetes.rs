//! Kubernetes API implementations of the store traits

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;

use super::{record_key, ObjectStore, RecordStore};
use crate::crd::{Keycloak, KeycloakRealm, SyncStatus, TrackedResource};
use crate::{Error, FIELD_MANAGER};

/// Record store backed by the Kubernetes API
///
/// Every write is a JSON merge patch carrying `metadata.resourceVersion`,
/// which makes the API server reject it with 409 when the record changed
/// since it was read.
pub struct KubeRecordStore {
    client: Client,
}

impl KubeRecordStore {
    /// Create a new store
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: TrackedResource>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Parameters for a JSON merge patch; not server-side apply
fn merge_params() -> PatchParams {
    PatchParams {
        field_manager: Some(FIELD_MANAGER.into()),
        ..Default::default()
    }
}

/// Map a failed write onto the record-level error taxonomy
fn write_error<K: TrackedResource>(record: &K, err: kube::Error) -> Error {
    let namespace = record.namespace().unwrap_or_default();
    match err {
        kube::Error::Api(ref response) if response.code == 409 => {
            Error::conflict(K::kind(&()), namespace, record.name_any())
        }
        kube::Error::Api(ref response) if response.code == 404 => {
            Error::not_found(K::kind(&()), namespace, record.name_any())
        }
        other => Error::from(other),
    }
}

#[async_trait]
impl<K: TrackedResource> RecordStore<K> for KubeRecordStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, Error> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn replace_finalizers(&self, record: &K, finalizers: Vec<String>) -> Result<K, Error> {
        let (namespace, name) = record_key(record)?;
        let patch = json!({
            "metadata": {
                "resourceVersion": record.resource_version(),
                "finalizers": finalizers,
            }
        });
        self.api::<K>(&namespace)
            .patch(&name, &merge_params(), &Patch::Merge(&patch))
            .await
            .map_err(|e| write_error(record, e))
    }

    async fn replace_owner_references(
        &self,
        record: &K,
        owners: Vec<OwnerReference>,
    ) -> Result<K, Error> {
        let (namespace, name) = record_key(record)?;
        let patch = json!({
            "metadata": {
                "resourceVersion": record.resource_version(),
                "ownerReferences": owners,
            }
        });
        self.api::<K>(&namespace)
            .patch(&name, &merge_params(), &Patch::Merge(&patch))
            .await
            .map_err(|e| write_error(record, e))
    }

    async fn replace_status(&self, record: &K, status: &SyncStatus) -> Result<K, Error> {
        let (namespace, name) = record_key(record)?;
        let patch = json!({
            "metadata": { "resourceVersion": record.resource_version() },
            "status": status,
        });
        self.api::<K>(&namespace)
            .patch_status(&name, &merge_params(), &Patch::Merge(&patch))
            .await
            .map_err(|e| write_error(record, e))
    }
}

/// Object store backed by the Kubernetes API
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    /// Create a new store
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get_opt(name).await?;
        Ok(secret.map(|s| {
            s.data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, v.0))
                .collect()
        }))
    }

    async fn config_map_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let config_map = api.get_opt(name).await?;
        Ok(config_map.map(|cm| cm.data.unwrap_or_default()))
    }

    async fn keycloak(&self, namespace: &str, name: &str) -> Result<Option<Keycloak>, Error> {
        let api: Api<Keycloak> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn realm(&self, namespace: &str, name: &str) -> Result<Option<KeycloakRealm>, Error> {
        let api: Api<KeycloakRealm> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}
