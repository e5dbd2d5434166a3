//! Integration tests for the generated Custom Resource Definitions
//!
//! These run without a cluster: they check the CRDs the operator installs
//! and that manifests written by users deserialize into the typed specs.

use kube::CustomResourceExt;

use keycloak_operator::crd::{
    Keycloak, KeycloakClient, KeycloakRealm, KeycloakRealmRole, SyncStatus, DEFAULT_AUTH_REALM,
};

#[test]
fn crds_are_namespaced_v1alpha1_with_status() {
    for crd in [
        Keycloak::crd(),
        KeycloakRealm::crd(),
        KeycloakRealmRole::crd(),
        KeycloakClient::crd(),
    ] {
        assert_eq!(crd.spec.group, "keycloak.operator.dev");
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.versions.len(), 1);

        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1alpha1");
        assert!(version.served && version.storage);
        assert!(
            version
                .subresources
                .as_ref()
                .and_then(|s| s.status.as_ref())
                .is_some(),
            "{} has no status subresource",
            crd.spec.names.kind
        );
    }
}

#[test]
fn crd_names_match_plurals() {
    assert_eq!(Keycloak::crd_name(), "keycloaks.keycloak.operator.dev");
    assert_eq!(KeycloakRealm::crd_name(), "keycloakrealms.keycloak.operator.dev");
    assert_eq!(
        KeycloakRealmRole::crd_name(),
        "keycloakrealmroles.keycloak.operator.dev"
    );
    assert_eq!(KeycloakClient::crd_name(), "keycloakclients.keycloak.operator.dev");
}

#[test]
fn crds_render_as_yaml() {
    let yaml = serde_yaml::to_string(&KeycloakClient::crd()).unwrap();
    assert!(yaml.contains("kind: CustomResourceDefinition"));
    assert!(yaml.contains("clientId"));
    assert!(yaml.contains("targetRealm"));
}

#[test]
fn keycloak_manifest_defaults_auth_realm() {
    let keycloak: Keycloak = serde_yaml::from_str(
        r#"
apiVersion: keycloak.operator.dev/v1alpha1
kind: Keycloak
metadata:
  name: keycloak
  namespace: identity
spec:
  url: https://sso.example.com
  secret: keycloak-admin
"#,
    )
    .unwrap();

    assert_eq!(keycloak.spec.auth_realm, DEFAULT_AUTH_REALM);
    assert!(keycloak.spec.certificate.is_none());
    assert!(!keycloak.is_connected());
}

#[test]
fn client_manifest_deserializes() {
    let client: KeycloakClient = serde_yaml::from_str(
        r#"
apiVersion: keycloak.operator.dev/v1alpha1
kind: KeycloakClient
metadata:
  name: portal
  namespace: identity
spec:
  clientId: portal
  realm: main
  targetRealm: ns.test
  public: true
  webUrl: https://portal.example.com
  realmRoles:
    - name: role-test
      composite: false
  clientRoles: [reader]
"#,
    )
    .unwrap();

    assert_eq!(client.spec.client_id, "portal");
    assert_eq!(client.spec.target_realm.as_deref(), Some("ns.test"));
    assert!(client.spec.public);
    assert!(!client.spec.direct_access);
    assert_eq!(client.spec.realm_roles[0].name, "role-test");
    assert_eq!(client.spec.client_roles, vec!["reader".to_string()]);
}

#[test]
fn status_uses_camel_case_fields() {
    let status = SyncStatus {
        connected: true,
        value: "unable to put realm: boom".into(),
        failure_count: 2,
        last_transition_time: None,
    };
    let json = serde_json::to_value(&status).unwrap();

    assert_eq!(json["connected"], true);
    assert_eq!(json["value"], "unable to put realm: boom");
    assert_eq!(json["failureCount"], 2);
    assert!(json.get("lastTransitionTime").is_none());
}
