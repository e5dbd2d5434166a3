//! Keycloak Operator - reconciles Keycloak realms, realm roles and clients

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use futures::StreamExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::{Action, Config as ControllerSettings};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt, Resource};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keycloak_operator::config::{
    ControllerConfig, CONNECTION_RETRY_PERIOD, DEFAULT_CONCURRENCY, DEFAULT_CONFLICT_RETRIES,
    DEFAULT_DEBOUNCE,
};
use keycloak_operator::controller::{error_policy, reconcile, reconcile_keycloak, Context};
use keycloak_operator::crd::{
    Keycloak, KeycloakClient, KeycloakRealm, KeycloakRealmRole, TrackedResource,
};
use keycloak_operator::keycloak::HttpClientFactory;
use keycloak_operator::retry::{retry_with_backoff, RetryConfig};
use keycloak_operator::{Error, FIELD_MANAGER};

/// Log filter used when `RUST_LOG` is not set
const DEFAULT_LOG_FILTER: &str = "info,keycloak_operator=debug,kube=info";

/// Keycloak operator - reconciles realms, realm roles and clients
#[derive(Parser, Debug)]
#[command(name = "keycloak-operator", version, about, long_about = None)]
struct Cli {
    /// Print CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Only watch this namespace (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Reconciliations running in parallel per kind
    #[arg(long, env = "RECONCILE_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: u16,

    /// Coalesce triggers for one record arriving within this window
    #[arg(long, env = "RECONCILE_DEBOUNCE_MILLIS", default_value_t = DEFAULT_DEBOUNCE.as_millis() as u64)]
    debounce_millis: u64,

    /// Requeue period while Keycloak is unreachable
    #[arg(long, env = "CONNECTION_RETRY_SECONDS", default_value_t = CONNECTION_RETRY_PERIOD.as_secs())]
    connection_retry_secs: u64,

    /// Periodic re-sync after a successful reconciliation
    #[arg(long, env = "SUCCESS_REQUEUE_SECONDS")]
    success_requeue_secs: Option<u64>,

    /// Attempts per record write before a conflict is surfaced
    #[arg(long, env = "CONFLICT_RETRIES", default_value_t = DEFAULT_CONFLICT_RETRIES)]
    conflict_retries: u32,

    /// Timeout for each Keycloak HTTP request
    #[arg(long, env = "KEYCLOAK_HTTP_TIMEOUT_SECONDS", default_value_t = 30)]
    http_timeout_secs: u64,

    /// Do not install or update CRDs on startup
    #[arg(long, env = "SKIP_CRD_INSTALL")]
    skip_crd_install: bool,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            connection_retry_period: Duration::from_secs(self.connection_retry_secs),
            conflict_retries: self.conflict_retries.max(1),
            success_requeue: self.success_requeue_secs.map(Duration::from_secs),
            concurrency: self.concurrency.max(1),
            debounce: Duration::from_millis(self.debounce_millis),
            ..ControllerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        print_crds()?;
        return Ok(());
    }

    init_tracing(cli.log_format);
    run_controllers(cli).await
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        Keycloak::crd(),
        KeycloakRealm::crd(),
        KeycloakRealmRole::crd(),
        KeycloakClient::crd(),
    ]
}

fn print_crds() -> anyhow::Result<()> {
    for crd in all_crds() {
        let yaml = serde_yaml::to_string(&crd)
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("---\n{yaml}");
    }
    Ok(())
}

/// Install or update all CRDs with server-side apply
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();
    let retry = RetryConfig::with_max_attempts(5);

    for crd in all_crds() {
        let name = crd
            .metadata
            .name
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generated CRD has no name"))?;
        let patch = Patch::Apply(&crd);

        tracing::info!(crd = %name, "installing CRD");
        retry_with_backoff(&retry, "install crd", || crds.patch(&name, &params, &patch))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install CRD {}: {}", name, e))?;
    }

    tracing::info!("all Keycloak CRDs installed/updated");
    Ok(())
}

async fn run_controllers(cli: Cli) -> anyhow::Result<()> {
    tracing::info!("Keycloak operator starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if cli.skip_crd_install {
        tracing::info!("skipping CRD installation");
    } else {
        ensure_crds_installed(&client).await?;
    }

    let config = cli.controller_config();
    let factory = Arc::new(HttpClientFactory::new(Duration::from_secs(
        cli.http_timeout_secs,
    )));
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let namespace = cli.namespace.as_deref();
    match namespace {
        Some(ns) => tracing::info!(namespace = %ns, "watching a single namespace"),
        None => tracing::info!("watching all namespaces"),
    }

    macro_rules! context {
        ($kind:ty) => {
            Arc::new(
                Context::<$kind>::builder(client.clone())
                    .config(config.clone())
                    .client_factory(factory.clone())
                    .shutdown(shutdown.clone())
                    .build(),
            )
        };
    }

    tracing::info!("Starting Keycloak controllers...");
    tokio::join!(
        run_controller(
            api::<Keycloak>(&client, namespace),
            reconcile_keycloak,
            context!(Keycloak),
            &config,
        ),
        run_controller(
            api::<KeycloakRealm>(&client, namespace),
            reconcile::<KeycloakRealm>,
            context!(KeycloakRealm),
            &config,
        ),
        run_controller(
            api::<KeycloakRealmRole>(&client, namespace),
            reconcile::<KeycloakRealmRole>,
            context!(KeycloakRealmRole),
            &config,
        ),
        run_controller(
            api::<KeycloakClient>(&client, namespace),
            reconcile::<KeycloakClient>,
            context!(KeycloakClient),
            &config,
        ),
    );

    shutdown.cancel();
    tracing::info!("Keycloak operator shutting down");
    Ok(())
}

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Drive one controller until shutdown
async fn run_controller<K, F, Fut>(
    api: Api<K>,
    reconciler: F,
    ctx: Arc<Context<K>>,
    config: &ControllerConfig,
) where
    K: TrackedResource,
    F: FnMut(Arc<K>, Arc<Context<K>>) -> Fut,
    Fut: Future<Output = Result<Action, Error>> + Send + 'static,
{
    let kind = K::kind(&()).to_string();
    tracing::info!(
        kind = %kind,
        concurrency = config.concurrency,
        debounce = ?config.debounce,
        "starting controller"
    );

    let settings = ControllerSettings::default()
        .concurrency(config.concurrency)
        .debounce(config.debounce);
    Controller::new(api, WatcherConfig::default())
        .with_config(settings)
        .shutdown_on_signal()
        .run(reconciler, error_policy::<K>, ctx)
        .for_each(|result| {
            let kind = kind.clone();
            async move {
                match result {
                    Ok((object, action)) => {
                        tracing::debug!(kind = %kind, object = %object.name, ?action, "reconciliation completed");
                    }
                    Err(e) => {
                        tracing::warn!(kind = %kind, error = %e, "controller error");
                    }
                }
            }
        })
        .await;

    tracing::info!(kind = %kind, "controller stopped");
}

/// Cancel `token` on SIGINT or SIGTERM
///
/// In-flight reconciliations observe the token and abandon their current
/// store or Keycloak call.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "unable to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown requested, cancelling in-flight reconciliations");
    token.cancel();
}
