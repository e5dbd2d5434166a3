//! Reconciliation of realms, realm roles and clients

use std::sync::Arc;

use kube::runtime::controller::Action;
use tracing::{debug, info, Instrument};

use super::owner::resolve_owner;
use super::resource::ManagedResource;
use super::status::{catch_panic, StatusSession};
use super::Context;
use crate::deletion::DeletionProtocol;
use crate::invocation::Invocation;
use crate::pipeline;
use crate::store::record_key;
use crate::Error;

/// Reconcile one record of a managed kind
///
/// Works on a fresh read of the record, so a stale copy in the watch cache
/// never drives remote writes. The status is written once at the end,
/// including when the reconciliation failed or panicked.
pub async fn reconcile<K: ManagedResource>(
    record: Arc<K>,
    ctx: Arc<Context<K>>,
) -> Result<Action, Error> {
    let inv = ctx.invocation(&record)?;
    let (namespace, name) = record_key(record.as_ref())?;
    let span = inv.span().clone();

    reconcile_record(&ctx, &inv, &namespace, &name)
        .instrument(span)
        .await
}

async fn reconcile_record<K: ManagedResource>(
    ctx: &Context<K>,
    inv: &Invocation,
    namespace: &str,
    name: &str,
) -> Result<Action, Error> {
    let Some(record) = inv
        .store("get record", ctx.records.get(namespace, name))
        .await?
    else {
        debug!("record no longer exists");
        return Ok(Action::await_change());
    };

    let mut session = StatusSession::begin(record);
    let outcome = catch_panic(sync(ctx, inv, &mut session)).await;
    session.complete(&ctx.writer(inv), outcome).await
}

async fn sync<K: ManagedResource>(
    ctx: &Context<K>,
    inv: &Invocation,
    session: &mut StatusSession<K>,
) -> Result<Action, Error> {
    let owner = resolve_owner(session.record(), ctx.objects.as_ref(), inv).await?;
    if let Some(reference) = owner.adopt.clone() {
        let adopted = ctx.writer(inv).adopt(session.record(), reference).await?;
        session.refresh(adopted);
    }

    let credential = ctx.credentials.resolve(inv, &owner.keycloak).await?;
    let connection = ctx.connections.connect(inv, &credential).await?;
    session.set_connected(connection.is_connected());
    let Some(client) = connection.client() else {
        info!(
            cause = connection.cause().unwrap_or_default(),
            retry_in = ?ctx.config.connection_retry_period,
            "keycloak unreachable, retrying later"
        );
        return Ok(ctx.config.disconnected_action());
    };

    let handle = session.record().remote_handle(&owner.realm_name);
    let finalization = DeletionProtocol::new(ctx.writer(inv), K::FINALIZER)
        .try_delete(inv, session.record(), client.as_ref(), &handle)
        .await?;
    if finalization.finalized {
        info!(entity = %handle, "finalized");
        session.close();
        return Ok(Action::await_change());
    }
    session.refresh(finalization.record);

    let desired = session.record().desired(&owner.realm_name);
    pipeline::run(K::pipeline(), &desired, client.as_ref(), inv).await?;

    session.record_success();
    debug!("reconciled");
    Ok(ctx.config.success_action())
}
