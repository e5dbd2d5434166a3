//! Connectivity tracking for Keycloak resources
//!
//! The Keycloak resource owns nothing remotely. Its reconciler only checks
//! that the credentials work and records the result in `status.connected`,
//! which gates every realm, role and client below it.

use std::sync::Arc;

use kube::runtime::controller::Action;
use tracing::{debug, Instrument};

use super::status::{catch_panic, StatusSession};
use super::Context;
use crate::crd::Keycloak;
use crate::invocation::Invocation;
use crate::store::record_key;
use crate::Error;

/// Reconcile a Keycloak resource
pub async fn reconcile_keycloak(
    keycloak: Arc<Keycloak>,
    ctx: Arc<Context<Keycloak>>,
) -> Result<Action, Error> {
    let inv = ctx.invocation(&keycloak)?;
    let (namespace, name) = record_key(keycloak.as_ref())?;
    let span = inv.span().clone();

    reconcile_record(&ctx, &inv, &namespace, &name)
        .instrument(span)
        .await
}

async fn reconcile_record(
    ctx: &Context<Keycloak>,
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
    let outcome = catch_panic(check_connection(ctx, inv, &mut session)).await;
    session.complete(&ctx.writer(inv), outcome).await
}

async fn check_connection(
    ctx: &Context<Keycloak>,
    inv: &Invocation,
    session: &mut StatusSession<Keycloak>,
) -> Result<Action, Error> {
    let credential = ctx.credentials.resolve(inv, session.record()).await?;
    let connection = ctx.connections.connect(inv, &credential).await?;
    session.set_connected(connection.is_connected());

    if !connection.is_connected() {
        return Ok(ctx.config.disconnected_action());
    }
    session.record_success();
    Ok(ctx.config.success_action())
}
