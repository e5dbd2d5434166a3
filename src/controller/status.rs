//! Status bookkeeping for one reconciliation
//!
//! A [`StatusSession`] starts from the status observed on the record,
//! collects what the reconciliation learned, and writes the result exactly
//! once at the end. Nothing is written when the status did not change.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use chrono::Utc;
use futures::FutureExt;
use kube::runtime::controller::Action;
use tracing::{debug, info, warn};

use crate::crd::{SyncStatus, TrackedResource};
use crate::store::RecordWriter;
use crate::Error;

/// Status being assembled for one record
#[derive(Debug)]
pub struct StatusSession<K> {
    record: K,
    observed: SyncStatus,
    status: SyncStatus,
    closed: bool,
}

impl<K: TrackedResource> StatusSession<K> {
    /// Start from the status currently stored on `record`
    pub fn begin(record: K) -> Self {
        let observed = record.sync_status().cloned().unwrap_or_default();
        Self {
            status: observed.clone(),
            observed,
            record,
            closed: false,
        }
    }

    /// Latest known version of the record
    pub fn record(&self) -> &K {
        &self.record
    }

    /// Replace the record after a metadata write, keeping the pending status
    pub fn refresh(&mut self, record: K) {
        self.record = record;
    }

    /// Record the outcome of the connection attempt
    pub fn set_connected(&mut self, connected: bool) {
        if self.status.connected != connected {
            info!(
                from = self.status.connected,
                to = connected,
                "connection status changed"
            );
        }
        self.status.connected = connected;
    }

    /// Record a successful reconciliation
    pub fn record_success(&mut self) {
        self.status.value.clear();
        self.status.failure_count = 0;
    }

    /// Record a failed reconciliation
    pub fn record_failure(&mut self, error: &Error) {
        self.status.value = error.to_string();
        self.status.failure_count = self.observed.failure_count.saturating_add(1);
    }

    /// The record is gone; skip the final write
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Persist the status and settle the reconcile result
    ///
    /// Cancelled invocations write nothing. A record that vanished while
    /// being reconciled ends the invocation quietly. Any other error is
    /// recorded in the status before being returned.
    pub async fn complete(
        mut self,
        writer: &RecordWriter<'_, K>,
        outcome: Result<Action, Error>,
    ) -> Result<Action, Error> {
        match &outcome {
            Err(e) if e.is_cancelled() => return outcome,
            Err(e) if e.is_not_found() => {
                debug!(error = %e, "record disappeared during reconciliation");
                return Ok(Action::await_change());
            }
            Err(e) => self.record_failure(e),
            Ok(_) => {}
        }

        if self.closed {
            return outcome;
        }

        match self.flush(writer).await {
            Ok(()) => outcome,
            Err(write_err) => match outcome {
                Ok(_) if write_err.is_not_found() => Ok(Action::await_change()),
                Ok(_) => Err(write_err),
                Err(e) => {
                    warn!(error = %write_err, "unable to persist failure status");
                    Err(e)
                }
            },
        }
    }

    async fn flush(&mut self, writer: &RecordWriter<'_, K>) -> Result<(), Error> {
        if self.status == self.observed {
            debug!("status unchanged, skipping write");
            return Ok(());
        }
        if self.status.transitioned_from(&self.observed) {
            self.status.last_transition_time = Some(Utc::now());
        }
        writer.write_status(&self.record, &self.status).await?;
        Ok(())
    }
}

/// Run `fut`, turning a panic into [`Error::Internal`]
pub(crate) async fn catch_panic<F>(fut: F) -> Result<Action, Error>
where
    F: Future<Output = Result<Action, Error>>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(Error::internal(panic_message(panic.as_ref()))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("reconciliation panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("reconciliation panicked: {message}")
    } else {
        "reconciliation panicked".to_string()
    }
}
