//! Background reconciliation queue.
//!
//! Submissions are fire-and-forget with no ordering guarantee relative to
//! later requests of the same identity. A full queue drops the job; the
//! resulting drift lasts until the affected entry leaves its windows.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::limiter::AdmissionController;
use crate::metrics;
use crate::store::UsageTicket;

use super::usage::ActualUsage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileJob {
    pub identity: String,
    pub ticket: Option<UsageTicket>,
    pub usage: ActualUsage,
}

#[derive(Clone)]
pub struct ReconcileQueue {
    tx: mpsc::Sender<ReconcileJob>,
}

impl ReconcileQueue {
    /// Start the worker. It exits once every queue handle is dropped.
    pub fn spawn(controller: Arc<AdmissionController>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ReconcileJob>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // errors are logged and counted by the controller
                let _ = controller
                    .reconcile(&job.identity, job.ticket, job.usage.input_tokens, job.usage.output_tokens)
                    .await;
            }
            tracing::debug!("Reconciliation worker stopped");
        });
        (Self { tx }, worker)
    }

    /// Enqueue without waiting. Returns false when the job was dropped.
    pub fn submit(&self, job: ReconcileJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                metrics::record_reconciliation("dropped");
                tracing::warn!(identity = %job.identity, "Reconciliation queue full, dropping job");
                false
            },
            Err(mpsc::error::TrySendError::Closed(job)) => {
                metrics::record_reconciliation("dropped");
                tracing::warn!(identity = %job.identity, "Reconciliation worker gone, dropping job");
                false
            },
        }
    }
}
