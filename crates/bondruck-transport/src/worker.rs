// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded delivery worker pool.
//
// Each accepted job gets its own cancellation token and a oneshot for the
// outcome; the queue is bounded and saturation fails the submit immediately
// rather than letting receipts pile up invisibly behind a wedged printer.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use bondruck_core::error::{BondruckError, Result};
use bondruck_core::types::{DeliveryRequest, TransportKind};

use crate::orchestrator::Orchestrator;

struct Job {
    request: DeliveryRequest,
    cancel: CancellationToken,
    done: oneshot::Sender<Result<TransportKind>>,
}

/// Handle to one in-flight (or queued) delivery.
pub struct DeliveryTicket {
    cancel: CancellationToken,
    done: oneshot::Receiver<Result<TransportKind>>,
}

impl DeliveryTicket {
    /// Request cancellation.  Takes effect at the next chunk boundary; bytes
    /// already written stay written.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the delivery to resolve.
    pub async fn wait(self) -> Result<TransportKind> {
        match self.done.await {
            Ok(result) => result,
            // Worker dropped the sender: the pool shut down under us.
            Err(_) => Err(BondruckError::Cancelled),
        }
    }
}

/// Fixed set of worker tasks draining a bounded job queue.
///
/// Dropping the pool closes the queue; workers finish the job in hand and
/// exit.  `shutdown` additionally cancels jobs still waiting in the queue.
pub struct DeliveryPool {
    queue: mpsc::Sender<Job>,
    depth: usize,
    shutdown: CancellationToken,
}

impl DeliveryPool {
    pub fn new(orchestrator: Arc<Orchestrator>, workers: usize, queue_depth: usize) -> Self {
        let depth = queue_depth.max(1);
        let (tx, rx) = mpsc::channel::<Job>(depth);
        let rx = Arc::new(Mutex::new(rx));
        let shutdown = CancellationToken::new();

        for id in 0..workers.max(1) {
            tokio::spawn(worker_loop(
                id,
                Arc::clone(&orchestrator),
                Arc::clone(&rx),
                shutdown.child_token(),
            ));
        }

        Self {
            queue: tx,
            depth,
            shutdown,
        }
    }

    /// Enqueue a delivery.  Fails with `Busy` when the queue is saturated —
    /// the request is never partially accepted.
    pub fn submit(&self, request: DeliveryRequest) -> Result<DeliveryTicket> {
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel();
        let job = Job {
            request,
            cancel: cancel.clone(),
            done: done_tx,
        };

        match self.queue.try_send(job) {
            Ok(()) => Ok(DeliveryTicket {
                cancel,
                done: done_rx,
            }),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(depth = self.depth, "delivery queue saturated");
                Err(BondruckError::Busy(self.depth))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(BondruckError::Cancelled),
        }
    }

    /// Stop the workers.  The job in hand runs to completion; queued jobs are
    /// resolved as cancelled when their worker picks them up.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

async fn worker_loop(
    id: usize,
    orchestrator: Arc<Orchestrator>,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    shutdown: CancellationToken,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = shutdown.cancelled() => None,
                job = rx.recv() => job,
            }
        };
        let Some(job) = job else {
            debug!(worker = id, "worker exiting");
            return;
        };

        debug!(worker = id, len = job.request.payload.len(), "job picked up");
        let result = if shutdown.is_cancelled() || job.cancel.is_cancelled() {
            Err(BondruckError::Cancelled)
        } else {
            orchestrator.deliver(&job.request, &job.cancel).await
        };
        // The submitter may have dropped its ticket; that is not an error.
        let _ = job.done.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bondruck_bridge::stub::StubProvider;
    use bondruck_core::config::EngineConfig;

    fn pool_over(stub: &StubProvider, workers: usize, depth: usize) -> DeliveryPool {
        let orchestrator = Arc::new(Orchestrator::from_provider(stub, EngineConfig::default()));
        DeliveryPool::new(orchestrator, workers, depth)
    }

    #[tokio::test(start_paused = true)]
    async fn submitted_job_delivers_and_resolves_the_ticket() {
        let stub = StubProvider::new();
        stub.add_wired_printer("usb:1-1", "TM-T20");
        let pool = pool_over(&stub, 2, 8);

        let ticket = pool
            .submit(DeliveryRequest::new(vec![1u8; 300]))
            .expect("submit");
        let via = ticket.wait().await.expect("deliver");
        assert_eq!(via, TransportKind::Wired);
        assert!(!stub.writes("usb:1-1").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_queue_rejects_without_enqueueing() {
        let stub = StubProvider::new();
        stub.add_wired_printer("usb:1-1", "TM-T20");
        let pool = pool_over(&stub, 1, 2);

        // No await between submits, so no worker has drained the queue yet.
        let first = pool.submit(DeliveryRequest::new(vec![1u8; 10]));
        let second = pool.submit(DeliveryRequest::new(vec![2u8; 10]));
        let third = pool.submit(DeliveryRequest::new(vec![3u8; 10]));

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert!(matches!(third, Err(BondruckError::Busy(2))));

        first.expect("first").wait().await.expect("deliver");
        second.expect("second").wait().await.expect("deliver");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_ticket_stops_the_job_before_bytes_flow() {
        let stub = StubProvider::new();
        stub.add_wired_printer("usb:1-1", "TM-T20");
        let pool = pool_over(&stub, 1, 4);

        let ticket = pool
            .submit(DeliveryRequest::new(vec![1u8; 600]))
            .expect("submit");
        ticket.cancel();

        let err = ticket.wait().await.expect_err("cancelled");
        assert!(matches!(err, BondruckError::Cancelled));
        assert_eq!(stub.total_bytes_written(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pool_drains_sequential_jobs() {
        let stub = StubProvider::new();
        stub.add_wired_printer("usb:1-1", "TM-T20");
        let pool = pool_over(&stub, 1, 4);

        for byte in 1u8..=3 {
            let ticket = pool
                .submit(DeliveryRequest::new(vec![byte; 10]))
                .expect("submit");
            ticket.wait().await.expect("deliver");
        }
        // preamble + chunk + trailer per job
        assert_eq!(stub.writes("usb:1-1").len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_resolves_queued_jobs_as_cancelled() {
        let stub = StubProvider::new();
        stub.add_wired_printer("usb:1-1", "TM-T20");
        let pool = pool_over(&stub, 1, 4);

        let ticket = pool
            .submit(DeliveryRequest::new(vec![1u8; 10]))
            .expect("submit");
        pool.shutdown();

        // Either the worker saw the shutdown before picking the job up (the
        // job resolves Cancelled) or the ticket observes the dropped sender.
        match ticket.wait().await {
            Err(BondruckError::Cancelled) => {}
            Ok(_) => {} // worker won the race and delivered; also legal
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}
