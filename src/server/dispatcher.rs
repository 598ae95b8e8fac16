// src/server/dispatcher.rs

//! Hands parsed requests to the coordinator through a bounded work queue.

use crate::core::Response;
use crate::core::coordinator::{Coordinator, GatewayRequest};
use crate::core::deadline::Deadline;
use crate::core::errors::GatewayError;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Job {
    request: GatewayRequest,
    deadline: Deadline,
    cancel: CancellationToken,
    reply: oneshot::Sender<Response>,
}

/// Accepts requests, applies deadlines and runs one worker task per job.
///
/// The queue is bounded: when it fills up, enqueueing blocks the caller,
/// which is the gateway's admission-control pressure point.
pub struct Dispatcher {
    queue_tx: mpsc::Sender<Job>,
}

impl Dispatcher {
    pub fn new(coordinator: Arc<Coordinator>, queue_len: usize) -> Self {
        let (queue_tx, mut queue_rx) = mpsc::channel::<Job>(queue_len.max(1));

        tokio::spawn(async move {
            while let Some(job) = queue_rx.recv().await {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move {
                    let response = coordinator
                        .dispatch(job.request, job.deadline, &job.cancel)
                        .await;
                    // The submitter may have given up already; that's fine.
                    let _ = job.reply.send(response);
                });
            }
            debug!("Dispatcher queue closed; worker loop exiting");
        });

        Self { queue_tx }
    }

    /// Enqueues a request and awaits its response.
    ///
    /// If the deadline fires first, the worker is cancelled and a synthetic
    /// 499 is returned to the client.
    pub async fn submit(&self, request: GatewayRequest, deadline: Deadline) -> Response {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let job = Job {
            request,
            deadline,
            cancel: cancel.clone(),
            reply: reply_tx,
        };

        if self.queue_tx.send(job).await.is_err() {
            return Response::from_error(GatewayError::Internal(
                "dispatcher queue closed".to_string(),
            ));
        }

        tokio::select! {
            _ = tokio::time::sleep_until(deadline.instant()) => {
                cancel.cancel();
                Response::from_error(GatewayError::ClientCancelled)
            }
            result = reply_rx => match result {
                Ok(response) => response,
                Err(_) => Response::from_error(GatewayError::Internal(
                    "worker dropped without responding".to_string(),
                )),
            }
        }
    }
}
