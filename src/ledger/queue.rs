use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::debug;

use crate::ledger::{Ledger, Request, Response, SubmitError, TransactionSubmitter};

const QUEUE_CAPACITY: usize = 64;

struct Job {
    request: Request,
    reply: oneshot::Sender<Result<Response, SubmitError>>,
}

/// Sending side of a signing account's work queue.
///
/// Every submission for the account goes through the one worker behind this
/// handle, so nonces are fetched and consumed strictly one at a time.
#[derive(Debug, Clone)]
pub struct SubmissionHandle {
    jobs: mpsc::Sender<Job>,
}

impl SubmissionHandle {
    pub async fn submit(&self, request: Request) -> Result<Response, SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.jobs
            .send(Job { request, reply })
            .await
            .map_err(|_| SubmitError::QueueClosed)?;

        rx.await.map_err(|_| SubmitError::QueueClosed)?
    }
}

/// Starts the worker that owns `submitter`. It stops once every handle is dropped.
pub fn spawn_submission_worker<L: Ledger>(
    submitter: TransactionSubmitter<L>,
) -> (SubmissionHandle, JoinHandle<()>) {
    let (jobs, rx) = mpsc::channel(QUEUE_CAPACITY);
    let worker = tokio::spawn(run_worker(submitter, rx));

    (SubmissionHandle { jobs }, worker)
}

async fn run_worker<L: Ledger>(submitter: TransactionSubmitter<L>, mut jobs: mpsc::Receiver<Job>) {
    let address = submitter.signer().address();
    debug!(%address, "submission worker started");

    while let Some(Job { request, reply }) = jobs.recv().await {
        let result = submitter.submit_and_await(&request).await;
        if reply.send(result).is_err() {
            debug!(kind = request.kind(), "submission caller went away");
        }
    }

    debug!(%address, "submission worker stopped");
}
