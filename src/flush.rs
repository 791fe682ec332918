use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{error, info, trace, warn};

use crate::{
    batch::{BatchAggregator, PendingBatch},
    ledger::{Request, SubmissionHandle},
    sensor::SensorId,
};

/// Bookkeeping for the driver's own loop.
///
/// `flush` borrows the driver mutably, so outside callers only ever observe
/// `Idle`; `Flushing` marks the span between swapping the batch out and
/// merging the failures back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    Flushing,
}

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub committed: Vec<SensorId>,
    pub retained: Vec<SensorId>,
    pub committed_points: usize,
    pub retained_points: usize,
}

impl FlushReport {
    pub fn attempted(&self) -> usize {
        self.committed.len() + self.retained.len()
    }
}

/// Periodically drains the aggregator into one ledger submission per sensor.
#[derive(Debug)]
pub struct FlushDriver {
    aggregator: BatchAggregator,
    submissions: SubmissionHandle,
    interval: Duration,
    state: FlushState,
}

impl FlushDriver {
    pub fn new(aggregator: BatchAggregator, submissions: SubmissionHandle, interval: Duration) -> Self {
        Self {
            aggregator,
            submissions,
            interval,
            state: FlushState::Idle,
        }
    }

    pub fn state(&self) -> FlushState {
        self.state
    }

    /// Flushes every interval until `shutdown` resolves, then makes one last
    /// attempt so a clean stop does not wait a full interval.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush().await;
                }
                _ = &mut shutdown => {
                    let report = self.flush().await;
                    if !report.retained.is_empty() {
                        warn!(
                            sensors = report.retained.len(),
                            points = report.retained_points,
                            "stopping with unsent measurements"
                        );
                    }
                    return;
                }
            }
        }
    }

    /// Submits the current batch, sensor by sensor.
    ///
    /// A failed sensor does not stop the others. Whatever was not committed is
    /// merged back into the live batch for the next flush.
    pub async fn flush(&mut self) -> FlushReport {
        let mut report = FlushReport::default();

        let batch = self.aggregator.swap_and_clear();
        if batch.is_empty() {
            trace!("batch empty, nothing to flush");
            return report;
        }

        self.state = FlushState::Flushing;
        info!(
            sensors = batch.sensor_count(),
            points = batch.point_count(),
            "submitting batch"
        );

        let mut failed = Vec::new();
        for request in batch.into_requests() {
            let sensor_id = request.sensor_id;
            let points = request.point_count();

            match self.submissions.submit(Request::from(request.clone())).await {
                Ok(_) => {
                    report.committed.push(sensor_id);
                    report.committed_points += points;
                }
                Err(e) if e.is_committed() => {
                    warn!(%sensor_id, error = %e, "measurements committed with unreadable reply");
                    report.committed.push(sensor_id);
                    report.committed_points += points;
                }
                Err(e) if e.is_retryable() => {
                    warn!(%sensor_id, points, error = %e, "submission failed, keeping measurements for next flush");
                    report.retained.push(sensor_id);
                    report.retained_points += points;
                    failed.push(request);
                }
                Err(e) => {
                    error!(%sensor_id, points, error = %e, "submission failed, signer key material may be unusable");
                    report.retained.push(sensor_id);
                    report.retained_points += points;
                    failed.push(request);
                }
            }
        }

        self.aggregator.merge_back(failed.into_iter().collect::<PendingBatch>());
        self.state = FlushState::Idle;

        info!(
            committed = report.committed.len(),
            retained = report.retained.len(),
            "flush finished"
        );

        report
    }
}
