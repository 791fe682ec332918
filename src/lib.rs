//! Sensor telemetry ingestion and ledger submission.
//!
//! Readings arrive as newline-delimited JSON, are grouped per sensor and
//! measurement kind by a [`batch::BatchAggregator`], and are committed to the
//! ledger once per flush interval by a [`flush::FlushDriver`], one signed
//! transaction per sensor.

pub mod batch;
pub mod config;
pub mod flush;
pub mod ledger;
pub mod sensor;
