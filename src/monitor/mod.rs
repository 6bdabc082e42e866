//! Snapshot diffing, alert dispatch, reports and the per-cluster loops that
//! drive them.

pub mod alarms;
pub mod diff;
pub mod dispatch;
pub mod report;
pub mod scheduler;
pub mod store;
