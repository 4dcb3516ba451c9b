//! Snapshot aggregation, history and trend analysis

pub mod builder;
pub mod db;
pub mod models;
pub mod thresholds;
pub mod trends;

pub use builder::{build_member_snapshots, build_snapshot, SnapshotInput};
pub use db::{MetricsDb, SnapshotStore};
pub use models::{
    Direction, MemberSnapshot, Severity, Snapshot, SnapshotMetrics, SnapshotType, StoredSnapshot,
    TrendInsight,
};
pub use thresholds::{resolve, ThresholdConfig, ThresholdOverrides, DEFAULT_THRESHOLDS};
pub use trends::analyze;
