use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Period a snapshot covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotType {
    Daily,
    Weekly,
    Sprint,
}

impl SnapshotType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Sprint => "sprint",
        }
    }
}

impl std::fmt::Display for SnapshotType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SnapshotType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "sprint" => Ok(Self::Sprint),
            other => Err(format!(
                "invalid snapshot type '{other}', expected one of: daily, weekly, sprint"
            )),
        }
    }
}

/// Aggregates shared by team and member snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetrics {
    pub total_commits: u64,
    pub total_prs: u64,
    pub prs_merged: u64,
    pub prs_open: u64,
    pub total_additions: u64,
    pub total_deletions: u64,
    pub total_reviews: u64,
    /// Mean hours from PR creation to merge. `None` means no merged PR had
    /// both timestamps; it is not the same as zero.
    pub avg_merge_time_h: Option<f64>,
    pub jira_total: u64,
    pub jira_completed: u64,
    /// Completed share of Jira issues (0 - 100), 0 when there are no issues
    pub jira_completion_pct: u32,
}

impl SnapshotMetrics {
    /// Lines added plus lines deleted
    pub fn churn(&self) -> u64 {
        self.total_additions + self.total_deletions
    }
}

/// Aggregate engineering metrics for one team over one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub team_name: String,
    pub snapshot_type: SnapshotType,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_name: Option<String>,
    #[serde(flatten)]
    pub metrics: SnapshotMetrics,
}

/// A snapshot as persisted, with store-assigned identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSnapshot {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub snapshot: Snapshot,
}

/// Per-member breakdown linked to a stored snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSnapshot {
    pub snapshot_id: i64,
    pub member: String,
    #[serde(flatten)]
    pub metrics: SnapshotMetrics,
}

/// Trend direction compared to previous period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Stable,
}

impl Direction {
    /// Get the display symbol for this direction
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Up => "↑",
            Self::Down => "↓",
            Self::Stable => "-",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Stable => "stable",
        }
    }
}

/// How loudly an insight should be surfaced.
///
/// Variants are declared most-severe first so the derived ordering sorts
/// alerts ahead of warnings ahead of info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Alert,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// A derived comparison of one metric between two snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendInsight {
    pub metric: String,
    pub current: f64,
    pub previous: f64,
    pub change_percent: i64,
    pub direction: Direction,
    pub severity: Severity,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_type_parse() {
        assert_eq!("weekly".parse::<SnapshotType>(), Ok(SnapshotType::Weekly));
        assert_eq!(" Sprint ".parse::<SnapshotType>(), Ok(SnapshotType::Sprint));
        let err = "monthly".parse::<SnapshotType>().unwrap_err();
        assert!(err.contains("monthly"));
    }

    #[test]
    fn test_severity_orders_alert_first() {
        let mut severities = vec![Severity::Info, Severity::Alert, Severity::Warning];
        severities.sort();
        assert_eq!(
            severities,
            vec![Severity::Alert, Severity::Warning, Severity::Info]
        );
    }

    #[test]
    fn test_snapshot_json_keeps_null_merge_time() {
        let snapshot = Snapshot {
            team_name: "platform".to_string(),
            snapshot_type: SnapshotType::Daily,
            period_start: "2024-03-04T00:00:00Z".parse().unwrap(),
            period_end: "2024-03-05T00:00:00Z".parse().unwrap(),
            sprint_name: None,
            metrics: SnapshotMetrics::default(),
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["teamName"], "platform");
        assert_eq!(json["snapshotType"], "daily");
        assert!(json["avgMergeTimeH"].is_null());
        assert!(json.get("sprintName").is_none());
    }
}
