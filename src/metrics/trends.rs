//! Snapshot-to-snapshot comparison
//!
//! Produces one insight per tracked metric that moved outside the noise band,
//! ranked so regressions come first.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use tracing::debug;

use super::models::{Direction, Severity, Snapshot, TrendInsight};
use super::thresholds::{ThresholdConfig, DEFAULT_THRESHOLDS};

/// Changes smaller than this many percent in either direction are noise
pub const STABLE_BAND_PERCENT: i64 = 5;

/// Metrics compared between snapshots, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedMetric {
    Commits,
    PrsMerged,
    OpenPrs,
    CodeChurn,
    Reviews,
    AvgMergeTime,
    JiraCompletion,
}

impl TrackedMetric {
    pub const ALL: [Self; 7] = [
        Self::Commits,
        Self::PrsMerged,
        Self::OpenPrs,
        Self::CodeChurn,
        Self::Reviews,
        Self::AvgMergeTime,
        Self::JiraCompletion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Commits => "Commits",
            Self::PrsMerged => "PRs Merged",
            Self::OpenPrs => "Open PRs",
            Self::CodeChurn => "Code Churn",
            Self::Reviews => "Reviews",
            Self::AvgMergeTime => "Avg Merge Time",
            Self::JiraCompletion => "Jira Completion",
        }
    }

    /// Whether an increase is an improvement
    pub fn up_is_good(self) -> bool {
        !matches!(self, Self::OpenPrs | Self::AvgMergeTime)
    }

    /// Metric value for a snapshot, `None` when the snapshot has no data for it
    fn value(self, snapshot: &Snapshot) -> Option<f64> {
        let m = &snapshot.metrics;
        match self {
            Self::Commits => Some(m.total_commits as f64),
            Self::PrsMerged => Some(m.prs_merged as f64),
            Self::OpenPrs => Some(m.prs_open as f64),
            Self::CodeChurn => Some(m.churn() as f64),
            Self::Reviews => Some(m.total_reviews as f64),
            Self::AvgMergeTime => m.avg_merge_time_h,
            Self::JiraCompletion => (m.jira_total > 0).then(|| f64::from(m.jira_completion_pct)),
        }
    }

    fn format_value(self, snapshot: &Snapshot, value: f64) -> String {
        match self {
            Self::CodeChurn => format!(
                "+{}/-{} lines",
                snapshot.metrics.total_additions, snapshot.metrics.total_deletions
            ),
            Self::AvgMergeTime => format!("{value:.1}h"),
            Self::JiraCompletion => format!("{value:.0}%"),
            _ => format!("{value:.0}"),
        }
    }
}

/// Signed, rounded percent change from `previous` to `current`.
///
/// From zero, any increase counts as a full 100% and staying at zero is 0%.
/// Halves round up, so -4.5% becomes -4% and stays inside the noise band.
pub fn change_percent(current: f64, previous: f64) -> i64 {
    if previous == 0.0 {
        return if current > 0.0 { 100 } else { 0 };
    }
    (100.0 * (current - previous) / previous + 0.5).floor() as i64
}

impl Direction {
    /// Classify a percent change, treating the noise band as stable
    pub fn from_change(change_percent: i64) -> Self {
        if change_percent.abs() < STABLE_BAND_PERCENT {
            Self::Stable
        } else if change_percent > 0 {
            Self::Up
        } else {
            Self::Down
        }
    }
}

impl Severity {
    /// Only regressions escalate; improvements are always info
    pub fn classify(
        change_percent: i64,
        direction: Direction,
        up_is_good: bool,
        thresholds: &ThresholdConfig,
    ) -> Self {
        let is_bad = match direction {
            Direction::Up => !up_is_good,
            Direction::Down => up_is_good,
            Direction::Stable => false,
        };
        let magnitude = change_percent.abs() as f64;

        if is_bad && magnitude >= thresholds.trend_alert_percent {
            Self::Alert
        } else if is_bad && magnitude >= thresholds.trend_warning_percent {
            Self::Warning
        } else {
            Self::Info
        }
    }
}

/// Compare `current` against `previous` and rank what changed.
///
/// Returns nothing when there is no previous snapshot. Stable metrics are
/// dropped; the rest are ordered alert, warning, info, keeping metric order
/// within each severity.
pub fn analyze(
    current: &Snapshot,
    previous: Option<&Snapshot>,
    thresholds: Option<&ThresholdConfig>,
) -> Vec<TrendInsight> {
    let Some(previous) = previous else {
        return Vec::new();
    };
    let thresholds = thresholds.unwrap_or(&DEFAULT_THRESHOLDS);

    let mut insights: Vec<TrendInsight> = TrackedMetric::ALL
        .iter()
        .filter_map(|&metric| compare(metric, current, previous, thresholds))
        .filter(|insight| insight.direction != Direction::Stable)
        .collect();

    // sort_by_key is stable, so metric order survives within a severity
    insights.sort_by_key(|insight| insight.severity);

    debug!(
        team = %current.team_name,
        insights = insights.len(),
        "analyzed trends"
    );

    insights
}

fn compare(
    metric: TrackedMetric,
    current: &Snapshot,
    previous: &Snapshot,
    thresholds: &ThresholdConfig,
) -> Option<TrendInsight> {
    let current_value = metric.value(current)?;
    let previous_value = metric.value(previous)?;

    let change = change_percent(current_value, previous_value);
    let direction = Direction::from_change(change);
    let severity = Severity::classify(change, direction, metric.up_is_good(), thresholds);

    let signed_change = if direction == Direction::Up {
        format!("+{change}%")
    } else {
        format!("{change}%")
    };
    let message = format!(
        "{} {} {}: {} (was {})",
        metric.name(),
        direction.as_str(),
        signed_change,
        metric.format_value(current, current_value),
        metric.format_value(previous, previous_value),
    );

    Some(TrendInsight {
        metric: metric.name().to_string(),
        current: current_value,
        previous: previous_value,
        change_percent: change,
        direction,
        severity,
        message,
    })
}
