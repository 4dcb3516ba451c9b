//! Threshold configuration with built-in defaults
//!
//! Only the `trend_*` fields feed the trend analyzer. The rest are carried for
//! alerting consumers that read the same config file.

use serde::{Deserialize, Serialize};

/// Fully resolved thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Days before an open PR is flagged as stale (warning)
    pub stale_pr_warning_days: f64,
    /// Days before an open PR is flagged as stale (alert)
    pub stale_pr_alert_days: f64,
    /// Days without movement before an issue is stale
    pub stale_issue_days: f64,
    /// Share of reviews (0.0 - 1.0) done by one member that counts as imbalance
    pub review_imbalance_threshold: f64,
    /// Churn multiple of the team average that counts as high churn
    pub high_churn_multiplier: f64,
    /// Minimum changed lines before high churn is considered at all
    pub high_churn_minimum: f64,
    /// Percent change of a regressing metric that raises an alert
    pub trend_alert_percent: f64,
    /// Percent change of a regressing metric that raises a warning
    pub trend_warning_percent: f64,
    /// Average merge time in hours that raises a warning
    pub merge_time_warning_h: f64,
    /// Average merge time in hours that raises an alert
    pub merge_time_alert_h: f64,
}

/// Built-in defaults. `resolve` copies from this, it is never written to.
pub const DEFAULT_THRESHOLDS: ThresholdConfig = ThresholdConfig {
    stale_pr_warning_days: 1.0,
    stale_pr_alert_days: 2.0,
    stale_issue_days: 7.0,
    review_imbalance_threshold: 0.6,
    high_churn_multiplier: 3.0,
    high_churn_minimum: 1000.0,
    trend_alert_percent: 50.0,
    trend_warning_percent: 25.0,
    merge_time_warning_h: 24.0,
    merge_time_alert_h: 48.0,
};

impl Default for ThresholdConfig {
    fn default() -> Self {
        DEFAULT_THRESHOLDS
    }
}

/// Partial thresholds as written in the config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_pr_warning_days: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_pr_alert_days: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_issue_days: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_imbalance_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_churn_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_churn_minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_alert_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_warning_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_time_warning_h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_time_alert_h: Option<f64>,
}

impl From<ThresholdConfig> for ThresholdOverrides {
    /// Spell out every field, e.g. to write a full config template
    fn from(config: ThresholdConfig) -> Self {
        Self {
            stale_pr_warning_days: Some(config.stale_pr_warning_days),
            stale_pr_alert_days: Some(config.stale_pr_alert_days),
            stale_issue_days: Some(config.stale_issue_days),
            review_imbalance_threshold: Some(config.review_imbalance_threshold),
            high_churn_multiplier: Some(config.high_churn_multiplier),
            high_churn_minimum: Some(config.high_churn_minimum),
            trend_alert_percent: Some(config.trend_alert_percent),
            trend_warning_percent: Some(config.trend_warning_percent),
            merge_time_warning_h: Some(config.merge_time_warning_h),
            merge_time_alert_h: Some(config.merge_time_alert_h),
        }
    }
}

/// Overlay `overrides` onto a copy of the defaults.
///
/// Values are taken as-is; range checks belong to whoever writes the config.
pub fn resolve(overrides: Option<&ThresholdOverrides>) -> ThresholdConfig {
    let defaults = DEFAULT_THRESHOLDS;
    let Some(o) = overrides else {
        return defaults;
    };

    ThresholdConfig {
        stale_pr_warning_days: o
            .stale_pr_warning_days
            .unwrap_or(defaults.stale_pr_warning_days),
        stale_pr_alert_days: o
            .stale_pr_alert_days
            .unwrap_or(defaults.stale_pr_alert_days),
        stale_issue_days: o.stale_issue_days.unwrap_or(defaults.stale_issue_days),
        review_imbalance_threshold: o
            .review_imbalance_threshold
            .unwrap_or(defaults.review_imbalance_threshold),
        high_churn_multiplier: o
            .high_churn_multiplier
            .unwrap_or(defaults.high_churn_multiplier),
        high_churn_minimum: o.high_churn_minimum.unwrap_or(defaults.high_churn_minimum),
        trend_alert_percent: o
            .trend_alert_percent
            .unwrap_or(defaults.trend_alert_percent),
        trend_warning_percent: o
            .trend_warning_percent
            .unwrap_or(defaults.trend_warning_percent),
        merge_time_warning_h: o
            .merge_time_warning_h
            .unwrap_or(defaults.merge_time_warning_h),
        merge_time_alert_h: o.merge_time_alert_h.unwrap_or(defaults.merge_time_alert_h),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_without_overrides_returns_defaults() {
        assert_eq!(resolve(None), DEFAULT_THRESHOLDS);
        assert_eq!(resolve(Some(&ThresholdOverrides::default())), DEFAULT_THRESHOLDS);
    }

    #[test]
    fn test_resolve_overlays_single_field() {
        let overrides = ThresholdOverrides {
            trend_alert_percent: Some(80.0),
            ..Default::default()
        };
        let resolved = resolve(Some(&overrides));
        assert!((resolved.trend_alert_percent - 80.0).abs() < f64::EPSILON);
        assert!((resolved.trend_warning_percent - 25.0).abs() < f64::EPSILON);
        assert!((resolved.stale_issue_days - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_resolve_does_not_leak_between_calls() {
        let before = DEFAULT_THRESHOLDS;

        let first = resolve(Some(&ThresholdOverrides {
            trend_warning_percent: Some(10.0),
            stale_pr_alert_days: Some(5.0),
            ..Default::default()
        }));
        let second = resolve(Some(&ThresholdOverrides {
            trend_alert_percent: Some(90.0),
            ..Default::default()
        }));

        assert!((first.trend_warning_percent - 10.0).abs() < f64::EPSILON);
        // Second call must not see the first call's overrides
        assert!((second.trend_warning_percent - 25.0).abs() < f64::EPSILON);
        assert!((second.stale_pr_alert_days - 2.0).abs() < f64::EPSILON);
        assert_eq!(DEFAULT_THRESHOLDS, before);
        assert_eq!(resolve(None), before);
    }

    #[test]
    fn test_resolve_accepts_out_of_range_values() {
        let resolved = resolve(Some(&ThresholdOverrides {
            stale_issue_days: Some(-3.0),
            ..Default::default()
        }));
        assert!((resolved.stale_issue_days + 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_trend_thresholds_ordered() {
        let t = DEFAULT_THRESHOLDS;
        assert!(t.trend_alert_percent >= t.trend_warning_percent);
        assert!(t.trend_warning_percent >= 0.0);
    }

    #[test]
    fn test_full_overrides_resolve_to_same_config() {
        let custom = ThresholdConfig {
            trend_alert_percent: 40.0,
            ..DEFAULT_THRESHOLDS
        };
        assert_eq!(resolve(Some(&ThresholdOverrides::from(custom))), custom);
    }

    #[test]
    fn test_overrides_parse_from_partial_toml() {
        let overrides: ThresholdOverrides =
            toml::from_str("trend_alert_percent = 75.0\nstale_issue_days = 14.0\n").unwrap();
        assert_eq!(overrides.trend_alert_percent, Some(75.0));
        assert_eq!(overrides.stale_issue_days, Some(14.0));
        assert_eq!(overrides.trend_warning_percent, None);
    }
}
