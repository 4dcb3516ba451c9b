//! Raw activity records handed over by the GitHub and Jira fetchers
//!
//! Fetchers write these as JSON (camelCase keys) for the requested time
//! window. Order of records carries no meaning.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubActivity {
    #[serde(default)]
    pub commits: Vec<Commit>,
    #[serde(default)]
    pub pull_requests: Vec<PullRequest>,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub sha: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub committed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    pub state: PrState,
    #[serde(default)]
    pub additions: Option<u64>,
    #[serde(default)]
    pub deletions: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub pr_number: u64,
    #[serde(default)]
    pub reviewer: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraActivity {
    #[serde(default)]
    pub issues: Vec<JiraIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraIssue {
    pub key: String,
    #[serde(default)]
    pub summary: String,
    pub status: String,
    #[serde(default)]
    pub assignee: Option<String>,
}

impl GitHubActivity {
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

impl JiraActivity {
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read activity file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse activity file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_github_activity() {
        let json = r#"{
            "commits": [{"sha": "abc123", "author": "alice"}],
            "pullRequests": [{
                "number": 7,
                "state": "merged",
                "additions": 40,
                "createdAt": "2024-03-04T09:00:00Z",
                "mergedAt": "2024-03-04T19:00:00Z"
            }],
            "reviews": [{"prNumber": 7, "reviewer": "bob", "state": "APPROVED"}]
        }"#;

        let activity: GitHubActivity = serde_json::from_str(json).unwrap();
        assert_eq!(activity.commits.len(), 1);
        assert_eq!(activity.pull_requests[0].state, PrState::Merged);
        assert_eq!(activity.pull_requests[0].additions, Some(40));
        assert_eq!(activity.pull_requests[0].deletions, None);
        assert!(activity.pull_requests[0].merged_at.is_some());
        assert_eq!(activity.reviews[0].reviewer.as_deref(), Some("bob"));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let activity: GitHubActivity = serde_json::from_str("{}").unwrap();
        assert!(activity.commits.is_empty());
        assert!(activity.pull_requests.is_empty());
        assert!(activity.reviews.is_empty());
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("jira.json");
        std::fs::write(&path, "not json").unwrap();

        let err = format!("{:#}", JiraActivity::load(&path).unwrap_err());
        assert!(err.contains("Failed to parse activity file"));
        assert!(err.contains("jira.json"));
    }
}
