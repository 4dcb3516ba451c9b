//! Turns raw activity records into snapshot aggregates
//!
//! Everything here is a pure function of its inputs. Counts come from
//! `usize` lengths and averages are non-negative for well-formed input, so the
//! float conversions below cannot lose anything that matters.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::debug;

use crate::activity::{GitHubActivity, JiraActivity, JiraIssue, PrState, PullRequest};

use super::models::{MemberSnapshot, Snapshot, SnapshotMetrics, SnapshotType};

/// Jira statuses that count as finished, compared case-insensitively.
///
/// This is a closed list: "In Review" or custom workflow states never count.
pub const DONE_STATUSES: &[&str] = &["done", "closed", "resolved", "complete", "completed"];

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Everything needed to build one team snapshot
#[derive(Debug, Clone, Copy)]
pub struct SnapshotInput<'a> {
    pub team_name: &'a str,
    pub snapshot_type: SnapshotType,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub sprint_name: Option<&'a str>,
    pub github: &'a GitHubActivity,
    pub jira: Option<&'a JiraActivity>,
}

/// Check a Jira status against [`DONE_STATUSES`]
pub fn is_done_status(status: &str) -> bool {
    DONE_STATUSES
        .iter()
        .any(|done| done.eq_ignore_ascii_case(status))
}

/// Build a team snapshot from one period's activity
pub fn build_snapshot(input: &SnapshotInput<'_>) -> Snapshot {
    let pull_requests: Vec<&PullRequest> = input.github.pull_requests.iter().collect();
    let issues: Option<Vec<&JiraIssue>> = input.jira.map(|jira| jira.issues.iter().collect());

    let metrics = aggregate(
        input.github.commits.len(),
        &pull_requests,
        input.github.reviews.len(),
        issues.as_deref(),
    );

    debug!(
        team = input.team_name,
        snapshot_type = %input.snapshot_type,
        commits = metrics.total_commits,
        prs = metrics.total_prs,
        jira_total = metrics.jira_total,
        "built snapshot"
    );

    Snapshot {
        team_name: input.team_name.to_string(),
        snapshot_type: input.snapshot_type,
        period_start: input.period_start,
        period_end: input.period_end,
        sprint_name: input.sprint_name.map(str::to_string),
        metrics,
    }
}

/// Build one breakdown per member seen in the activity, sorted by member name.
///
/// Commits and PRs are attributed to their author, reviews to the reviewer
/// and Jira issues to the assignee. Records without a person are skipped.
pub fn build_member_snapshots(
    snapshot_id: i64,
    github: &GitHubActivity,
    jira: Option<&JiraActivity>,
) -> Vec<MemberSnapshot> {
    let mut members: BTreeSet<&str> = BTreeSet::new();
    members.extend(github.commits.iter().filter_map(|c| c.author.as_deref()));
    members.extend(github.pull_requests.iter().filter_map(|p| p.author.as_deref()));
    members.extend(github.reviews.iter().filter_map(|r| r.reviewer.as_deref()));
    if let Some(jira) = jira {
        members.extend(jira.issues.iter().filter_map(|i| i.assignee.as_deref()));
    }

    members
        .into_iter()
        .map(|member| {
            let is_member = |who: Option<&str>| who == Some(member);

            let commits = github
                .commits
                .iter()
                .filter(|c| is_member(c.author.as_deref()))
                .count();
            let pull_requests: Vec<&PullRequest> = github
                .pull_requests
                .iter()
                .filter(|p| is_member(p.author.as_deref()))
                .collect();
            let reviews = github
                .reviews
                .iter()
                .filter(|r| is_member(r.reviewer.as_deref()))
                .count();
            let issues: Option<Vec<&JiraIssue>> = jira.map(|jira| {
                jira.issues
                    .iter()
                    .filter(|i| is_member(i.assignee.as_deref()))
                    .collect()
            });

            MemberSnapshot {
                snapshot_id,
                member: member.to_string(),
                metrics: aggregate(commits, &pull_requests, reviews, issues.as_deref()),
            }
        })
        .collect()
}

fn aggregate(
    commit_count: usize,
    pull_requests: &[&PullRequest],
    review_count: usize,
    issues: Option<&[&JiraIssue]>,
) -> SnapshotMetrics {
    let count_state =
        |state: PrState| pull_requests.iter().filter(|pr| pr.state == state).count() as u64;

    let jira_total = issues.map_or(0, <[_]>::len) as u64;
    let jira_completed = issues.map_or(0, |issues| {
        issues.iter().filter(|i| is_done_status(&i.status)).count()
    }) as u64;

    SnapshotMetrics {
        total_commits: commit_count as u64,
        total_prs: pull_requests.len() as u64,
        prs_merged: count_state(PrState::Merged),
        prs_open: count_state(PrState::Open),
        total_additions: pull_requests.iter().map(|pr| pr.additions.unwrap_or(0)).sum(),
        total_deletions: pull_requests.iter().map(|pr| pr.deletions.unwrap_or(0)).sum(),
        total_reviews: review_count as u64,
        avg_merge_time_h: average_merge_hours(pull_requests),
        jira_total,
        jira_completed,
        jira_completion_pct: completion_pct(jira_completed, jira_total),
    }
}

/// Mean creation-to-merge time in hours, rounded to one decimal
fn average_merge_hours(pull_requests: &[&PullRequest]) -> Option<f64> {
    let hours: Vec<f64> = pull_requests
        .iter()
        .filter_map(|pr| {
            let created = pr.created_at?;
            let merged = pr.merged_at?;
            Some(merged.signed_duration_since(created).num_milliseconds() as f64 / MILLIS_PER_HOUR)
        })
        .collect();

    if hours.is_empty() {
        return None;
    }

    let mean = hours.iter().sum::<f64>() / hours.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}

fn completion_pct(completed: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    (100.0 * completed as f64 / total as f64).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{Commit, Review};

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn pr(number: u64, state: PrState, author: &str) -> PullRequest {
        PullRequest {
            number,
            title: format!("PR {number}"),
            author: Some(author.to_string()),
            state,
            additions: None,
            deletions: None,
            created_at: None,
            merged_at: None,
        }
    }

    fn merged_pr(number: u64, created: &str, merged: &str) -> PullRequest {
        PullRequest {
            created_at: Some(ts(created)),
            merged_at: Some(ts(merged)),
            ..pr(number, PrState::Merged, "alice")
        }
    }

    fn commit(sha: &str, author: &str) -> Commit {
        Commit {
            sha: sha.to_string(),
            author: Some(author.to_string()),
            message: String::new(),
            committed_at: None,
        }
    }

    fn issue(key: &str, status: &str, assignee: Option<&str>) -> JiraIssue {
        JiraIssue {
            key: key.to_string(),
            summary: String::new(),
            status: status.to_string(),
            assignee: assignee.map(str::to_string),
        }
    }

    fn input<'a>(github: &'a GitHubActivity, jira: Option<&'a JiraActivity>) -> SnapshotInput<'a> {
        SnapshotInput {
            team_name: "platform",
            snapshot_type: SnapshotType::Weekly,
            period_start: ts("2024-03-04T00:00:00Z"),
            period_end: ts("2024-03-11T00:00:00Z"),
            sprint_name: None,
            github,
            jira,
        }
    }

    #[test]
    fn test_done_status_vocabulary() {
        assert!(is_done_status("Done"));
        assert!(is_done_status("CLOSED"));
        assert!(is_done_status("resolved"));
        assert!(is_done_status("Complete"));
        assert!(is_done_status("completed"));
        assert!(!is_done_status("In Review"));
        assert!(!is_done_status("Won't Do"));
        assert!(!is_done_status(""));
    }

    #[test]
    fn test_counts_and_pr_partition() {
        let mut with_lines = pr(4, PrState::Open, "bob");
        with_lines.additions = Some(120);
        with_lines.deletions = Some(30);
        let mut merged_lines = pr(1, PrState::Merged, "alice");
        merged_lines.additions = Some(10);

        let github = GitHubActivity {
            commits: vec![commit("a", "alice"), commit("b", "bob"), commit("c", "bob")],
            pull_requests: vec![
                merged_lines,
                pr(2, PrState::Merged, "alice"),
                pr(3, PrState::Closed, "bob"),
                with_lines,
            ],
            reviews: vec![Review {
                pr_number: 1,
                reviewer: Some("bob".to_string()),
                state: "APPROVED".to_string(),
                submitted_at: None,
            }],
        };

        let snapshot = build_snapshot(&input(&github, None));
        let m = &snapshot.metrics;
        assert_eq!(m.total_commits, 3);
        assert_eq!(m.total_prs, 4);
        assert_eq!(m.prs_merged, 2);
        // Closed-unmerged PRs count in the total only
        assert_eq!(m.prs_open, 1);
        assert_eq!(m.total_additions, 130);
        assert_eq!(m.total_deletions, 30);
        assert_eq!(m.total_reviews, 1);
        assert_eq!(snapshot.team_name, "platform");
        assert_eq!(snapshot.snapshot_type, SnapshotType::Weekly);
    }

    #[test]
    fn test_merge_time_average() {
        let github = GitHubActivity {
            pull_requests: vec![
                merged_pr(1, "2024-03-04T00:00:00Z", "2024-03-04T10:00:00Z"),
                merged_pr(2, "2024-03-05T00:00:00Z", "2024-03-06T06:00:00Z"),
            ],
            ..Default::default()
        };

        let snapshot = build_snapshot(&input(&github, None));
        assert_eq!(snapshot.metrics.avg_merge_time_h, Some(20.0));
    }

    #[test]
    fn test_merge_time_rounds_to_one_decimal() {
        let github = GitHubActivity {
            pull_requests: vec![
                merged_pr(1, "2024-03-04T00:00:00Z", "2024-03-04T01:00:00Z"),
                merged_pr(2, "2024-03-04T00:00:00Z", "2024-03-04T01:00:00Z"),
                merged_pr(3, "2024-03-04T00:00:00Z", "2024-03-04T02:00:00Z"),
            ],
            ..Default::default()
        };

        // 4h / 3 = 1.333...
        let snapshot = build_snapshot(&input(&github, None));
        assert_eq!(snapshot.metrics.avg_merge_time_h, Some(1.3));
    }

    #[test]
    fn test_merge_time_none_without_timestamps() {
        let mut no_merge = pr(2, PrState::Open, "bob");
        no_merge.created_at = Some(ts("2024-03-04T00:00:00Z"));
        let github = GitHubActivity {
            pull_requests: vec![pr(1, PrState::Merged, "alice"), no_merge],
            ..Default::default()
        };

        let snapshot = build_snapshot(&input(&github, None));
        assert_eq!(snapshot.metrics.avg_merge_time_h, None);
    }

    #[test]
    fn test_instant_merge_is_zero_not_none() {
        let github = GitHubActivity {
            pull_requests: vec![merged_pr(1, "2024-03-04T00:00:00Z", "2024-03-04T00:00:00Z")],
            ..Default::default()
        };

        let snapshot = build_snapshot(&input(&github, None));
        assert_eq!(snapshot.metrics.avg_merge_time_h, Some(0.0));
    }

    #[test]
    fn test_jira_completion_pct() {
        let github = GitHubActivity::default();
        let jira = JiraActivity {
            issues: vec![
                issue("P-1", "Done", None),
                issue("P-2", "In Review", None),
                issue("P-3", "resolved", None),
            ],
        };

        let snapshot = build_snapshot(&input(&github, Some(&jira)));
        assert_eq!(snapshot.metrics.jira_total, 3);
        assert_eq!(snapshot.metrics.jira_completed, 2);
        // 66.67 rounds up
        assert_eq!(snapshot.metrics.jira_completion_pct, 67);
    }

    #[test]
    fn test_jira_completion_zero_without_issues() {
        let github = GitHubActivity::default();
        let empty = JiraActivity::default();

        let without = build_snapshot(&input(&github, None));
        let with_empty = build_snapshot(&input(&github, Some(&empty)));
        for snapshot in [without, with_empty] {
            assert_eq!(snapshot.metrics.jira_total, 0);
            assert_eq!(snapshot.metrics.jira_completion_pct, 0);
        }
    }

    #[test]
    fn test_member_snapshots() {
        let mut bob_pr = pr(2, PrState::Open, "bob");
        bob_pr.additions = Some(5);
        let github = GitHubActivity {
            commits: vec![commit("a", "alice"), commit("b", "bob"), commit("c", "alice")],
            pull_requests: vec![
                merged_pr(1, "2024-03-04T00:00:00Z", "2024-03-04T04:00:00Z"),
                bob_pr,
            ],
            reviews: vec![Review {
                pr_number: 1,
                reviewer: Some("carol".to_string()),
                state: "APPROVED".to_string(),
                submitted_at: None,
            }],
        };
        let jira = JiraActivity {
            issues: vec![
                issue("P-1", "Done", Some("bob")),
                issue("P-2", "To Do", Some("bob")),
                issue("P-3", "Done", None),
            ],
        };

        let members = build_member_snapshots(9, &github, Some(&jira));
        let names: Vec<&str> = members.iter().map(|m| m.member.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
        assert!(members.iter().all(|m| m.snapshot_id == 9));

        let alice = &members[0].metrics;
        assert_eq!(alice.total_commits, 2);
        assert_eq!(alice.prs_merged, 1);
        assert_eq!(alice.avg_merge_time_h, Some(4.0));
        assert_eq!(alice.jira_total, 0);

        let bob = &members[1].metrics;
        assert_eq!(bob.total_commits, 1);
        assert_eq!(bob.prs_open, 1);
        assert_eq!(bob.total_additions, 5);
        assert_eq!(bob.avg_merge_time_h, None);
        assert_eq!(bob.jira_total, 2);
        assert_eq!(bob.jira_completion_pct, 50);

        let carol = &members[2].metrics;
        assert_eq!(carol.total_reviews, 1);
        assert_eq!(carol.total_commits, 0);
    }
}
