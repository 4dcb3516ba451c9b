use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use team_pulse::activity::{GitHubActivity, JiraActivity};
use team_pulse::config::Config;
use team_pulse::metrics::{
    analyze, build_member_snapshots, build_snapshot, MetricsDb, Snapshot, SnapshotInput,
    SnapshotStore, SnapshotType, ThresholdOverrides, DEFAULT_THRESHOLDS,
};

#[derive(Parser)]
#[command(
    name = "team-pulse",
    version,
    about = "Engineering activity snapshots and trend insights"
)]
struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file with the default thresholds
    Init,

    /// Build a snapshot from activity files and record it
    Snapshot {
        /// Team name
        #[arg(long)]
        team: String,
        /// Snapshot type: daily, weekly or sprint
        #[arg(long = "type", default_value = "weekly")]
        snapshot_type: SnapshotType,
        /// Period start (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,
        /// Period end (RFC 3339)
        #[arg(long)]
        end: DateTime<Utc>,
        /// Sprint name, for sprint snapshots
        #[arg(long)]
        sprint: Option<String>,
        /// GitHub activity JSON file
        #[arg(long)]
        github: PathBuf,
        /// Jira activity JSON file
        #[arg(long)]
        jira: Option<PathBuf>,
        /// Print the recorded snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare the latest snapshot with the one before it
    Trends {
        #[arg(long)]
        team: String,
        #[arg(long = "type", default_value = "weekly")]
        snapshot_type: SnapshotType,
        /// Print insights as JSON
        #[arg(long)]
        json: bool,
    },

    /// List recorded snapshots, newest first
    History {
        #[arg(long)]
        team: String,
        #[arg(long = "type", default_value = "weekly")]
        snapshot_type: SnapshotType,
        /// Number of snapshots to show
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Show the per-member breakdown of the latest snapshot
    Members {
        #[arg(long)]
        team: String,
        #[arg(long = "type", default_value = "weekly")]
        snapshot_type: SnapshotType,
    },

    /// Print the resolved thresholds
    Thresholds,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init => cmd_init(),
        Commands::Snapshot {
            team,
            snapshot_type,
            start,
            end,
            sprint,
            github,
            jira,
            json,
        } => cmd_snapshot(
            &SnapshotArgs {
                team: &team,
                snapshot_type,
                start,
                end,
                sprint: sprint.as_deref(),
                github: &github,
                jira: jira.as_deref(),
            },
            json,
        ),
        Commands::Trends {
            team,
            snapshot_type,
            json,
        } => cmd_trends(&team, snapshot_type, json),
        Commands::History {
            team,
            snapshot_type,
            limit,
        } => cmd_history(&team, snapshot_type, limit),
        Commands::Members {
            team,
            snapshot_type,
        } => cmd_members(&team, snapshot_type),
        Commands::Thresholds => cmd_thresholds(),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

/// Log to stderr, filtered by `RUST_LOG` when set
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_db(config: &Config) -> Result<MetricsDb> {
    MetricsDb::open(&config.database_path())
}

fn cmd_init() -> Result<()> {
    let path = Config::config_file();
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }

    let config = Config {
        database_path: None,
        thresholds: ThresholdOverrides::from(DEFAULT_THRESHOLDS),
    };
    config.save().context("Failed to save config")?;
    println!("Config written to {}", path.display());
    Ok(())
}

struct SnapshotArgs<'a> {
    team: &'a str,
    snapshot_type: SnapshotType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    sprint: Option<&'a str>,
    github: &'a Path,
    jira: Option<&'a Path>,
}

fn cmd_snapshot(args: &SnapshotArgs<'_>, json: bool) -> Result<()> {
    if args.end <= args.start {
        anyhow::bail!("Period end must be after period start");
    }

    let config = Config::load()?;
    let db = open_db(&config)?;

    let github = GitHubActivity::load(args.github)?;
    let jira = args.jira.map(JiraActivity::load).transpose()?;

    let snapshot = build_snapshot(&SnapshotInput {
        team_name: args.team,
        snapshot_type: args.snapshot_type,
        period_start: args.start,
        period_end: args.end,
        sprint_name: args.sprint,
        github: &github,
        jira: jira.as_ref(),
    });

    let (stored, members) = db.append_with_members(&snapshot, |id| {
        build_member_snapshots(id, &github, jira.as_ref())
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stored)?);
        return Ok(());
    }

    println!(
        "Recorded {} snapshot #{} for {} ({} members)",
        stored.snapshot.snapshot_type,
        stored.id,
        stored.snapshot.team_name,
        members.len()
    );
    println!();
    print_snapshot(&stored.snapshot);
    Ok(())
}

fn cmd_trends(team: &str, snapshot_type: SnapshotType, json: bool) -> Result<()> {
    let config = Config::load()?;
    let db = open_db(&config)?;

    let Some(current) = db.latest(team, snapshot_type)? else {
        anyhow::bail!("No {snapshot_type} snapshots recorded for {team}");
    };
    let previous = db.most_recent_previous(team, snapshot_type, current.snapshot.period_start)?;

    let thresholds = config.thresholds();
    let insights = analyze(
        &current.snapshot,
        previous.as_ref().map(|p| &p.snapshot),
        Some(&thresholds),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&insights)?);
        return Ok(());
    }

    if previous.is_none() {
        println!("No earlier {snapshot_type} snapshot for {team} to compare against.");
        return Ok(());
    }
    if insights.is_empty() {
        println!("No notable changes for {team}.");
        return Ok(());
    }

    println!("{:<8}  {:<16}  {:>8}  {}", "SEVERITY", "METRIC", "CHANGE", "DETAIL");
    println!("{:<8}  {:<16}  {:>8}  {}", "--------", "------", "------", "------");
    for insight in &insights {
        println!(
            "{:<8}  {:<16}  {:>7}%  {} {}",
            insight.severity.as_str(),
            insight.metric,
            insight.change_percent,
            insight.direction.symbol(),
            insight.message
        );
    }

    Ok(())
}

fn cmd_history(team: &str, snapshot_type: SnapshotType, limit: u32) -> Result<()> {
    let config = Config::load()?;
    let db = open_db(&config)?;

    let history = db.history(team, snapshot_type, limit)?;
    if history.is_empty() {
        println!("No {snapshot_type} snapshots recorded for {team}.");
        return Ok(());
    }

    println!(
        "{:<6}  {:<10}  {:<10}  {:>7}  {:>6}  {:>5}  {:>7}  {:>8}  {:>5}",
        "ID", "START", "END", "COMMITS", "MERGED", "OPEN", "REVIEWS", "MERGE_H", "JIRA"
    );
    for stored in &history {
        let s = &stored.snapshot;
        let m = &s.metrics;
        println!(
            "{:<6}  {:<10}  {:<10}  {:>7}  {:>6}  {:>5}  {:>7}  {:>8}  {:>4}%",
            stored.id,
            s.period_start.format("%Y-%m-%d"),
            s.period_end.format("%Y-%m-%d"),
            m.total_commits,
            m.prs_merged,
            m.prs_open,
            m.total_reviews,
            format_hours(m.avg_merge_time_h),
            m.jira_completion_pct
        );
    }

    Ok(())
}

fn cmd_members(team: &str, snapshot_type: SnapshotType) -> Result<()> {
    let config = Config::load()?;
    let db = open_db(&config)?;

    let Some(current) = db.latest(team, snapshot_type)? else {
        anyhow::bail!("No {snapshot_type} snapshots recorded for {team}");
    };
    let members = db.members(current.id)?;
    if members.is_empty() {
        println!("No member activity recorded for snapshot #{}.", current.id);
        return Ok(());
    }

    println!(
        "{:<24}  {:>7}  {:>4}  {:>6}  {:>7}  {:>15}  {:>8}",
        "MEMBER", "COMMITS", "PRS", "MERGED", "REVIEWS", "LINES", "MERGE_H"
    );
    for member in &members {
        let m = &member.metrics;
        let lines = format!("+{}/-{}", m.total_additions, m.total_deletions);
        println!(
            "{:<24}  {:>7}  {:>4}  {:>6}  {:>7}  {:>15}  {:>8}",
            member.member,
            m.total_commits,
            m.total_prs,
            m.prs_merged,
            m.total_reviews,
            lines,
            format_hours(m.avg_merge_time_h)
        );
    }

    Ok(())
}

fn cmd_thresholds() -> Result<()> {
    let config = Config::load()?;
    print!("{}", toml::to_string_pretty(&config.thresholds())?);
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot) {
    let m = &snapshot.metrics;
    println!("  Team:            {}", snapshot.team_name);
    println!(
        "  Period:          {} to {}",
        snapshot.period_start.to_rfc3339(),
        snapshot.period_end.to_rfc3339()
    );
    if let Some(sprint) = &snapshot.sprint_name {
        println!("  Sprint:          {sprint}");
    }
    println!("  Commits:         {}", m.total_commits);
    println!(
        "  Pull requests:   {} ({} merged, {} open)",
        m.total_prs, m.prs_merged, m.prs_open
    );
    println!(
        "  Lines:           +{}/-{}",
        m.total_additions, m.total_deletions
    );
    println!("  Reviews:         {}", m.total_reviews);
    println!("  Avg merge time:  {}", format_hours(m.avg_merge_time_h));
    println!(
        "  Jira:            {}/{} done ({}%)",
        m.jira_completed, m.jira_total, m.jira_completion_pct
    );
}

fn format_hours(hours: Option<f64>) -> String {
    hours.map_or_else(|| "-".to_string(), |h| format!("{h:.1}h"))
}
