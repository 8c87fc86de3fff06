use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::env;
use std::path::{Path, PathBuf};

use galaxy::config::GalaxySettings;
use galaxy::{coverage, run_analysis, AnalyzeRequest, GitDiff, HttpSnapshotStore, LastRun, Manifest};

/// CI variables holding the source branch of a pull/merge request
const BRANCH_ENV_VARS: &[&str] = &[
    "GITHUB_HEAD_REF",
    "CI_MERGE_REQUEST_SOURCE_BRANCH_NAME",
    "CI_COMMIT_REF_NAME",
];

#[derive(Parser)]
#[command(name = "galaxy")]
#[command(about = "Compare branch coverage with the last recorded run and comment on the pull/merge request")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the project manifest (default: package.json or galaxy.toml in --dir)
    #[arg(short, long, global = true)]
    manifest: Option<PathBuf>,

    /// Project directory holding the manifest, coverage reports and git checkout
    #[arg(short = 'C', long, global = true, default_value = ".")]
    dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the branch with the last recorded run and update the PR/MR
    Analyze {
        /// Branch to compare (default: CI variables, then the checked-out branch)
        #[arg(short, long)]
        branch: Option<String>,

        /// Host of the snapshot store (also GALAXY_STORAGE_URL)
        #[arg(long)]
        storage_url: Option<String>,

        /// Slack webhook for a summary message
        #[arg(long)]
        notify_hook_url: Option<String>,

        /// Slack channel for the summary message
        #[arg(long)]
        notify_channel: Option<String>,

        /// GitHub/GitLab token (also GALAXY_API_KEY, GITHUB_TOKEN or GITLAB_TOKEN)
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Print the coverage of the configured reports
    Coverage,

    /// Print the configured reports as a snapshot for the remote store
    Snapshot {
        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let dir = std::fs::canonicalize(&cli.dir)
        .with_context(|| format!("Could not find project directory: {}", cli.dir.display()))?;

    let manifest_path = match cli.manifest {
        Some(path) => path,
        None => Manifest::discover(&dir)?,
    };
    let manifest = Manifest::load(&manifest_path)
        .with_context(|| format!("Could not load {}", manifest_path.display()))?;

    match cli.command {
        Commands::Analyze {
            branch,
            storage_url,
            notify_hook_url,
            notify_channel,
            api_key,
        } => {
            let request = AnalyzeRequest {
                branch,
                storage_url: storage_url.or_else(|| env::var("GALAXY_STORAGE_URL").ok()),
                notify_hook_url,
                notify_channel,
                api_key,
            };
            cmd_analyze(&manifest, request, &dir)
        }
        Commands::Coverage => cmd_coverage(&manifest, &dir),
        Commands::Snapshot { pretty } => cmd_snapshot(&manifest, &dir, pretty),
    }
}

fn branch_from_env() -> Option<String> {
    BRANCH_ENV_VARS
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

fn api_key_from_env(manifest: &Manifest) -> Option<String> {
    let api = manifest.galaxy.as_ref().and_then(GalaxySettings::api);
    env::var("GALAXY_API_KEY").ok().or_else(|| match api {
        Some("github") => env::var("GITHUB_TOKEN").ok(),
        Some("gitlab") => env::var("GITLAB_TOKEN").ok(),
        _ => None,
    })
}

#[tokio::main]
async fn cmd_analyze(manifest: &Manifest, mut request: AnalyzeRequest, dir: &Path) -> Result<()> {
    let repo = GitDiff::new(dir)?;

    if request.branch.is_none() {
        request.branch = match branch_from_env() {
            Some(branch) => Some(branch),
            None => repo.current_branch().unwrap_or(None),
        };
    }
    if request.api_key.is_none() {
        request.api_key = api_key_from_env(manifest);
    }

    let store = HttpSnapshotStore::new(request.storage_url.as_deref().unwrap_or_default());

    let outcome = run_analysis(manifest, &request, dir, &repo, &store).await;
    outcome.settle().await;

    Ok(())
}

fn settings(manifest: &Manifest) -> Result<&GalaxySettings> {
    manifest
        .galaxy
        .as_ref()
        .context("\"galaxy\" section not present in the project manifest")
}

fn cmd_coverage(manifest: &Manifest, dir: &Path) -> Result<()> {
    let run = coverage::parse_locations(dir, &settings(manifest)?.locations)?;

    println!("\n{} {}\n", "📦".cyan(), manifest.name.bold());
    run.print_summary();

    Ok(())
}

fn cmd_snapshot(manifest: &Manifest, dir: &Path, pretty: bool) -> Result<()> {
    let run = coverage::parse_locations(dir, &settings(manifest)?.locations)?;
    let snapshot = LastRun::from(&run);

    let json = if pretty {
        serde_json::to_string_pretty(&snapshot)?
    } else {
        serde_json::to_string(&snapshot)?
    };
    println!("{}", json);

    Ok(())
}
