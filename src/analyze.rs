//! Branch analysis pipeline
//!
//! Validate settings, fetch the last recorded run, parse the current
//! coverage reports, diff the branch against the default branch, compare,
//! then hand the result to the configured notifier.

use anyhow::{Context, Result};
use std::path::Path;

use crate::compare::{self, ComparisonResult};
use crate::config::{self, Manifest, Precondition, Validated};
use crate::console;
use crate::coverage;
use crate::git::GitDiff;
use crate::notifications::{self, Notify, PendingNotifications};
use crate::snapshot::SnapshotStore;

/// Per-invocation inputs
#[derive(Debug, Clone, Default)]
pub struct AnalyzeRequest {
    pub branch: Option<String>,
    pub storage_url: Option<String>,
    pub notify_hook_url: Option<String>,
    pub notify_channel: Option<String>,
    pub api_key: Option<String>,
}

/// How a run ended. Every variant counts as a completed run.
#[derive(Debug)]
pub enum Outcome {
    /// A precondition was missing; nothing was fetched
    Halted(Precondition),
    /// A fetch, parse or git step failed; the error was logged
    Failed(anyhow::Error),
    Compared {
        result: ComparisonResult,
        notifications: PendingNotifications,
    },
}

impl Outcome {
    /// Wait for spawned notifiers, then report completion
    pub async fn settle(self) -> bool {
        if let Outcome::Compared { notifications, .. } = self {
            notifications.wait().await;
        }
        true
    }
}

async fn compare_branch<S: SnapshotStore>(
    manifest: &Manifest,
    checked: &Validated<'_>,
    workdir: &Path,
    repo: &GitDiff,
    store: &S,
) -> Result<ComparisonResult> {
    let last_run = store
        .fetch(&manifest.name)
        .await
        .context("Failed to fetch the last recorded run")?;

    let current_run = coverage::parse_locations(workdir, &checked.settings.locations)?;

    let summary = repo
        .summary(checked.default_branch, checked.branch)
        .with_context(|| format!("Failed to diff {} against {}", checked.branch, checked.default_branch))?;

    Ok(compare::compare(&summary.changed_basenames(), &last_run, &current_run))
}

/// Run the pipeline and report how it ended. Never returns an error.
pub async fn run_analysis<S: SnapshotStore>(
    manifest: &Manifest,
    request: &AnalyzeRequest,
    workdir: &Path,
    repo: &GitDiff,
    store: &S,
) -> Outcome {
    let checked = match config::validate(manifest, request.branch.as_deref(), request.storage_url.as_deref()) {
        Ok(checked) => checked,
        Err(reason) => {
            console::warn(reason);
            return Outcome::Halted(reason);
        }
    };

    let result = match compare_branch(manifest, &checked, workdir, repo, store).await {
        Ok(result) => result,
        Err(e) => {
            console::error(format!("ERROR {:#}", e));
            return Outcome::Failed(e);
        }
    };

    result.print_summary();

    let notify = Notify {
        project: &manifest.name,
        branch: checked.branch,
        api_key: request.api_key.as_deref(),
        hook_url: request.notify_hook_url.as_deref(),
        channel: request.notify_channel.as_deref(),
    };
    let notifications = notifications::dispatch(checked.settings, &result, &notify);

    Outcome::Compared { result, notifications }
}

/// Fire-and-forget entry point: notifiers keep running after this returns.
/// Always `true`; failures only show up in the log.
pub async fn analyze<S: SnapshotStore>(
    manifest: &Manifest,
    request: &AnalyzeRequest,
    workdir: &Path,
    repo: &GitDiff,
    store: &S,
) -> bool {
    run_analysis(manifest, request, workdir, repo, store).await;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GalaxySettings;
    use crate::git::test_repo::TestRepo;
    use crate::snapshot::{LastRun, Number, StoredFile, StoredTotals};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeStore {
        snapshot: Option<LastRun>,
        calls: AtomicUsize,
    }

    impl FakeStore {
        fn returning(snapshot: LastRun) -> Self {
            Self { snapshot: Some(snapshot), calls: AtomicUsize::new(0) }
        }

        fn failing() -> Self {
            Self { snapshot: None, calls: AtomicUsize::new(0) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SnapshotStore for FakeStore {
        async fn fetch(&self, _project: &str) -> Result<LastRun> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.snapshot
                .clone()
                .ok_or_else(|| anyhow::anyhow!("connection refused"))
        }
    }

    fn last_run() -> LastRun {
        LastRun {
            coverage: Some(StoredTotals { current: Number(70.0) }),
            files: Some(vec![StoredFile {
                file: "a.js".to_string(),
                lines: Number(80.0),
                branches: Number(0.0),
                functions: Number(0.0),
            }]),
        }
    }

    fn manifest(api: &str) -> Manifest {
        Manifest {
            name: "web-app".to_string(),
            galaxy: Some(GalaxySettings {
                locations: vec!["coverage/lcov.info".to_string()],
                default_branch: Some("main".to_string()),
                api: Some(api.to_string()),
                ..Default::default()
            }),
        }
    }

    fn request() -> AnalyzeRequest {
        AnalyzeRequest {
            branch: Some("feature".to_string()),
            storage_url: Some("galaxy.example.com".to_string()),
            api_key: Some("secret".to_string()),
            ..Default::default()
        }
    }

    /// main has a.js and README.md; feature changes a.js and adds b.js
    fn project() -> TestRepo {
        let repo = TestRepo::new();
        repo.commit("src/a.js", "one\n", "initial");
        repo.commit("README.md", "readme\n", "docs");
        repo.checkout_new_branch("feature");
        repo.commit("src/a.js", "one\ntwo\n", "grow a");
        repo.commit("src/b.js", "b\n", "add b");
        repo.commit("README.md", "readme\nmore\n", "more docs");

        fs::create_dir_all(repo.path().join("coverage")).unwrap();
        fs::write(
            repo.path().join("coverage/lcov.info"),
            "SF:src/a.js\nLF:10\nLH:9\nend_of_record\nSF:src/b.js\nLF:2\nLH:1\nend_of_record\n",
        )
        .unwrap();

        repo
    }

    #[tokio::test]
    async fn test_compares_and_skips_invalid_api() {
        let repo = project();
        let store = FakeStore::returning(last_run());

        let outcome = run_analysis(&manifest("bitbucket"), &request(), repo.path(), &repo.git_diff(), &store).await;

        match outcome {
            Outcome::Compared { result, notifications } => {
                assert_eq!(result.coverage, "+13.33%");
                let files: Vec<(&str, &str)> = result
                    .files
                    .iter()
                    .map(|f| (f.name.as_str(), f.diff.as_str()))
                    .collect();
                assert_eq!(files, vec![("a.js", "+10.00%"), ("b.js", "+50%")]);
                assert!(notifications.is_empty());
            }
            other => panic!("expected a comparison, got {:?}", other),
        }
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_preconditions_halt() {
        let repo = project();
        let store = FakeStore::returning(last_run());
        let git = repo.git_diff();

        let mut no_galaxy = manifest("github");
        no_galaxy.galaxy = None;
        let outcome = run_analysis(&no_galaxy, &request(), repo.path(), &git, &store).await;
        assert!(matches!(outcome, Outcome::Halted(Precondition::MissingSettings)));

        let mut no_url = request();
        no_url.storage_url = None;
        let outcome = run_analysis(&manifest("github"), &no_url, repo.path(), &git, &store).await;
        assert!(matches!(outcome, Outcome::Halted(Precondition::MissingStorageUrl)));

        let mut no_branch = request();
        no_branch.branch = None;
        let outcome = run_analysis(&manifest("github"), &no_branch, repo.path(), &git, &store).await;
        assert!(matches!(outcome, Outcome::Halted(Precondition::MissingBranch)));

        let mut no_default = manifest("github");
        no_default.galaxy.as_mut().unwrap().default_branch = None;
        let outcome = run_analysis(&no_default, &request(), repo.path(), &git, &store).await;
        assert!(matches!(outcome, Outcome::Halted(Precondition::MissingDefaultBranch)));

        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_caught() {
        let repo = project();
        let store = FakeStore::failing();

        let outcome = run_analysis(&manifest("github"), &request(), repo.path(), &repo.git_diff(), &store).await;

        match outcome {
            Outcome::Failed(e) => assert!(format!("{:#}", e).contains("connection refused")),
            other => panic!("expected a failure, got {:?}", other),
        }
        assert!(analyze(&manifest("github"), &request(), repo.path(), &repo.git_diff(), &store).await);
    }

    #[tokio::test]
    async fn test_git_failure_is_caught() {
        let repo = project();
        let store = FakeStore::returning(last_run());
        let mut unknown_branch = request();
        unknown_branch.branch = Some("no-such-branch".to_string());

        let outcome = run_analysis(&manifest("github"), &unknown_branch, repo.path(), &repo.git_diff(), &store).await;
        assert!(matches!(outcome, Outcome::Failed(_)));
        assert!(outcome.settle().await);
    }

    #[tokio::test]
    async fn test_unrecorded_project() {
        let repo = project();
        let store = FakeStore::returning(LastRun::default());

        let outcome = run_analysis(&manifest("none"), &request(), repo.path(), &repo.git_diff(), &store).await;

        match outcome {
            Outcome::Compared { result, .. } => {
                assert_eq!(result.files[0].diff, "+90%");
                assert_eq!(result.files[1].diff, "+50%");
            }
            other => panic!("expected a comparison, got {:?}", other),
        }
    }
}
