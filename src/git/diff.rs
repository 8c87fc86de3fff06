//! Git diff summary between two branches

use anyhow::{Context, Result};
use git2::{DiffOptions, Patch, Repository, Tree};
use serde::Serialize;
use std::path::Path;

/// One changed path in a diff summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffFile {
    pub file: String,
    pub insertions: usize,
    pub deletions: usize,
    pub binary: bool,
}

impl DiffFile {
    pub fn basename(&self) -> String {
        Path::new(&self.file)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.file.clone())
    }
}

/// Files that differ between two refs, with line counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub files: Vec<DiffFile>,
    pub insertions: usize,
    pub deletions: usize,
    pub changed: usize,
}

impl DiffSummary {
    /// File names of every changed path, in diff order
    pub fn changed_basenames(&self) -> Vec<String> {
        self.files.iter().map(DiffFile::basename).collect()
    }
}

/// Git diff operations
pub struct GitDiff {
    repo: Repository,
}

impl GitDiff {
    /// Open the repository containing the given path
    pub fn new(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .with_context(|| format!("Failed to find git repository at {}", path.display()))?;

        Ok(Self { repo })
    }

    pub fn from_repository(repo: Repository) -> Self {
        Self { repo }
    }

    /// Get the current branch name
    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = self.repo.head()?;
        if head.is_branch() {
            Ok(head.shorthand().map(|s| s.to_string()))
        } else {
            Ok(None)
        }
    }

    /// Resolve a branch to its tree, falling back to the `origin` remote
    /// for CI checkouts that only fetched the remote-tracking ref.
    fn tree_for(&self, name: &str) -> Result<Tree<'_>> {
        let obj = self
            .repo
            .revparse_single(name)
            .or_else(|_| self.repo.revparse_single(&format!("origin/{}", name)))
            .with_context(|| format!("Failed to resolve reference: {}", name))?;

        let tree = obj
            .peel_to_commit()
            .with_context(|| format!("Reference {} does not point to a commit", name))?
            .tree()?;

        Ok(tree)
    }

    /// Summarize files changed between `base` and `current`
    pub fn summary(&self, base: &str, current: &str) -> Result<DiffSummary> {
        let base_tree = self.tree_for(base)?;
        let current_tree = self.tree_for(current)?;

        let mut diff_opts = DiffOptions::new();
        let diff = self.repo.diff_tree_to_tree(
            Some(&base_tree),
            Some(&current_tree),
            Some(&mut diff_opts),
        )?;

        let mut summary = DiffSummary::default();

        for idx in 0..diff.deltas().len() {
            let Some(delta) = diff.get_delta(idx) else {
                continue;
            };

            let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) else {
                continue;
            };
            let file = path.to_string_lossy().to_string();

            // No patch is produced for binary content
            let (insertions, deletions, binary) = match Patch::from_diff(&diff, idx)? {
                Some(patch) => {
                    let (_, insertions, deletions) = patch.line_stats()?;
                    (insertions, deletions, false)
                }
                None => (0, 0, true),
            };

            summary.insertions += insertions;
            summary.deletions += deletions;
            summary.files.push(DiffFile {
                file,
                insertions,
                deletions,
                binary,
            });
        }

        summary.changed = summary.files.len();
        Ok(summary)
    }
}
