use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest names looked up in the project directory, in order
pub const MANIFEST_FILES: &[&str] = &["package.json", "galaxy.toml"];

/// Project manifest: the project name and its `galaxy` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub galaxy: Option<GalaxySettings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalaxySettings {
    /// Coverage report paths or glob patterns, relative to the project directory
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
    /// `github` or `gitlab`
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub gitlab_api_url: Option<String>,
    /// Numeric id or `group/project` path
    #[serde(default, deserialize_with = "string_or_number")]
    pub gitlab_project_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(i64),
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(|value| match value {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    }))
}

impl Manifest {
    /// Load a JSON manifest, or a TOML one when the extension is `.toml`
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let mut manifest: Manifest = if is_toml {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        };

        if let Some(settings) = manifest.galaxy.as_mut() {
            settings.expand_env();
        }

        Ok(manifest)
    }

    /// Find the first known manifest file in `dir`
    pub fn discover(dir: &Path) -> Result<PathBuf> {
        MANIFEST_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .with_context(|| {
                format!(
                    "No project manifest ({}) found in {}",
                    MANIFEST_FILES.join(", "),
                    dir.display()
                )
            })
    }
}

fn expand(value: &mut Option<String>) {
    if let Some(v) = value.as_mut() {
        if let Ok(expanded) = shellexpand::env(v.as_str()) {
            *v = expanded.into_owned();
        }
    }
}

impl GalaxySettings {
    /// Replace `$VAR` / `${VAR}` references; unknown variables are left untouched
    fn expand_env(&mut self) {
        expand(&mut self.default_branch);
        expand(&mut self.owner);
        expand(&mut self.repo);
        expand(&mut self.gitlab_api_url);
        expand(&mut self.gitlab_project_id);
        for location in &mut self.locations {
            if let Ok(expanded) = shellexpand::env(location.as_str()) {
                *location = expanded.into_owned();
            }
        }
    }

    pub fn default_branch(&self) -> Option<&str> {
        non_empty(self.default_branch.as_deref())
    }

    pub fn api(&self) -> Option<&str> {
        non_empty(self.api.as_deref())
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A missing precondition that stops the run before any work is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    MissingSettings,
    MissingStorageUrl,
    MissingBranch,
    MissingDefaultBranch,
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Precondition::MissingSettings => "\"galaxy\" section not present in the project manifest",
            Precondition::MissingStorageUrl => "storage url was not supplied",
            Precondition::MissingBranch => "branch was not supplied",
            Precondition::MissingDefaultBranch => "defaultBranch was not supplied",
        };
        write!(f, "{}. Please follow instructions inside README.md", message)
    }
}

/// Everything the pipeline needs, checked present
#[derive(Debug, Clone, Copy)]
pub struct Validated<'a> {
    pub settings: &'a GalaxySettings,
    pub storage_url: &'a str,
    pub branch: &'a str,
    pub default_branch: &'a str,
}

/// Check the preconditions in order: settings, storage url, branch, default branch
pub fn validate<'a>(
    manifest: &'a Manifest,
    branch: Option<&'a str>,
    storage_url: Option<&'a str>,
) -> std::result::Result<Validated<'a>, Precondition> {
    let settings = manifest.galaxy.as_ref().ok_or(Precondition::MissingSettings)?;
    let storage_url = non_empty(storage_url).ok_or(Precondition::MissingStorageUrl)?;
    let branch = non_empty(branch).ok_or(Precondition::MissingBranch)?;
    let default_branch = settings.default_branch().ok_or(Precondition::MissingDefaultBranch)?;

    Ok(Validated {
        settings,
        storage_url,
        branch,
        default_branch,
    })
}
