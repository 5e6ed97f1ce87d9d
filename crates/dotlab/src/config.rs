//! Configuration loading: defaults, `.dotlab.yml`, and `${VAR}` expansion.
//!
//! Resolution order for any setting is flag (or its environment variable,
//! handled by clap) over config file over built-in default. The file itself
//! is searched as explicit `--config` path, then `./.dotlab.yml`, then
//! `~/.dotlab.yml`; having none is fine.

use dotlab_classify::Rules;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// GitLab connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitlabSection {
    pub url: String,
    pub token: String,
    pub project_id: String,
}

impl Default for GitlabSection {
    fn default() -> Self {
        Self {
            url: "https://gitlab.com".to_string(),
            token: String::new(),
            project_id: String::new(),
        }
    }
}

/// Rate limiting and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitSection {
    pub requests_per_second: f64,
    pub max_concurrent: usize,
    pub retry_max: u32,
    pub retry_initial_backoff_ms: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            max_concurrent: 5,
            retry_max: 3,
            retry_initial_backoff_ms: 1000,
        }
    }
}

/// A named deployment environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnvironmentEntry {
    /// Dotenv file synced into this environment.
    pub file: String,
    pub protected: bool,
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub gitlab: GitlabSection,
    pub rate_limit: RateLimitSection,
    pub environments: BTreeMap<String, EnvironmentEntry>,
    pub classify: Rules,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", path.display())]
    ExplicitNotFound { path: PathBuf },

    #[error("read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("gitlab token is required (set GITLAB_TOKEN, --token, or token in .dotlab.yml)")]
    MissingToken,

    #[error(
        "gitlab project id is required (set GITLAB_PROJECT_ID, --project, or project_id in .dotlab.yml)"
    )]
    MissingProject,
}

impl Config {
    /// Check that the fields every remote call needs are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gitlab.token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.gitlab.project_id.is_empty() {
            return Err(ConfigError::MissingProject);
        }
        Ok(())
    }
}

/// Load configuration: defaults, then the resolved YAML file, then `${VAR}`
/// expansion on connection fields.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    load_from(explicit, None)
}

/// Like [`load`], with an overridable search directory for tests.
pub(crate) fn load_from(
    explicit: Option<&Path>,
    search_dir: Option<&Path>,
) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(path) = resolve_config_path(explicit, search_dir)? {
        let data = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        cfg = serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse { path, source })?;
    }

    expand_env_refs(&mut cfg);
    Ok(cfg)
}

/// Resolve which config file to read.
///
/// An explicit path must exist; the automatic search (`search_dir` or cwd,
/// then home) finding nothing is not an error.
fn resolve_config_path(
    explicit: Option<&Path>,
    search_dir: Option<&Path>,
) -> Result<Option<PathBuf>, ConfigError> {
    const FILE_NAME: &str = ".dotlab.yml";

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::ExplicitNotFound {
                path: path.to_path_buf(),
            });
        }
        return Ok(Some(path.to_path_buf()));
    }

    let search_dir = match search_dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let local = search_dir.join(FILE_NAME);
    if local.exists() {
        return Ok(Some(local));
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(FILE_NAME);
        if home_config.exists() {
            return Ok(Some(home_config));
        }
    }

    Ok(None)
}

/// Replace `${VAR}` references with values from the process environment.
/// Unset variables expand to the empty string.
pub(crate) fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                out.push_str(&std::env::var(name).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn expand_env_refs(cfg: &mut Config) {
    cfg.gitlab.url = expand_env(&cfg.gitlab.url);
    cfg.gitlab.token = expand_env(&cfg.gitlab.token);
    cfg.gitlab.project_id = expand_env(&cfg.gitlab.project_id);
    for env in cfg.environments.values_mut() {
        env.file = expand_env(&env.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join(".dotlab.yml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_without_any_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_from(None, Some(dir.path())).unwrap();
        assert_eq!(cfg.gitlab.url, "https://gitlab.com");
        assert_eq!(cfg.rate_limit.requests_per_second, 10.0);
        assert_eq!(cfg.rate_limit.max_concurrent, 5);
        assert_eq!(cfg.rate_limit.retry_max, 3);
        assert_eq!(cfg.rate_limit.retry_initial_backoff_ms, 1000);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "gitlab:\n  url: https://gitlab.internal\n  token: glpat-abc\n  project_id: \"42\"\nrate_limit:\n  requests_per_second: 2.5\n  retry_max: 7\n",
        );
        let cfg = load_from(None, Some(dir.path())).unwrap();
        assert_eq!(cfg.gitlab.url, "https://gitlab.internal");
        assert_eq!(cfg.gitlab.token, "glpat-abc");
        assert_eq!(cfg.gitlab.project_id, "42");
        assert_eq!(cfg.rate_limit.requests_per_second, 2.5);
        assert_eq!(cfg.rate_limit.retry_max, 7);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.rate_limit.max_concurrent, 5);
    }

    #[test]
    fn environments_and_classify_sections_parse() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "environments:\n  production:\n    file: .env.production\n    protected: true\n  staging:\n    file: .env.staging\nclassify:\n  masked_patterns: [\"_CREDENTIAL\"]\n  file_exclude: [\"_NAME\"]\n",
        );
        let cfg = load_from(None, Some(dir.path())).unwrap();
        assert_eq!(cfg.environments.len(), 2);
        assert_eq!(cfg.environments["production"].file, ".env.production");
        assert!(cfg.environments["production"].protected);
        assert!(!cfg.environments["staging"].protected);
        assert_eq!(cfg.classify.masked_patterns, ["_CREDENTIAL"]);
        assert_eq!(cfg.classify.file_exclude, ["_NAME"]);
    }

    #[test]
    fn env_references_are_expanded() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("DOTLAB_TEST_EXPANSION_TOKEN", "expanded-token");
        write_config(
            dir.path(),
            "gitlab:\n  token: ${DOTLAB_TEST_EXPANSION_TOKEN}\n  project_id: \"1\"\nenvironments:\n  staging:\n    file: ${DOTLAB_TEST_EXPANSION_MISSING}/.env\n",
        );
        let cfg = load_from(None, Some(dir.path())).unwrap();
        assert_eq!(cfg.gitlab.token, "expanded-token");
        // Unset variables expand to empty.
        assert_eq!(cfg.environments["staging"].file, "/.env");
        std::env::remove_var("DOTLAB_TEST_EXPANSION_TOKEN");
    }

    #[test]
    fn expand_env_handles_unclosed_reference() {
        assert_eq!(expand_env("a${OPEN"), "a${OPEN");
        assert_eq!(expand_env("plain"), "plain");
    }

    #[test]
    fn explicit_path_must_exist() {
        let err = load_from(Some(Path::new("/nope/.dotlab.yml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::ExplicitNotFound { .. }));
    }

    #[test]
    fn explicit_path_is_used_directly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yml");
        std::fs::write(&path, "gitlab:\n  token: t\n  project_id: p\n").unwrap();
        let cfg = load_from(Some(&path), None).unwrap();
        assert_eq!(cfg.gitlab.token, "t");
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "gitlab: [not, a, mapping\n");
        let err = load_from(None, Some(dir.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn validate_requires_token_and_project() {
        let mut cfg = Config::default();
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingToken)));

        cfg.gitlab.token = "t".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingProject)));

        cfg.gitlab.project_id = "p".into();
        assert!(cfg.validate().is_ok());
    }
}
