use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{PrRef, Repo};

pub const JIRA_TOKEN_ENV: &str = "JIRA_API_TOKEN";
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Custom field carrying an issue's parent epic on issues.redhat.com.
pub const DEFAULT_EPIC_LINK_FIELD: &str = "customfield_12311140";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    MissingEnv(&'static str),
    #[error("no jiras provided")]
    NoJiras,
    #[error("--{0} is required when no --config file is given")]
    MissingFlag(&'static str),
    #[error("jira host is not configured")]
    MissingJiraHost,
    #[error("no projects configured")]
    NoProjects,
    #[error("invalid GitHub project number '{0}'")]
    InvalidProjectNumber(String),
    #[error("invalid ignore_repos entry: {0}")]
    InvalidIgnoredRepo(String),
    #[error("invalid ignore_prs entry '{0}', expected 'owner/repo#number'")]
    InvalidIgnoredPr(String),
}

/// Tokens read from the environment before any remote call is made.
#[derive(Clone)]
pub struct Credentials {
    pub jira_token: String,
    pub github_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingEnv(name))
        };

        Ok(Self {
            jira_token: require(JIRA_TOKEN_ENV)?,
            github_token: require(GITHUB_TOKEN_ENV)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JiraConfig {
    pub host: String,
    #[serde(default = "default_epic_link_field")]
    pub epic_link_field: String,
}

fn default_epic_link_field() -> String {
    DEFAULT_EPIC_LINK_FIELD.to_string()
}

impl JiraConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            epic_link_field: default_epic_link_field(),
        }
    }
}

/// One GitHub project board and the Jira issues that feed it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project number as shown in the project URL.
    #[serde(deserialize_with = "string_or_number")]
    pub github_id: String,
    /// User or organisation owning the project; resolved from the
    /// authenticated user when empty.
    #[serde(default)]
    pub github_owner: String,
    pub jiras: Vec<String>,
    #[serde(default)]
    pub ignore_repos: Vec<String>,
    #[serde(default)]
    pub ignore_prs: Vec<String>,
    /// Status option set on newly added items.
    #[serde(default)]
    pub status: Option<String>,
}

impl ProjectConfig {
    pub fn number(&self) -> Result<u64, ConfigError> {
        self.github_id
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidProjectNumber(self.github_id.clone()))
    }

    pub fn tracks(&self, key: &str) -> bool {
        self.jiras.iter().any(|k| k == key)
    }

    /// Whether a PR URL belongs to an ignored repository or is itself ignored.
    fn check_ignore_rules(&self) -> Result<(), ConfigError> {
        for repo in &self.ignore_repos {
            Repo::parse(repo).map_err(|e| ConfigError::InvalidIgnoredRepo(e.to_string()))?;
        }
        for pr in &self.ignore_prs {
            let valid = pr.split_once('#').is_some_and(|(repo, number)| {
                Repo::parse(repo).is_ok() && number.parse::<u64>().is_ok()
            });
            if !valid {
                return Err(ConfigError::InvalidIgnoredPr(pr.clone()));
            }
        }
        Ok(())
    }

    pub fn should_ignore(&self, pr_url: &str) -> bool {
        // https://github.com/owner/repo/pull/123
        let parts: Vec<&str> = pr_url.split('/').collect();
        if parts.len() < 5 {
            return false;
        }

        let owner_repo = format!("{}/{}", parts[3], parts[4]);
        if self.ignore_repos.iter().any(|r| *r == owner_repo) {
            return true;
        }

        if self.ignore_prs.is_empty() {
            return false;
        }

        match PrRef::from_url(pr_url) {
            Ok(pr) => self.ignore_prs.iter().any(|p| *p == pr.short()),
            Err(_) => parts.len() >= 7 && {
                let id = format!("{}#{}", owner_repo, parts[6]);
                self.ignore_prs.iter().any(|p| *p == id)
            },
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        String(String),
        Number(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::String(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// Which `ProjectBoard` implementation talks to GitHub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Shell out to the `gh` CLI.
    #[default]
    Gh,
    /// Call the GitHub GraphQL API directly.
    Api,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub backend: Option<Backend>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub jira: JiraConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    pub projects: Vec<ProjectConfig>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&data)
            .with_context(|| format!("failed to parse YAML from {}", path.display()))
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jira.host.trim().is_empty() {
            return Err(ConfigError::MissingJiraHost);
        }
        if self.projects.is_empty() {
            return Err(ConfigError::NoProjects);
        }
        for project in &self.projects {
            if project.jiras.is_empty() {
                return Err(ConfigError::NoJiras);
            }
            project.number()?;
            project.check_ignore_rules()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const PR: &str = "https://github.com/o/r/pull/5";

    fn project() -> ProjectConfig {
        ProjectConfig {
            github_id: "7".to_string(),
            jiras: vec!["EPIC-1".to_string()],
            ..ProjectConfig::default()
        }
    }

    #[test]
    fn test_ignore_repo() {
        let mut proj = project();
        proj.ignore_repos = vec!["o/r".to_string()];
        assert!(proj.should_ignore(PR));

        proj.ignore_repos = vec!["o/other".to_string()];
        assert!(!proj.should_ignore(PR));
    }

    #[test]
    fn test_ignore_pr() {
        let mut proj = project();
        proj.ignore_prs = vec!["o/r#5".to_string()];
        assert!(proj.should_ignore(PR));

        proj.ignore_prs = vec!["o/r#6".to_string()];
        assert!(!proj.should_ignore(PR));
    }

    #[test]
    fn test_ignore_short_url_is_never_ignored() {
        let mut proj = project();
        proj.ignore_repos = vec!["o/r".to_string()];
        assert!(!proj.should_ignore("https://github.com"));
    }

    #[test]
    fn test_credentials_require_both_tokens() {
        let env: HashMap<&str, &str> = [(GITHUB_TOKEN_ENV, "gh")].into();
        let err = Credentials::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap_err();
        assert_eq!(err, ConfigError::MissingEnv(JIRA_TOKEN_ENV));

        let env: HashMap<&str, &str> = [(JIRA_TOKEN_ENV, "jira"), (GITHUB_TOKEN_ENV, "")].into();
        let err = Credentials::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap_err();
        assert_eq!(err, ConfigError::MissingEnv(GITHUB_TOKEN_ENV));

        let env: HashMap<&str, &str> = [(JIRA_TOKEN_ENV, "jira"), (GITHUB_TOKEN_ENV, "gh")].into();
        let creds = Credentials::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(creds.jira_token, "jira");
        assert!(!format!("{creds:?}").contains("jira"));
    }

    #[test]
    fn test_config_from_yaml() {
        let cfg = Config::from_yaml(
            r#"
jira:
  host: https://issues.example.com
projects:
  - github_id: "42"
    github_owner: acme
    jiras: [EPIC-1, FEAT-2]
    ignore_repos: [acme/docs]
    ignore_prs: ["acme/widget#7"]
    status: Todo
"#,
        )
        .unwrap();

        assert_eq!(cfg.jira.epic_link_field, DEFAULT_EPIC_LINK_FIELD);
        assert_eq!(cfg.github.backend, None);
        assert_eq!(cfg.projects.len(), 1);
        let proj = &cfg.projects[0];
        assert_eq!(proj.number().unwrap(), 42);
        assert!(proj.tracks("FEAT-2"));
        assert!(!proj.tracks("FEAT-3"));
        assert_eq!(proj.status.as_deref(), Some("Todo"));
        assert!(proj.should_ignore("https://github.com/acme/widget/pull/7"));
    }

    #[test]
    fn test_config_backend_and_numeric_id() {
        let cfg = Config::from_yaml(
            r#"
jira:
  host: https://issues.example.com
github:
  backend: api
projects:
  - github_id: 3
    jiras: [ISS-1]
"#,
        )
        .unwrap();
        assert_eq!(cfg.github.backend, Some(Backend::Api));
        assert_eq!(cfg.projects[0].github_id, "3");
        assert_eq!(cfg.projects[0].github_owner, "");
    }

    #[test]
    fn test_config_validation() {
        let err = Config::from_yaml("jira:\n  host: https://x\nprojects: []\n").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::NoProjects)
        );

        let err = Config::from_yaml(
            "jira:\n  host: https://x\nprojects:\n  - github_id: abc\n    jiras: [A-1]\n",
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::InvalidProjectNumber("abc".to_string()))
        );
    }

    #[test]
    fn test_config_rejects_malformed_ignore_rules() {
        let yaml = |rules: &str| {
            format!("jira:\n  host: https://x\nprojects:\n  - github_id: 1\n    jiras: [A-1]\n{rules}")
        };

        let err = Config::from_yaml(&yaml("    ignore_repos: [acme]\n")).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::InvalidIgnoredRepo(
                "repository must be in format 'owner/repo', got 'acme'".to_string()
            ))
        );

        for rule in ["acme/widget", "acme/widget#x", "widget#7"] {
            let err = Config::from_yaml(&yaml(&format!("    ignore_prs: [\"{rule}\"]\n")))
                .unwrap_err();
            assert_eq!(
                err.downcast_ref::<ConfigError>(),
                Some(&ConfigError::InvalidIgnoredPr(rule.to_string()))
            );
        }

        Config::from_yaml(&yaml(
            "    ignore_repos: [acme/docs]\n    ignore_prs: [\"acme/widget#7\"]\n",
        ))
        .unwrap();
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jira2gh.yaml");
        std::fs::write(
            &path,
            "jira:\n  host: https://x\nprojects:\n  - github_id: \"1\"\n    jiras: [A-1]\n",
        )
        .unwrap();
        let cfg = Config::from_file(&path).unwrap();
        assert_eq!(cfg.projects[0].jiras, vec!["A-1".to_string()]);

        let missing = Config::from_file(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(missing.to_string().contains("failed to read config file"));
    }
}
