use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::config::{Backend, Config, ConfigError, GitHubConfig, JiraConfig, ProjectConfig};

const BUILD_INFO_HUMAN: &str = env!("BUILD_INFO_HUMAN");

#[derive(Parser, Default, Debug)]
#[command(
    name = "jira2gh",
    about = "Sync pull requests linked from Jira issues to a GitHub project board"
)]
#[command(long_version = BUILD_INFO_HUMAN)]
pub struct CliArgs {
    /// Jira issues to track (Feature, Epic or plain issue keys)
    #[arg(value_name = "JIRA-KEY")]
    pub jiras: Vec<String>,

    /// YAML config file; when given, the project flags below are ignored
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Jira base URL, e.g. https://issues.redhat.com
    #[arg(long, value_name = "URL")]
    pub jira_host: Option<String>,

    /// GitHub project number
    #[arg(long = "github-project-id", value_name = "NUMBER")]
    pub github_project_id: Option<String>,

    /// User or organisation owning the project (defaults to the authenticated user)
    #[arg(long, value_name = "OWNER")]
    pub github_owner: Option<String>,

    /// Repositories never added or removed (comma-separated)
    #[arg(long, value_name = "OWNER/REPO", value_delimiter = ',')]
    pub ignore_repos: Vec<String>,

    /// Individual PRs never added or removed (comma-separated)
    #[arg(long, value_name = "OWNER/REPO#NUMBER", value_delimiter = ',')]
    pub ignore_prs: Vec<String>,

    /// Status option set on newly added items
    #[arg(long, value_name = "OPTION")]
    pub status: Option<String>,

    /// How to talk to GitHub
    #[arg(long, value_enum, value_name = "BACKEND")]
    pub backend: Option<Backend>,

    /// Print nothing; exit 1 if changes are pending, without applying them
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Show what would change without modifying the project
    #[arg(long)]
    pub dry_run: bool,
}

/// Settings that steer a run but are not part of the sync configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub quiet: bool,
    pub dry_run: bool,
    pub backend: Backend,
}

fn clean_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl CliArgs {
    /// Builds a single-project config from flags.
    pub fn to_config(&self) -> Result<Config, ConfigError> {
        let jiras = clean_list(&self.jiras);
        if jiras.is_empty() {
            return Err(ConfigError::NoJiras);
        }
        let host = non_blank(&self.jira_host).ok_or(ConfigError::MissingFlag("jira-host"))?;
        let github_id = non_blank(&self.github_project_id)
            .ok_or(ConfigError::MissingFlag("github-project-id"))?;

        let config = Config {
            jira: JiraConfig::new(host),
            github: GitHubConfig::default(),
            projects: vec![ProjectConfig {
                github_id,
                github_owner: non_blank(&self.github_owner).unwrap_or_default(),
                jiras,
                ignore_repos: clean_list(&self.ignore_repos),
                ignore_prs: clean_list(&self.ignore_prs),
                status: non_blank(&self.status),
            }],
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads the config file when one is given, otherwise builds the config
    /// from flags.
    pub fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::from_file(path),
            None => Ok(self.to_config()?),
        }
    }

    /// The `--backend` flag wins over the config file's `github.backend`.
    pub fn run_options(&self, config: &Config) -> RunOptions {
        RunOptions {
            quiet: self.quiet,
            dry_run: self.dry_run,
            backend: self
                .backend
                .or(config.github.backend)
                .unwrap_or_default(),
        }
    }
}

/// Parses command-line arguments and loads the resulting configuration.
///
/// Usage errors come back as [`clap::Error`] inside the `anyhow::Error` so
/// the caller can tell help and version requests apart from failures.
pub fn parse_args<I, T>(args: I) -> Result<(Config, RunOptions)>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = CliArgs::try_parse_from(args)?;
    let config = cli.load_config()?;
    let options = cli.run_options(&config);
    Ok((config, options))
}
