//! jira2gh: keep a GitHub project board in step with the pull requests
//! linked from Jira issues.
//!
//! Walks the tracked Jira issues (Features, Epics and plain issues) for
//! remote links to GitHub pull requests, compares them with the items on a
//! GitHub project (v2), and adds or removes items after confirmation. The
//! board is reached either through the `gh` CLI or the GraphQL API.

pub mod board;
pub mod cli;
pub mod config;
pub mod display;
pub mod gh;
pub mod github;
pub mod graphql;
pub mod jira;
pub mod prompt;
pub mod reconcile;
pub mod sync;
pub mod types;

pub use board::{DryRun, FieldValue, ProjectBoard, ProjectMetaCache, ProjectRef};
pub use cli::{RunOptions, parse_args};
pub use config::{Backend, Config, ConfigError, Credentials, ProjectConfig};
pub use display::Progress;
pub use gh::GhCli;
pub use graphql::GraphQlBoard;
pub use jira::{JiraApi, JiraClient, collect_pull_requests};
pub use prompt::{Answer, Prompter};
pub use reconcile::{SyncPlan, plan};
pub use sync::{Outcome, run};
pub use types::{PrSet, PrState, PullRequest, Repo, RepoError};
