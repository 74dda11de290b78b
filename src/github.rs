use anyhow::{Context, Result};
use octocrab::Octocrab;

/// Creates a GitHub client authenticated with a personal access token.
pub fn setup_github_client(token: &str) -> Result<Octocrab> {
    if token.trim().is_empty() {
        anyhow::bail!("GitHub token is empty");
    }
    Octocrab::builder()
        .personal_token(token.to_string())
        .build()
        .context("Failed to create GitHub client")
}
