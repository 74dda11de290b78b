use std::{collections::BTreeMap, fmt};

use thiserror::Error;

/// Board field holding the Jira Feature key.
pub const FIELD_JIRA_FEATURE: &str = "Jira Feature";
/// Board field holding the Jira Epic key.
pub const FIELD_JIRA_EPIC: &str = "Jira Epic";
/// Board field holding the Jira Issue key.
pub const FIELD_JIRA_ISSUE: &str = "Jira Issue";

/// Pull requests keyed by their canonical URL.
pub type PrSet = BTreeMap<String, PullRequest>;

#[derive(Debug, Error, PartialEq)]
pub enum RepoError {
    #[error("repository must be in format 'owner/repo', got '{0}'")]
    InvalidFormat(String),
    #[error("not a GitHub pull request URL: '{0}'")]
    InvalidUrl(String),
    #[error("invalid PR number in '{0}'")]
    InvalidNumber(String),
}

/// A GitHub repository identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Repo {
    pub owner: String,
    pub name: String,
}

impl Repo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, RepoError> {
        let owner = owner.into();
        let name = name.into();
        if owner.is_empty() || name.is_empty() || owner.contains('/') || name.contains('/') {
            return Err(RepoError::InvalidFormat(format!("{owner}/{name}")));
        }
        Ok(Self { owner, name })
    }

    /// Parses `owner/repo`.
    pub fn parse(s: &str) -> Result<Self, RepoError> {
        match s.trim().split_once('/') {
            Some((owner, name)) => {
                Self::new(owner, name).map_err(|_| RepoError::InvalidFormat(s.to_string()))
            }
            None => Err(RepoError::InvalidFormat(s.to_string())),
        }
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A single pull request within a repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrRef {
    pub repo: Repo,
    pub number: u64,
}

impl PrRef {
    /// Parses `https://github.com/<owner>/<repo>/pull/<number>`.
    pub fn from_url(url_str: &str) -> Result<Self, RepoError> {
        let url =
            url::Url::parse(url_str).map_err(|_| RepoError::InvalidUrl(url_str.to_string()))?;

        if url.host_str() != Some("github.com") {
            return Err(RepoError::InvalidUrl(url_str.to_string()));
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        // ["owner", "repo", "pull", "123", ...optional trailing "files" etc.]
        if segments.len() < 4 || segments[2] != "pull" {
            return Err(RepoError::InvalidUrl(url_str.to_string()));
        }

        let number = segments[3]
            .parse()
            .map_err(|_| RepoError::InvalidNumber(url_str.to_string()))?;

        Ok(Self {
            repo: Repo::new(segments[0], segments[1])?,
            number,
        })
    }

    /// Short form used by ignore rules: `owner/repo#123`.
    pub fn short(&self) -> String {
        format!("{}#{}", self.repo, self.number)
    }

    /// `https://github.com/<owner>/<repo>/pull/<number>`, the key PRs are
    /// compared by.
    pub fn canonical_url(&self) -> String {
        format!(
            "https://github.com/{}/{}/pull/{}",
            self.repo.owner, self.repo.name, self.number
        )
    }
}

/// Canonical form of a PR URL, or the URL unchanged when it does not parse.
pub fn canonical_pr_url(url: &str) -> String {
    PrRef::from_url(url)
        .map(|pr| pr.canonical_url())
        .unwrap_or_else(|_| url.to_string())
}

/// Whether a Jira remote-link URL points at a GitHub pull request.
pub fn is_pull_request_url(url: &str) -> bool {
    url.contains("github.com") && url.contains("/pull")
}

/// Lifecycle state of a pull request as reported by GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrState {
    Open,
    Closed,
    Merged,
    #[default]
    Unknown,
}

impl PrState {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "open" => PrState::Open,
            "closed" => PrState::Closed,
            "merged" => PrState::Merged,
            _ => PrState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrState::Open => "open",
            PrState::Closed => "closed",
            PrState::Merged => "merged",
            PrState::Unknown => "-",
        }
    }
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Jira issue types that change how the link graph is walked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueType {
    Feature,
    Epic,
    Other(String),
}

impl IssueType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "Feature" => IssueType::Feature,
            "Epic" => IssueType::Epic,
            other => IssueType::Other(other.to_string()),
        }
    }
}

/// Title, author and state of a PR as fetched from GitHub.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrDetails {
    pub title: String,
    pub author: String,
    pub state: PrState,
}

/// A pull request either discovered through Jira or read from the board.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullRequest {
    pub url: String,
    pub title: String,
    pub author: String,
    pub state: PrState,
    pub jira_feature: Option<String>,
    pub jira_epic: Option<String>,
    pub jira_issue: Option<String>,
    /// Project item id; only present once the PR is on the board.
    pub item_id: Option<String>,
}

impl PullRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Board text fields describing where this PR came from in Jira.
    pub fn metadata(&self) -> Vec<(&'static str, &str)> {
        [
            (FIELD_JIRA_FEATURE, &self.jira_feature),
            (FIELD_JIRA_EPIC, &self.jira_epic),
            (FIELD_JIRA_ISSUE, &self.jira_issue),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.as_deref().map(|v| (field, v)))
        .collect()
    }

    pub fn pr_ref(&self) -> Option<PrRef> {
        PrRef::from_url(&self.url).ok()
    }

    pub fn apply_details(&mut self, details: PrDetails) {
        if !details.title.is_empty() {
            self.title = details.title;
        }
        self.author = details.author;
        self.state = details.state;
    }
}

/// Treats empty strings from Jira or the board as absent.
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl fmt::Display for PullRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let epic = self.jira_epic.as_deref().unwrap_or("");
        let issue = self.jira_issue.as_deref().unwrap_or("");
        match &self.jira_feature {
            Some(feature) => write!(
                f,
                "Feature: {feature:<20} Epic: {epic:<20} Issue: {issue:<20} URL: {}",
                self.url
            ),
            None => write!(f, "Epic: {epic:<20} Issue: {issue:<20} URL: {}", self.url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pr_url() {
        let pr = PrRef::from_url("https://github.com/acme/widget/pull/10").unwrap();
        assert_eq!(pr.repo, Repo::new("acme", "widget").unwrap());
        assert_eq!(pr.number, 10);
        assert_eq!(pr.short(), "acme/widget#10");
    }

    #[test]
    fn test_parse_pr_url_with_trailing_segments() {
        let pr = PrRef::from_url("https://github.com/acme/widget/pull/10/files").unwrap();
        assert_eq!(pr.number, 10);
    }

    #[test]
    fn test_parse_pr_url_rejects_other_hosts_and_issues() {
        assert!(PrRef::from_url("https://gitlab.com/acme/widget/pull/10").is_err());
        assert!(PrRef::from_url("https://github.com/acme/widget/issues/10").is_err());
        assert_eq!(
            PrRef::from_url("https://github.com/acme/widget/pull/abc"),
            Err(RepoError::InvalidNumber(
                "https://github.com/acme/widget/pull/abc".to_string()
            ))
        );
    }

    #[test]
    fn test_canonical_url_drops_suffixes() {
        for url in [
            "https://github.com/acme/widget/pull/10",
            "https://github.com/acme/widget/pull/10/",
            "https://github.com/acme/widget/pull/10/files",
            "https://github.com/acme/widget/pull/10#discussion_r1",
            "http://github.com/acme/widget/pull/10?w=1",
        ] {
            assert_eq!(
                canonical_pr_url(url),
                "https://github.com/acme/widget/pull/10",
                "{url}"
            );
        }
        assert_eq!(
            canonical_pr_url("https://github.com/acme/widget/pull/abc"),
            "https://github.com/acme/widget/pull/abc"
        );
    }

    #[test]
    fn test_repo_parse() {
        assert_eq!(Repo::parse("o/r").unwrap().to_string(), "o/r");
        assert!(Repo::parse("o").is_err());
        assert!(Repo::parse("/r").is_err());
        assert!(Repo::parse("o/r/x").is_err());
    }

    #[test]
    fn test_is_pull_request_url() {
        assert!(is_pull_request_url("https://github.com/o/r/pull/1"));
        assert!(!is_pull_request_url("https://github.com/o/r/issues/1"));
        assert!(!is_pull_request_url("https://example.com/pull/1"));
    }

    #[test]
    fn test_metadata_skips_empty_fields() {
        let pr = PullRequest {
            jira_epic: Some("EPIC-1".to_string()),
            jira_issue: Some("ISS-1".to_string()),
            ..PullRequest::new("https://github.com/o/r/pull/1")
        };
        assert_eq!(
            pr.metadata(),
            vec![(FIELD_JIRA_EPIC, "EPIC-1"), (FIELD_JIRA_ISSUE, "ISS-1")]
        );
    }

    #[test]
    fn test_state_parse() {
        assert_eq!(PrState::parse("MERGED"), PrState::Merged);
        assert_eq!(PrState::parse("open"), PrState::Open);
        assert_eq!(PrState::parse("draft"), PrState::Unknown);
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  ")), None);
        assert_eq!(non_empty(Some("EPIC-1")), Some("EPIC-1".to_string()));
        assert_eq!(non_empty(None), None);
    }
}
