//! Jira access and the walk from a tracked issue down to its linked PRs.
//!
//! Features contain Epics and plain issues (`parent = KEY`), Epics contain
//! issues (`"Epic Link" = KEY`), and any of them may carry remote links to
//! GitHub pull requests. Every PR found is tagged with the issue it hangs
//! off, its nearest epic and, under a Feature, the feature itself.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, header};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::JiraConfig,
    types::{IssueType, PrSet, PullRequest, canonical_pr_url, is_pull_request_url, non_empty},
};

const SEARCH_PAGE_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum JiraError {
    #[error("unexpected status code {status} from {url}: {body}")]
    UnexpectedStatus {
        status: StatusCode,
        url: String,
        body: String,
    },
    #[error("invalid Jira host '{0}'")]
    InvalidHost(String),
}

/// Type and parent epic of a single issue.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueSummary {
    pub issue_type: IssueType,
    pub parent_epic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteLink {
    #[serde(default)]
    pub id: u64,
    pub object: RemoteLinkObject,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteLinkObject {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// The three Jira REST calls the traversal needs.
#[async_trait]
pub trait JiraApi {
    async fn issue(&self, key: &str) -> Result<IssueSummary>;

    async fn remote_links(&self, key: &str) -> Result<Vec<RemoteLink>>;

    /// Keys of all issues matching a JQL query.
    async fn search_keys(&self, jql: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    fields: IssueFields,
}

#[derive(Debug, Deserialize)]
struct IssueFields {
    issuetype: IssueTypeField,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct IssueTypeField {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    start_at: usize,
    #[serde(default)]
    total: usize,
    issues: Vec<SearchIssue>,
}

#[derive(Debug, Deserialize)]
struct SearchIssue {
    key: String,
}

fn parse_issue(body: &[u8], epic_link_field: &str) -> Result<IssueSummary> {
    let response: IssueResponse =
        serde_json::from_slice(body).context("failed to parse issue response")?;

    let parent_epic = response
        .fields
        .other
        .get(epic_link_field)
        .and_then(serde_json::Value::as_str);

    Ok(IssueSummary {
        issue_type: IssueType::from_name(&response.fields.issuetype.name),
        parent_epic: non_empty(parent_epic),
    })
}

/// Bearer-authenticated client for the Jira REST API v2.
pub struct JiraClient {
    client: reqwest::Client,
    base: Url,
    token: String,
    epic_link_field: String,
}

impl JiraClient {
    pub fn new(config: &JiraConfig, token: impl Into<String>) -> Result<Self> {
        let base = Url::parse(config.host.trim())
            .map_err(|_| JiraError::InvalidHost(config.host.clone()))?;
        if base.cannot_be_a_base() {
            return Err(JiraError::InvalidHost(config.host.clone()).into());
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base,
            token: token.into(),
            epic_link_field: config.epic_link_field.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["rest", "api", "2"])
                .extend(segments);
        }
        url
    }

    async fn get(&self, url: Url) -> Result<Vec<u8>> {
        debug!(%url, "jira request");

        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.token)
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .with_context(|| format!("failed to send request to {url}"))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(JiraError::UnexpectedStatus {
                status,
                url: url.to_string(),
                body,
            }
            .into());
        }

        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed to read response body from {url}"))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl JiraApi for JiraClient {
    async fn issue(&self, key: &str) -> Result<IssueSummary> {
        let body = self.get(self.endpoint(&["issue", key])).await?;
        parse_issue(&body, &self.epic_link_field).with_context(|| format!("issue {key}"))
    }

    async fn remote_links(&self, key: &str) -> Result<Vec<RemoteLink>> {
        let body = self
            .get(self.endpoint(&["issue", key, "remotelink"]))
            .await?;
        serde_json::from_slice(&body)
            .with_context(|| format!("failed to parse remote links of {key}"))
    }

    async fn search_keys(&self, jql: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();

        loop {
            let mut url = self.endpoint(&["search"]);
            url.query_pairs_mut()
                .append_pair("jql", jql)
                .append_pair("fields", "key")
                .append_pair("startAt", &keys.len().to_string())
                .append_pair("maxResults", &SEARCH_PAGE_SIZE.to_string());

            let body = self.get(url).await?;
            let page: SearchResponse = serde_json::from_slice(&body)
                .with_context(|| format!("failed to parse search result for '{jql}'"))?;

            if page.start_at != keys.len() {
                warn!(
                    jql,
                    expected = keys.len(),
                    got = page.start_at,
                    "Jira ignored startAt; stopping pagination"
                );
                break;
            }

            let fetched = page.issues.len();
            keys.extend(page.issues.into_iter().map(|issue| issue.key));

            if fetched == 0 || page.start_at + fetched >= page.total {
                break;
            }
        }

        Ok(keys)
    }
}

fn epic_jql(epic: &str) -> String {
    format!("\"Epic Link\" = {epic}")
}

fn children_jql(parent: &str) -> String {
    format!("parent = {parent}")
}

/// Collects every PR reachable from `key`, tagged with its Jira ancestry.
pub async fn collect_pull_requests<J>(jira: &J, key: &str) -> Result<PrSet>
where
    J: JiraApi + ?Sized + Sync,
{
    let summary = jira.issue(key).await?;

    let mut feature = None;
    // (issue to scrape, nearest epic)
    let mut to_scrape: Vec<(String, Option<String>)> = Vec::new();

    match summary.issue_type {
        IssueType::Feature => {
            feature = Some(key.to_string());
            to_scrape.push((key.to_string(), None));

            for child in jira.search_keys(&children_jql(key)).await? {
                let child_summary = jira.issue(&child).await?;
                if child_summary.issue_type == IssueType::Epic {
                    let linked = jira.search_keys(&epic_jql(&child)).await?;
                    to_scrape.push((child.clone(), Some(child.clone())));
                    to_scrape.extend(linked.into_iter().map(|i| (i, Some(child.clone()))));
                } else {
                    to_scrape.push((child, child_summary.parent_epic));
                }
            }
        }
        IssueType::Epic => {
            let epic = Some(key.to_string());
            to_scrape.push((key.to_string(), epic.clone()));
            for issue in jira.search_keys(&epic_jql(key)).await? {
                to_scrape.push((issue, epic.clone()));
            }
        }
        IssueType::Other(_) => {
            to_scrape.push((key.to_string(), summary.parent_epic));
        }
    }

    debug!(key, issues = to_scrape.len(), "scraping remote links");

    let mut prs = PrSet::new();
    for (issue, epic) in to_scrape {
        for link in jira.remote_links(&issue).await? {
            if !is_pull_request_url(&link.object.url) {
                continue;
            }
            let url = canonical_pr_url(&link.object.url);
            prs.insert(
                url.clone(),
                PullRequest {
                    title: link.object.title,
                    jira_feature: feature.clone(),
                    jira_epic: epic.clone(),
                    jira_issue: Some(issue.clone()),
                    ..PullRequest::new(url)
                },
            );
        }
    }

    Ok(prs)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct FakeJira {
        issues: HashMap<String, IssueSummary>,
        links: HashMap<String, Vec<RemoteLink>>,
        searches: HashMap<String, Vec<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeJira {
        fn issue(mut self, key: &str, issue_type: &str, parent_epic: Option<&str>) -> Self {
            self.issues.insert(
                key.to_string(),
                IssueSummary {
                    issue_type: IssueType::from_name(issue_type),
                    parent_epic: parent_epic.map(str::to_string),
                },
            );
            self
        }

        fn link(mut self, key: &str, url: &str) -> Self {
            self.links.entry(key.to_string()).or_default().push(RemoteLink {
                id: 1,
                object: RemoteLinkObject {
                    url: url.to_string(),
                    title: format!("link from {key}"),
                },
            });
            self
        }

        fn search(mut self, jql: &str, keys: &[&str]) -> Self {
            self.searches.insert(
                jql.to_string(),
                keys.iter().map(|k| k.to_string()).collect(),
            );
            self
        }
    }

    #[async_trait]
    impl JiraApi for FakeJira {
        async fn issue(&self, key: &str) -> Result<IssueSummary> {
            self.calls.lock().unwrap().push(format!("issue {key}"));
            self.issues
                .get(key)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unexpected status code 404 for {key}"))
        }

        async fn remote_links(&self, key: &str) -> Result<Vec<RemoteLink>> {
            self.calls.lock().unwrap().push(format!("links {key}"));
            Ok(self.links.get(key).cloned().unwrap_or_default())
        }

        async fn search_keys(&self, jql: &str) -> Result<Vec<String>> {
            self.calls.lock().unwrap().push(format!("search {jql}"));
            Ok(self.searches.get(jql).cloned().unwrap_or_default())
        }
    }

    const PR10: &str = "https://github.com/acme/widget/pull/10";
    const PR11: &str = "https://github.com/acme/widget/pull/11";
    const PR12: &str = "https://github.com/acme/gadget/pull/12";
    const PR13: &str = "https://github.com/acme/gadget/pull/13";

    #[tokio::test]
    async fn test_epic_traversal() {
        let jira = FakeJira::default()
            .issue("EPIC-1", "Epic", None)
            .search("\"Epic Link\" = EPIC-1", &["ISS-1", "ISS-2"])
            .link("ISS-1", PR10)
            .link("ISS-2", "https://issues.example.com/browse/OTHER-1")
            .link("EPIC-1", PR11);

        let prs = collect_pull_requests(&jira, "EPIC-1").await.unwrap();

        assert_eq!(prs.len(), 2);
        let pr = &prs[PR10];
        assert_eq!(pr.jira_epic.as_deref(), Some("EPIC-1"));
        assert_eq!(pr.jira_issue.as_deref(), Some("ISS-1"));
        assert_eq!(pr.jira_feature, None);
        assert_eq!(pr.title, "link from ISS-1");
        assert_eq!(pr.item_id, None);

        let direct = &prs[PR11];
        assert_eq!(direct.jira_epic.as_deref(), Some("EPIC-1"));
        assert_eq!(direct.jira_issue.as_deref(), Some("EPIC-1"));
    }

    #[tokio::test]
    async fn test_feature_traversal_tags_nearest_epic() {
        let jira = FakeJira::default()
            .issue("FEAT-1", "Feature", None)
            .search("parent = FEAT-1", &["EPIC-1", "ISS-9"])
            .issue("EPIC-1", "Epic", None)
            .issue("ISS-9", "Story", Some("EPIC-7"))
            .search("\"Epic Link\" = EPIC-1", &["ISS-1"])
            .link("FEAT-1", PR10)
            .link("EPIC-1", PR11)
            .link("ISS-1", PR12)
            .link("ISS-9", PR13);

        let prs = collect_pull_requests(&jira, "FEAT-1").await.unwrap();

        assert_eq!(prs.len(), 4);
        assert!(
            prs.values()
                .all(|pr| pr.jira_feature.as_deref() == Some("FEAT-1"))
        );
        assert_eq!(prs[PR10].jira_epic, None);
        assert_eq!(prs[PR10].jira_issue.as_deref(), Some("FEAT-1"));
        assert_eq!(prs[PR11].jira_epic.as_deref(), Some("EPIC-1"));
        assert_eq!(prs[PR12].jira_epic.as_deref(), Some("EPIC-1"));
        assert_eq!(prs[PR12].jira_issue.as_deref(), Some("ISS-1"));
        assert_eq!(prs[PR13].jira_epic.as_deref(), Some("EPIC-7"));
    }

    #[tokio::test]
    async fn test_plain_issue_uses_parent_epic_field() {
        let jira = FakeJira::default()
            .issue("ISS-1", "Bug", Some("EPIC-3"))
            .link("ISS-1", PR10)
            .link("ISS-1", "https://github.com/acme/widget/issues/4");

        let prs = collect_pull_requests(&jira, "ISS-1").await.unwrap();

        assert_eq!(prs.len(), 1);
        assert_eq!(prs[PR10].jira_epic.as_deref(), Some("EPIC-3"));
        assert_eq!(
            *jira.calls.lock().unwrap(),
            vec!["issue ISS-1".to_string(), "links ISS-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_links_are_keyed_by_canonical_url() {
        let jira = FakeJira::default()
            .issue("ISS-1", "Bug", Some("EPIC-3"))
            .link("ISS-1", "https://github.com/acme/widget/pull/10/files")
            .link("ISS-1", "https://github.com/acme/widget/pull/11#discussion_r7");

        let prs = collect_pull_requests(&jira, "ISS-1").await.unwrap();

        assert_eq!(prs.keys().collect::<Vec<_>>(), vec![PR10, PR11]);
        assert_eq!(prs[PR10].url, PR10);
    }

    #[tokio::test]
    async fn test_fetch_error_aborts_traversal() {
        let jira = FakeJira::default()
            .issue("FEAT-1", "Feature", None)
            .search("parent = FEAT-1", &["MISSING-1"]);

        let err = collect_pull_requests(&jira, "FEAT-1").await.unwrap_err();
        assert!(err.to_string().contains("MISSING-1"));
        assert!(
            !jira
                .calls
                .lock()
                .unwrap()
                .iter()
                .any(|c| c.starts_with("links"))
        );
    }

    #[test]
    fn test_parse_issue_reads_epic_link_field() {
        let body = br#"{"key":"ISS-1","fields":{"issuetype":{"name":"Story"},"customfield_1":"EPIC-2"}}"#;
        let summary = parse_issue(body, "customfield_1").unwrap();
        assert_eq!(summary.issue_type, IssueType::Other("Story".to_string()));
        assert_eq!(summary.parent_epic.as_deref(), Some("EPIC-2"));

        let body = br#"{"fields":{"issuetype":{"name":"Epic"},"customfield_1":null}}"#;
        let summary = parse_issue(body, "customfield_1").unwrap();
        assert_eq!(summary.issue_type, IssueType::Epic);
        assert_eq!(summary.parent_epic, None);
    }

    #[test]
    fn test_parse_issue_rejects_malformed_json() {
        assert!(parse_issue(b"{\"fields\":{}}", "customfield_1").is_err());
        assert!(parse_issue(b"<html>", "customfield_1").is_err());
    }

    #[test]
    fn test_parse_remote_links() {
        let body = br#"[{"id":7,"self":"https://x/rest/api/2/issue/ISS-1/remotelink/7","object":{"url":"https://github.com/o/r/pull/1","title":"o/r#1"}}]"#;
        let links: Vec<RemoteLink> = serde_json::from_slice(body).unwrap();
        assert_eq!(links[0].id, 7);
        assert_eq!(links[0].object.url, "https://github.com/o/r/pull/1");
    }

    #[test]
    fn test_endpoint_keeps_host_path() {
        let client = JiraClient::new(&JiraConfig::new("https://jira.example.com/prefix/"), "t")
            .unwrap();
        assert_eq!(
            client.endpoint(&["issue", "ISS-1", "remotelink"]).as_str(),
            "https://jira.example.com/prefix/rest/api/2/issue/ISS-1/remotelink"
        );

        let client = JiraClient::new(&JiraConfig::new("https://jira.example.com"), "t").unwrap();
        assert_eq!(
            client.endpoint(&["search"]).as_str(),
            "https://jira.example.com/rest/api/2/search"
        );
    }

    #[test]
    fn test_invalid_host() {
        assert!(JiraClient::new(&JiraConfig::new("not a url"), "t").is_err());
    }
}
