//! [`ProjectBoard`] backed by the `gh` CLI.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::{
    board::{
        FieldOption, FieldValue, ProjectBoard, ProjectField, ProjectMeta, ProjectMetaCache,
        ProjectRef,
    },
    types::{
        FIELD_JIRA_EPIC, FIELD_JIRA_FEATURE, FIELD_JIRA_ISSUE, PrDetails, PrSet, PrState,
        PullRequest, canonical_pr_url, is_pull_request_url, non_empty,
    },
};

const ITEM_LIST_LIMIT: &str = "1000";

/// Runs `gh project ...` and `gh pr view` subprocesses.
pub struct GhCli {
    program: String,
    cache: ProjectMetaCache,
}

impl Default for GhCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GhCli {
    pub fn new() -> Self {
        Self::with_program("gh")
    }

    /// Uses a different executable in place of `gh`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            cache: ProjectMetaCache::new(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        debug!(program = %self.program, ?args, "running");

        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run {} {}", self.program, args.join(" ")))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} {} failed ({}): {}",
                self.program,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(output.stdout)
    }

    async fn project_meta(&self, project: &ProjectRef) -> Result<std::sync::Arc<ProjectMeta>> {
        self.cache
            .get_or_fetch(project, || async {
                let number = project.number.to_string();
                let view = self
                    .run(&[
                        "project", "view", &number, "--owner", &project.owner, "--format", "json",
                    ])
                    .await?;
                let fields = self
                    .run(&[
                        "project",
                        "field-list",
                        &number,
                        "--owner",
                        &project.owner,
                        "--format",
                        "json",
                    ])
                    .await?;
                parse_project_meta(&view, &fields)
            })
            .await
    }
}

#[derive(Debug, Deserialize)]
struct ItemList {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: Option<ItemContent>,
    /// Custom field values, keyed by a camel-cased field name.
    #[serde(flatten)]
    fields: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ItemContent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
}

impl Item {
    fn field_text(&self, name: &str) -> Option<String> {
        let wanted = normalise_field_name(name);
        let value = self
            .fields
            .iter()
            .find(|(key, _)| normalise_field_name(key) == wanted)
            .and_then(|(_, value)| value.as_str());
        non_empty(value)
    }
}

fn normalise_field_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn parse_item_list(body: &[u8]) -> Result<PrSet> {
    let list: ItemList =
        serde_json::from_slice(body).context("failed to parse GitHub project items")?;

    let mut prs = PrSet::new();
    for item in list.items {
        let Some(content) = &item.content else {
            continue;
        };
        let is_pr = content.kind == "PullRequest"
            || (content.kind.is_empty() && is_pull_request_url(&content.url));
        if !is_pr || content.url.is_empty() {
            continue;
        }

        let title = if content.title.is_empty() {
            item.title.clone()
        } else {
            content.title.clone()
        };

        let url = canonical_pr_url(&content.url);
        prs.insert(
            url.clone(),
            PullRequest {
                title,
                jira_feature: item.field_text(FIELD_JIRA_FEATURE),
                jira_epic: item.field_text(FIELD_JIRA_EPIC),
                jira_issue: item.field_text(FIELD_JIRA_ISSUE),
                item_id: Some(item.id.clone()),
                ..PullRequest::new(url)
            },
        );
    }

    Ok(prs)
}

#[derive(Debug, Deserialize)]
struct ProjectView {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FieldList {
    #[serde(default)]
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    id: String,
    name: String,
    #[serde(default)]
    options: Vec<RawOption>,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    id: String,
    name: String,
}

fn parse_project_meta(view: &[u8], fields: &[u8]) -> Result<ProjectMeta> {
    let view: ProjectView =
        serde_json::from_slice(view).context("failed to parse gh project view output")?;
    let fields: FieldList =
        serde_json::from_slice(fields).context("failed to parse gh project field-list output")?;

    Ok(ProjectMeta {
        project_id: view.id,
        fields: fields
            .fields
            .into_iter()
            .map(|f| ProjectField {
                id: f.id,
                name: f.name,
                options: f
                    .options
                    .into_iter()
                    .map(|o| FieldOption {
                        id: o.id,
                        name: o.name,
                    })
                    .collect(),
            })
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
struct PrView {
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: Option<PrAuthor>,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
struct PrAuthor {
    login: String,
}

fn parse_pr_view(body: &[u8]) -> Result<PrDetails> {
    let view: PrView = serde_json::from_slice(body).context("failed to parse gh pr view output")?;
    Ok(PrDetails {
        title: view.title,
        author: view.author.map(|a| a.login).unwrap_or_default(),
        state: PrState::parse(&view.state),
    })
}

#[derive(Debug, Deserialize)]
struct AddedItem {
    id: String,
}

#[async_trait]
impl ProjectBoard for GhCli {
    async fn viewer_login(&self) -> Result<String> {
        let output = self
            .run(&["api", "user", "--jq", ".login"])
            .await
            .context("failed to get GitHub user from gh CLI")?;
        let login = String::from_utf8(output)?.trim().to_string();
        if login.is_empty() {
            anyhow::bail!("GitHub CLI returned empty owner");
        }
        Ok(login)
    }

    async fn fetch_items(&self, project: &ProjectRef) -> Result<PrSet> {
        let number = project.number.to_string();
        let output = self
            .run(&[
                "project",
                "item-list",
                &number,
                "--owner",
                &project.owner,
                "--format",
                "json",
                "--limit",
                ITEM_LIST_LIMIT,
            ])
            .await
            .context("failed to fetch GitHub project items")?;
        parse_item_list(&output)
    }

    async fn pr_details(&self, url: &str) -> Result<PrDetails> {
        let output = self
            .run(&["pr", "view", url, "--json", "title,author,state"])
            .await?;
        parse_pr_view(&output).with_context(|| format!("PR {url}"))
    }

    async fn add_item(&self, project: &ProjectRef, url: &str) -> Result<String> {
        let number = project.number.to_string();
        let output = self
            .run(&[
                "project",
                "item-add",
                &number,
                "--owner",
                &project.owner,
                "--url",
                url,
                "--format",
                "json",
            ])
            .await
            .with_context(|| format!("failed to add PR {url} to project"))?;
        let added: AddedItem =
            serde_json::from_slice(&output).context("failed to parse gh project item-add output")?;
        Ok(added.id)
    }

    async fn remove_item(&self, project: &ProjectRef, item_id: &str) -> Result<()> {
        let number = project.number.to_string();
        self.run(&[
            "project",
            "item-delete",
            &number,
            "--owner",
            &project.owner,
            "--id",
            item_id,
        ])
        .await
        .with_context(|| format!("failed to remove item {item_id} from project"))?;
        Ok(())
    }

    async fn edit_item_field(
        &self,
        project: &ProjectRef,
        item_id: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<()> {
        let meta = self.project_meta(project).await?;
        let mut args: Vec<&str> = vec![
            "project",
            "item-edit",
            "--id",
            item_id,
            "--project-id",
            meta.project_id.as_str(),
        ];

        match value {
            FieldValue::Text(text) => {
                let field_id = meta.field(field)?.id.as_str();
                args.extend(["--field-id", field_id, "--text", text.as_str()]);
            }
            FieldValue::SingleSelect(option) => {
                let (field_id, option_id) = meta.option(field, option)?;
                args.extend(["--field-id", field_id, "--single-select-option-id", option_id]);
            }
        }

        self.run(&args)
            .await
            .with_context(|| format!("failed to set '{field}' on item {item_id}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_item_list() {
        let body = br#"{
            "items": [
                {
                    "id": "PVTI_1",
                    "title": "Fix widget",
                    "content": {"type": "PullRequest", "url": "https://github.com/acme/widget/pull/10", "title": "Fix widget", "number": 10, "repository": "acme/widget"},
                    "jira Epic": "EPIC-1",
                    "jira Issue": "ISS-1",
                    "jira Feature": "",
                    "status": "Todo"
                },
                {
                    "id": "PVTI_2",
                    "title": "Tracking issue",
                    "content": {"type": "Issue", "url": "https://github.com/acme/widget/issues/3"}
                },
                {
                    "id": "PVTI_3",
                    "title": "Draft note",
                    "content": {"type": "DraftIssue", "title": "Draft note"}
                }
            ],
            "totalCount": 3
        }"#;

        let prs = parse_item_list(body).unwrap();
        assert_eq!(prs.len(), 1);

        let pr = &prs["https://github.com/acme/widget/pull/10"];
        assert_eq!(pr.item_id.as_deref(), Some("PVTI_1"));
        assert_eq!(pr.title, "Fix widget");
        assert_eq!(pr.jira_epic.as_deref(), Some("EPIC-1"));
        assert_eq!(pr.jira_issue.as_deref(), Some("ISS-1"));
        assert_eq!(pr.jira_feature, None);
    }

    #[test]
    fn test_parse_item_list_canonicalises_urls() {
        let body = br#"{"items": [{"id": "PVTI_1", "content": {"type": "PullRequest", "url": "https://github.com/acme/widget/pull/10/"}}]}"#;

        let prs = parse_item_list(body).unwrap();
        let pr = &prs["https://github.com/acme/widget/pull/10"];
        assert_eq!(pr.url, "https://github.com/acme/widget/pull/10");
    }

    #[test]
    fn test_parse_item_list_rejects_garbage() {
        assert!(parse_item_list(b"not json").is_err());
        assert!(parse_item_list(b"{}").unwrap().is_empty());
    }

    #[test]
    fn test_field_names_match_regardless_of_case_and_spacing() {
        assert_eq!(normalise_field_name("Jira Epic"), "jiraepic");
        assert_eq!(normalise_field_name("jiraEpic"), "jiraepic");
    }

    #[test]
    fn test_parse_project_meta() {
        let view = br#"{"id": "PVT_kw", "number": 7, "title": "Migration"}"#;
        let fields = br#"{"fields": [
            {"id": "PVTF_1", "name": "Jira Epic", "type": "ProjectV2Field"},
            {"id": "PVTSSF_2", "name": "Status", "type": "ProjectV2SingleSelectField",
             "options": [{"id": "47fc9ee4", "name": "Todo"}, {"id": "98236657", "name": "Done"}]}
        ], "totalCount": 2}"#;

        let meta = parse_project_meta(view, fields).unwrap();
        assert_eq!(meta.project_id, "PVT_kw");
        assert_eq!(meta.field("Jira Epic").unwrap().id, "PVTF_1");
        assert_eq!(meta.option("Status", "Todo").unwrap(), ("PVTSSF_2", "47fc9ee4"));
    }

    #[test]
    fn test_parse_pr_view() {
        let details = parse_pr_view(
            br#"{"author": {"id": "U_1", "is_bot": false, "login": "alice", "name": "Alice"}, "state": "MERGED", "title": "Fix widget"}"#,
        )
        .unwrap();
        assert_eq!(details.author, "alice");
        assert_eq!(details.state, PrState::Merged);
        assert_eq!(details.title, "Fix widget");
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let gh = GhCli::with_program("/nonexistent/gh-binary");
        let err = gh
            .fetch_items(&ProjectRef::new("acme", 1))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed to run /nonexistent/gh-binary"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        // `false` ignores its arguments and exits 1.
        let gh = GhCli::with_program("false");
        let err = gh.viewer_login().await.unwrap_err();
        assert!(format!("{err:#}").contains("failed"));
    }
}
