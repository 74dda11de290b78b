//! [`ProjectBoard`] backed by the GitHub GraphQL API through `octocrab`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use octocrab::Octocrab;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use tracing::debug;

use crate::{
    board::{
        FieldOption, FieldValue, ProjectBoard, ProjectField, ProjectMeta, ProjectMetaCache,
        ProjectRef,
    },
    github::setup_github_client,
    types::{
        FIELD_JIRA_EPIC, FIELD_JIRA_FEATURE, FIELD_JIRA_ISSUE, PrDetails, PrSet, PrState,
        PullRequest, canonical_pr_url, non_empty,
    },
};

const VIEWER_QUERY: &str = "query { viewer { login } }";

const ITEMS_QUERY: &str = r#"
    query($owner: String!, $number: Int!, $after: String) {
        repositoryOwner(login: $owner) {
            ... on ProjectV2Owner {
                projectV2(number: $number) {
                    items(first: 100, after: $after) {
                        nodes {
                            id
                            content {
                                __typename
                                ... on PullRequest {
                                    url
                                    title
                                    state
                                    author {
                                        login
                                    }
                                }
                            }
                            fieldValues(first: 30) {
                                nodes {
                                    ... on ProjectV2ItemFieldTextValue {
                                        text
                                        field {
                                            ... on ProjectV2FieldCommon {
                                                name
                                            }
                                        }
                                    }
                                }
                            }
                        }
                        pageInfo {
                            hasNextPage
                            endCursor
                        }
                    }
                }
            }
        }
    }
"#;

const META_QUERY: &str = r#"
    query($owner: String!, $number: Int!) {
        repositoryOwner(login: $owner) {
            ... on ProjectV2Owner {
                projectV2(number: $number) {
                    id
                    fields(first: 100) {
                        nodes {
                            ... on ProjectV2FieldCommon {
                                id
                                name
                            }
                            ... on ProjectV2SingleSelectField {
                                options {
                                    id
                                    name
                                }
                            }
                        }
                    }
                }
            }
        }
    }
"#;

const PR_QUERY: &str = r#"
    query($url: URI!) {
        resource(url: $url) {
            __typename
            ... on PullRequest {
                id
                title
                state
                author {
                    login
                }
            }
        }
    }
"#;

const ADD_MUTATION: &str = r#"
    mutation($project: ID!, $content: ID!) {
        addProjectV2ItemById(input: {projectId: $project, contentId: $content}) {
            item {
                id
            }
        }
    }
"#;

const DELETE_MUTATION: &str = r#"
    mutation($project: ID!, $item: ID!) {
        deleteProjectV2Item(input: {projectId: $project, itemId: $item}) {
            deletedItemId
        }
    }
"#;

const EDIT_MUTATION: &str = r#"
    mutation($project: ID!, $item: ID!, $field: ID!, $value: ProjectV2FieldValue!) {
        updateProjectV2ItemFieldValue(
            input: {projectId: $project, itemId: $item, fieldId: $field, value: $value}
        ) {
            projectV2Item {
                id
            }
        }
    }
"#;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T> {
        if !self.errors.is_empty() {
            let messages: Vec<_> = self.errors.into_iter().map(|e| e.message).collect();
            anyhow::bail!("GraphQL error: {}", messages.join("; "));
        }
        self.data.context("GraphQL response has no data")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Login {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ViewerData {
    viewer: Login,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerData<P> {
    repository_owner: Option<OwnerProject<P>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerProject<P> {
    project_v2: Option<P>,
}

impl<P> OwnerData<P> {
    fn into_project(self, project: &ProjectRef) -> Result<P> {
        self.repository_owner
            .and_then(|owner| owner.project_v2)
            .with_context(|| format!("GitHub project {project} not found"))
    }
}

#[derive(Debug, Deserialize)]
struct ProjectItems {
    items: ItemConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemConnection {
    nodes: Vec<ItemNode>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemNode {
    id: String,
    content: Option<PrContent>,
    field_values: FieldValueConnection,
}

#[derive(Debug, Deserialize)]
struct PrContent {
    #[serde(rename = "__typename")]
    typename: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    author: Option<Login>,
}

impl PrContent {
    fn details(&self) -> PrDetails {
        PrDetails {
            title: self.title.clone().unwrap_or_default(),
            author: self
                .author
                .as_ref()
                .map(|a| a.login.clone())
                .unwrap_or_default(),
            state: self
                .state
                .as_deref()
                .map(PrState::parse)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FieldValueConnection {
    nodes: Vec<FieldValueNode>,
}

#[derive(Debug, Deserialize)]
struct FieldValueNode {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    field: Option<FieldNameNode>,
}

#[derive(Debug, Deserialize)]
struct FieldNameNode {
    #[serde(default)]
    name: Option<String>,
}

impl ItemNode {
    fn text_value(&self, field: &str) -> Option<String> {
        let value = self
            .field_values
            .nodes
            .iter()
            .find(|node| {
                node.field
                    .as_ref()
                    .and_then(|f| f.name.as_deref())
                    .is_some_and(|name| name.eq_ignore_ascii_case(field))
            })
            .and_then(|node| node.text.as_deref());
        non_empty(value)
    }

    fn into_pull_request(self) -> Option<PullRequest> {
        let content = self.content.as_ref()?;
        if content.typename != "PullRequest" {
            return None;
        }
        let url = canonical_pr_url(content.url.as_deref()?);
        let details = content.details();

        Some(PullRequest {
            title: details.title,
            author: details.author,
            state: details.state,
            jira_feature: self.text_value(FIELD_JIRA_FEATURE),
            jira_epic: self.text_value(FIELD_JIRA_EPIC),
            jira_issue: self.text_value(FIELD_JIRA_ISSUE),
            item_id: Some(self.id.clone()),
            ..PullRequest::new(url)
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProjectFields {
    id: String,
    fields: FieldConnection,
}

#[derive(Debug, Deserialize)]
struct FieldConnection {
    nodes: Vec<FieldNode>,
}

#[derive(Debug, Deserialize)]
struct FieldNode {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    options: Vec<OptionNode>,
}

#[derive(Debug, Deserialize)]
struct OptionNode {
    id: String,
    name: String,
}

impl From<ProjectFields> for ProjectMeta {
    fn from(project: ProjectFields) -> Self {
        ProjectMeta {
            project_id: project.id,
            fields: project
                .fields
                .nodes
                .into_iter()
                .filter_map(|node| {
                    Some(ProjectField {
                        id: node.id?,
                        name: node.name?,
                        options: node
                            .options
                            .into_iter()
                            .map(|o| FieldOption {
                                id: o.id,
                                name: o.name,
                            })
                            .collect(),
                    })
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResourceData {
    resource: Option<PrContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddData {
    add_project_v2_item_by_id: AddedItem,
}

#[derive(Debug, Deserialize)]
struct AddedItem {
    item: ItemId,
}

#[derive(Debug, Deserialize)]
struct ItemId {
    id: String,
}

/// Talks to GitHub directly instead of through the `gh` binary.
pub struct GraphQlBoard {
    octocrab: Octocrab,
    cache: ProjectMetaCache,
}

impl GraphQlBoard {
    pub fn new(token: &str) -> Result<Self> {
        Ok(Self::with_client(setup_github_client(token)?))
    }

    pub fn with_client(octocrab: Octocrab) -> Self {
        Self {
            octocrab,
            cache: ProjectMetaCache::new(),
        }
    }

    async fn query<T>(&self, query: &str, variables: serde_json::Value) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let payload = json!({ "query": query, "variables": variables });
        let response: Envelope<T> = self
            .octocrab
            .graphql(&payload)
            .await
            .context("GitHub GraphQL request failed")?;
        response.into_data()
    }

    async fn resource(&self, url: &str) -> Result<PrContent> {
        let data: ResourceData = self.query(PR_QUERY, json!({ "url": url })).await?;
        data.resource
            .filter(|r| r.typename == "PullRequest")
            .with_context(|| format!("{url} is not a pull request"))
    }

    async fn project_meta(&self, project: &ProjectRef) -> Result<std::sync::Arc<ProjectMeta>> {
        self.cache
            .get_or_fetch(project, || async {
                let data: OwnerData<ProjectFields> = self
                    .query(
                        META_QUERY,
                        json!({ "owner": project.owner, "number": project.number }),
                    )
                    .await?;
                Ok(data.into_project(project)?.into())
            })
            .await
    }
}

#[async_trait]
impl ProjectBoard for GraphQlBoard {
    async fn viewer_login(&self) -> Result<String> {
        let data: ViewerData = self.query(VIEWER_QUERY, json!({})).await?;
        Ok(data.viewer.login)
    }

    async fn fetch_items(&self, project: &ProjectRef) -> Result<PrSet> {
        let mut prs = PrSet::new();
        let mut after: Option<String> = None;

        loop {
            let data: OwnerData<ProjectItems> = self
                .query(
                    ITEMS_QUERY,
                    json!({ "owner": project.owner, "number": project.number, "after": after }),
                )
                .await
                .context("failed to fetch GitHub project items")?;
            let items = data.into_project(project)?.items;

            debug!(%project, page = items.nodes.len(), "fetched project items");
            for pr in items.nodes.into_iter().filter_map(ItemNode::into_pull_request) {
                prs.insert(pr.url.clone(), pr);
            }

            if !items.page_info.has_next_page || items.page_info.end_cursor.is_none() {
                break;
            }
            after = items.page_info.end_cursor;
        }

        Ok(prs)
    }

    async fn pr_details(&self, url: &str) -> Result<PrDetails> {
        Ok(self.resource(url).await?.details())
    }

    async fn add_item(&self, project: &ProjectRef, url: &str) -> Result<String> {
        let meta = self.project_meta(project).await?;
        let content_id = self
            .resource(url)
            .await?
            .id
            .with_context(|| format!("no node id for {url}"))?;

        let data: AddData = self
            .query(
                ADD_MUTATION,
                json!({ "project": meta.project_id, "content": content_id }),
            )
            .await
            .with_context(|| format!("failed to add PR {url} to project"))?;
        Ok(data.add_project_v2_item_by_id.item.id)
    }

    async fn remove_item(&self, project: &ProjectRef, item_id: &str) -> Result<()> {
        let meta = self.project_meta(project).await?;
        let _: serde_json::Value = self
            .query(
                DELETE_MUTATION,
                json!({ "project": meta.project_id, "item": item_id }),
            )
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
        let (field_id, value) = match value {
            FieldValue::Text(text) => (meta.field(field)?.id.as_str(), json!({ "text": text })),
            FieldValue::SingleSelect(option) => {
                let (field_id, option_id) = meta.option(field, option)?;
                (field_id, json!({ "singleSelectOptionId": option_id }))
            }
        };

        let _: serde_json::Value = self
            .query(
                EDIT_MUTATION,
                json!({
                    "project": meta.project_id,
                    "item": item_id,
                    "field": field_id,
                    "value": value,
                }),
            )
            .await
            .with_context(|| format!("failed to set '{field}' on item {item_id}"))?;
        Ok(())
    }
}
