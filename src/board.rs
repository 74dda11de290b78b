//! The GitHub project board as seen by the reconciler.
//!
//! [`ProjectBoard`] is implemented by [`crate::gh::GhCli`] (the `gh`
//! binary) and [`crate::graphql::GraphQlBoard`] (the GraphQL API). Both keep
//! project, field and option ids in a [`ProjectMetaCache`] so each project
//! is looked up at most once per process.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::types::{PrDetails, PrSet};

/// Owner and number of a GitHub project (v2).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectRef {
    pub owner: String,
    pub number: u64,
}

impl ProjectRef {
    pub fn new(owner: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            number,
        }
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.number)
    }
}

/// New value for a project item field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    /// Name of a single-select option, resolved to its id on write.
    SingleSelect(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) | FieldValue::SingleSelect(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldOption {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectField {
    pub id: String,
    pub name: String,
    pub options: Vec<FieldOption>,
}

/// Ids needed to edit items of one project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectMeta {
    pub project_id: String,
    pub fields: Vec<ProjectField>,
}

impl ProjectMeta {
    pub fn field(&self, name: &str) -> Result<&ProjectField> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| anyhow::anyhow!("project has no field named '{}'", name))
    }

    /// Resolves a field name and value to `(field id, option id)` when the
    /// value is a single-select option.
    pub fn option(&self, field_name: &str, option_name: &str) -> Result<(&str, &str)> {
        let field = self.field(field_name)?;
        let option = field
            .options
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(option_name))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "field '{}' has no option named '{}'",
                    field.name,
                    option_name
                )
            })?;
        Ok((&field.id, &option.id))
    }
}

/// Process-local cache of [`ProjectMeta`], keyed by project.
#[derive(Debug, Default)]
pub struct ProjectMetaCache {
    entries: Mutex<HashMap<ProjectRef, Arc<ProjectMeta>>>,
}

impl ProjectMetaCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, project: &ProjectRef) -> Option<Arc<ProjectMeta>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(project)
            .cloned()
    }

    /// Returns the cached metadata or runs `fetch` once to fill it.
    pub async fn get_or_fetch<F, Fut>(&self, project: &ProjectRef, fetch: F) -> Result<Arc<ProjectMeta>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ProjectMeta>>,
    {
        if let Some(meta) = self.lookup(project) {
            return Ok(meta);
        }

        let meta = Arc::new(fetch().await?);
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(project.clone(), Arc::clone(&meta));
        Ok(meta)
    }
}

/// Read and write access to a GitHub project board.
#[async_trait]
pub trait ProjectBoard {
    /// Login of the authenticated user.
    async fn viewer_login(&self) -> Result<String>;

    /// Current board contents, keyed by PR URL. Every entry has an item id.
    async fn fetch_items(&self, project: &ProjectRef) -> Result<PrSet>;

    async fn pr_details(&self, url: &str) -> Result<PrDetails>;

    /// Adds a PR to the board and returns the new item id.
    async fn add_item(&self, project: &ProjectRef, url: &str) -> Result<String>;

    async fn remove_item(&self, project: &ProjectRef, item_id: &str) -> Result<()>;

    async fn edit_item_field(
        &self,
        project: &ProjectRef,
        item_id: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<()>;
}

/// Item id handed out by [`DryRun::add_item`].
pub const DRY_RUN_ITEM_ID: &str = "dry-run";

/// Board wrapper that reads through to `inner` but never mutates it.
pub struct DryRun<B> {
    inner: B,
}

impl<B> DryRun<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B> ProjectBoard for DryRun<B>
where
    B: ProjectBoard + Send + Sync,
{
    async fn viewer_login(&self) -> Result<String> {
        self.inner.viewer_login().await
    }

    async fn fetch_items(&self, project: &ProjectRef) -> Result<PrSet> {
        self.inner.fetch_items(project).await
    }

    async fn pr_details(&self, url: &str) -> Result<PrDetails> {
        self.inner.pr_details(url).await
    }

    async fn add_item(&self, project: &ProjectRef, url: &str) -> Result<String> {
        info!(%project, url, "dry-run: skipping item-add");
        Ok(DRY_RUN_ITEM_ID.to_string())
    }

    async fn remove_item(&self, project: &ProjectRef, item_id: &str) -> Result<()> {
        info!(%project, item_id, "dry-run: skipping item-delete");
        Ok(())
    }

    async fn edit_item_field(
        &self,
        project: &ProjectRef,
        item_id: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<()> {
        info!(%project, item_id, field, %value, "dry-run: skipping item-edit");
        Ok(())
    }
}

#[async_trait]
impl<B> ProjectBoard for Box<B>
where
    B: ProjectBoard + Send + Sync + ?Sized,
{
    async fn viewer_login(&self) -> Result<String> {
        (**self).viewer_login().await
    }

    async fn fetch_items(&self, project: &ProjectRef) -> Result<PrSet> {
        (**self).fetch_items(project).await
    }

    async fn pr_details(&self, url: &str) -> Result<PrDetails> {
        (**self).pr_details(url).await
    }

    async fn add_item(&self, project: &ProjectRef, url: &str) -> Result<String> {
        (**self).add_item(project, url).await
    }

    async fn remove_item(&self, project: &ProjectRef, item_id: &str) -> Result<()> {
        (**self).remove_item(project, item_id).await
    }

    async fn edit_item_field(
        &self,
        project: &ProjectRef,
        item_id: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<()> {
        (**self).edit_item_field(project, item_id, field, value).await
    }
}
