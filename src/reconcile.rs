//! The diff between what Jira links and what the board holds.

use std::{cmp::Ordering, collections::HashSet};

use tracing::warn;

use crate::{
    board::ProjectRef,
    config::ProjectConfig,
    types::{PrSet, PullRequest, canonical_pr_url},
};

/// Changes needed to bring one board in line with Jira.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SyncPlan {
    /// PRs linked from Jira but missing from the board.
    pub to_add: Vec<PullRequest>,
    /// Board items for a tracked epic that Jira no longer links. Each has an
    /// item id.
    pub to_remove: Vec<PullRequest>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Computes additions and removals for `project`.
///
/// PRs on both sides are matched by canonical URL. Ignored repositories and
/// PRs are left out of both lists. Board items without a recorded epic are
/// never removed; they are counted and logged.
pub fn plan(
    project: &ProjectRef,
    config: &ProjectConfig,
    jira_prs: &PrSet,
    board_prs: &PrSet,
) -> SyncPlan {
    let on_board = canonical_urls(board_prs);
    let in_jira = canonical_urls(jira_prs);

    let mut to_add: Vec<PullRequest> = jira_prs
        .values()
        .filter(|pr| !on_board.contains(&canonical_pr_url(&pr.url)))
        .filter(|pr| !config.should_ignore(&pr.url))
        .cloned()
        .collect();

    let mut untracked = 0;
    let mut to_remove: Vec<PullRequest> = board_prs
        .values()
        .filter(|pr| match pr.jira_epic.as_deref() {
            Some(epic) => config.tracks(epic),
            None => {
                untracked += 1;
                false
            }
        })
        .filter(|pr| !in_jira.contains(&canonical_pr_url(&pr.url)))
        .filter(|pr| !config.should_ignore(&pr.url))
        .cloned()
        .collect();

    if untracked > 0 {
        warn!(
            %project,
            count = untracked,
            "board items have no Jira Epic and are never considered for removal"
        );
    }

    to_add.sort_by(compare_by_repo);
    to_remove.sort_by(compare_by_repo);

    SyncPlan { to_add, to_remove }
}

fn canonical_urls(prs: &PrSet) -> HashSet<String> {
    prs.values().map(|pr| canonical_pr_url(&pr.url)).collect()
}

/// Orders PRs by `owner/repo`, then PR number. URLs that do not parse sort
/// after the rest, by URL.
pub fn compare_by_repo(a: &PullRequest, b: &PullRequest) -> Ordering {
    match (a.pr_ref(), b.pr_ref()) {
        (Some(a), Some(b)) => a
            .repo
            .to_string()
            .cmp(&b.repo.to_string())
            .then(a.number.cmp(&b.number)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.url.cmp(&b.url),
    }
}
