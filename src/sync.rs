//! One reconciliation run: for each configured project, fetch the board,
//! walk the tracked Jira issues, diff, confirm and apply.

use std::io::Write;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::{
    board::{FieldValue, ProjectBoard, ProjectRef},
    config::{Config, ProjectConfig},
    display::Progress,
    jira::{JiraApi, collect_pull_requests},
    prompt::{Answer, Prompter},
    reconcile::{self, SyncPlan},
    types::{PrSet, PullRequest},
};

/// Board field holding the workflow state of an item.
pub const FIELD_STATUS: &str = "Status";

const ADD_PROMPT: &str = "\nSync PRs to GitHub project? [Y/n/i(nteractive)] ";
const REMOVE_PROMPT: &str = "\nRemove PRs from GitHub project? [Y/n] ";

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every board already matched Jira.
    UpToDate,
    /// Quiet mode found changes and applied none of them.
    Pending,
    /// At least one change was applied.
    Applied,
    /// Changes were found but the user turned them down.
    Declined,
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Pending => 1,
            Outcome::UpToDate | Outcome::Applied | Outcome::Declined => 0,
        }
    }

    fn combine(self, other: Outcome) -> Outcome {
        use Outcome::*;
        match (self, other) {
            (Pending, _) | (_, Pending) => Pending,
            (Applied, _) | (_, Applied) => Applied,
            (Declined, _) | (_, Declined) => Declined,
            (UpToDate, UpToDate) => UpToDate,
        }
    }
}

/// Syncs every project in `config`, in order.
///
/// In quiet mode the run stops at the first project with pending changes.
/// Any error aborts the run; mutations already applied stay applied.
pub async fn run<J, B, P, W>(
    config: &Config,
    jira: &J,
    board: &B,
    prompter: &mut P,
    progress: &mut Progress<W>,
) -> Result<Outcome>
where
    J: JiraApi + Sync + ?Sized,
    B: ProjectBoard + Sync + ?Sized,
    P: Prompter + Send,
    W: Write,
{
    let mut outcome = Outcome::UpToDate;
    for project in &config.projects {
        let result = sync_project(project, jira, board, prompter, progress)
            .await
            .with_context(|| format!("failed to sync GitHub project {}", project.github_id))?;
        outcome = outcome.combine(result);
        if outcome == Outcome::Pending {
            break;
        }
    }
    Ok(outcome)
}

async fn resolve_project<B>(project: &ProjectConfig, board: &B) -> Result<ProjectRef>
where
    B: ProjectBoard + Sync + ?Sized,
{
    let number = project.number()?;
    let owner = match project.github_owner.trim() {
        "" => board
            .viewer_login()
            .await
            .context("failed to resolve GitHub owner from the authenticated user")?,
        owner => owner.to_string(),
    };
    Ok(ProjectRef::new(owner, number))
}

async fn collect_jira_prs<J, W>(
    project: &ProjectConfig,
    jira: &J,
    progress: &mut Progress<W>,
) -> Result<PrSet>
where
    J: JiraApi + Sync + ?Sized,
    W: Write,
{
    let mut prs = PrSet::new();
    for key in &project.jiras {
        progress.line(format_args!("Checking Jira issue {key}"))?;
        let found = collect_pull_requests(jira, key)
            .await
            .with_context(|| format!("failed to collect PRs for Jira issue {key}"))?;
        progress.line(format_args!("  => found {} PRs", found.len()))?;

        for (url, pr) in found {
            prs.entry(url).or_insert(pr);
        }
    }
    Ok(prs)
}

/// Syncs a single project board.
pub async fn sync_project<J, B, P, W>(
    project: &ProjectConfig,
    jira: &J,
    board: &B,
    prompter: &mut P,
    progress: &mut Progress<W>,
) -> Result<Outcome>
where
    J: JiraApi + Sync + ?Sized,
    B: ProjectBoard + Sync + ?Sized,
    P: Prompter + Send,
    W: Write,
{
    let project_ref = resolve_project(project, board).await?;

    let board_prs = board
        .fetch_items(&project_ref)
        .await
        .with_context(|| format!("failed to fetch items of GitHub project {project_ref}"))?;
    progress.line(format_args!(
        "Found {} PRs in GitHub project {project_ref}",
        board_prs.len()
    ))?;

    let jira_prs = collect_jira_prs(project, jira, progress).await?;

    let mut plan = reconcile::plan(&project_ref, project, &jira_prs, &board_prs);
    debug!(
        project = %project_ref,
        add = plan.to_add.len(),
        remove = plan.to_remove.len(),
        "computed sync plan"
    );

    if plan.is_empty() {
        progress.line(format_args!(
            "\nGitHub project {project_ref} is up to date with Jira."
        ))?;
        return Ok(Outcome::UpToDate);
    }

    if progress.is_quiet() {
        return Ok(Outcome::Pending);
    }

    for pr in &mut plan.to_add {
        let details = board
            .pr_details(&pr.url)
            .await
            .with_context(|| format!("failed to fetch details of PR {}", pr.url))?;
        pr.apply_details(details);
    }
    // `gh project item-list` carries no author or state.
    for pr in plan.to_remove.iter_mut().filter(|pr| pr.author.is_empty()) {
        let details = board
            .pr_details(&pr.url)
            .await
            .with_context(|| format!("failed to fetch details of PR {}", pr.url))?;
        pr.apply_details(details);
    }

    report_plan(&project_ref, &plan, progress)?;
    apply_plan(&project_ref, project, &plan, board, prompter, progress).await
}

fn report_plan<W: Write>(
    project: &ProjectRef,
    plan: &SyncPlan,
    progress: &mut Progress<W>,
) -> Result<()> {
    if !plan.to_add.is_empty() {
        progress.section(
            format_args!(
                "{} PRs do not exist in GitHub project {project} yet:",
                plan.to_add.len()
            ),
            &plan.to_add,
        )?;
    }
    if !plan.to_remove.is_empty() {
        progress.section(
            format_args!(
                "{} PRs in GitHub project {project} are no longer linked from Jira:",
                plan.to_remove.len()
            ),
            &plan.to_remove,
        )?;
    }
    Ok(())
}

async fn apply_plan<B, P, W>(
    project_ref: &ProjectRef,
    project: &ProjectConfig,
    plan: &SyncPlan,
    board: &B,
    prompter: &mut P,
    progress: &mut Progress<W>,
) -> Result<Outcome>
where
    B: ProjectBoard + Sync + ?Sized,
    P: Prompter + Send,
    W: Write,
{
    let mut applied = 0;

    if !plan.to_add.is_empty() {
        match Answer::parse(&prompter.ask(ADD_PROMPT).await?) {
            Answer::Yes => {
                applied += add_prs(
                    project_ref,
                    project,
                    &plan.to_add,
                    board,
                    None::<&mut P>,
                    progress,
                )
                .await?;
            }
            Answer::Interactive => {
                applied += add_prs(
                    project_ref,
                    project,
                    &plan.to_add,
                    board,
                    Some(&mut *prompter),
                    progress,
                )
                .await?;
            }
            Answer::No | Answer::Quit => progress.line(format_args!("Skipping additions."))?,
        }
    }

    if !plan.to_remove.is_empty() {
        match Answer::parse(&prompter.ask(REMOVE_PROMPT).await?) {
            Answer::Yes => {
                applied += remove_prs(project_ref, &plan.to_remove, board, progress).await?;
            }
            _ => progress.line(format_args!("Skipping removals."))?,
        }
    }

    Ok(if applied > 0 {
        Outcome::Applied
    } else {
        Outcome::Declined
    })
}

/// Adds PRs to the board, asking about each one when `prompter` is given.
/// Returns how many were added.
async fn add_prs<B, P, W>(
    project_ref: &ProjectRef,
    project: &ProjectConfig,
    prs: &[PullRequest],
    board: &B,
    mut prompter: Option<&mut P>,
    progress: &mut Progress<W>,
) -> Result<usize>
where
    B: ProjectBoard + Sync + ?Sized,
    P: Prompter + Send,
    W: Write,
{
    progress.line(format_args!(
        "\nAdding {} PRs to GitHub project {project_ref}...",
        prs.len()
    ))?;

    let mut added = 0;
    for pr in prs {
        match prompter.as_deref_mut() {
            Some(prompter) => {
                let question = format!("  * {} (Y/n/q) ", pr.url);
                match Answer::parse(&prompter.ask(&question).await?) {
                    Answer::Yes => {
                        add_pr(project_ref, project, pr, board).await?;
                        progress.line(format_args!("  => added"))?;
                        added += 1;
                    }
                    Answer::Quit => {
                        progress.line(format_args!("Abort."))?;
                        break;
                    }
                    Answer::No | Answer::Interactive => {
                        progress.line(format_args!("  => skipped"))?;
                    }
                }
            }
            None => {
                progress.partial(format_args!("  * {} ... ", pr.url))?;
                add_pr(project_ref, project, pr, board).await?;
                progress.line(format_args!("ok"))?;
                added += 1;
            }
        }
    }
    Ok(added)
}

async fn add_pr<B>(
    project_ref: &ProjectRef,
    project: &ProjectConfig,
    pr: &PullRequest,
    board: &B,
) -> Result<()>
where
    B: ProjectBoard + Sync + ?Sized,
{
    let item_id = board
        .add_item(project_ref, &pr.url)
        .await
        .with_context(|| format!("failed to add PR {} to project", pr.url))?;

    for (field, value) in pr.metadata() {
        board
            .edit_item_field(project_ref, &item_id, field, &FieldValue::Text(value.to_string()))
            .await
            .with_context(|| format!("failed to set '{field}' on PR {}", pr.url))?;
    }

    if let Some(status) = &project.status {
        board
            .edit_item_field(
                project_ref,
                &item_id,
                FIELD_STATUS,
                &FieldValue::SingleSelect(status.clone()),
            )
            .await
            .with_context(|| format!("failed to set status on PR {}", pr.url))?;
    }

    info!(project = %project_ref, url = %pr.url, %item_id, "added PR to project");
    Ok(())
}

async fn remove_prs<B, W>(
    project_ref: &ProjectRef,
    prs: &[PullRequest],
    board: &B,
    progress: &mut Progress<W>,
) -> Result<usize>
where
    B: ProjectBoard + Sync + ?Sized,
    W: Write,
{
    progress.line(format_args!(
        "\nRemoving {} PRs from GitHub project {project_ref}...",
        prs.len()
    ))?;

    for pr in prs {
        let item_id = pr
            .item_id
            .as_deref()
            .with_context(|| format!("board entry for {} has no item id", pr.url))?;

        progress.partial(format_args!("  * {} ... ", pr.url))?;
        board
            .remove_item(project_ref, item_id)
            .await
            .with_context(|| format!("failed to remove PR {} from project", pr.url))?;
        progress.line(format_args!("removed"))?;

        info!(project = %project_ref, url = %pr.url, item_id, "removed PR from project");
    }
    Ok(prs.len())
}
