use std::{
    collections::BTreeMap,
    fmt,
    io::{self, Write},
};

use crate::types::PullRequest;

const TITLE_WIDTH: usize = 60;
const UNPARSED_GROUP: &str = "(other)";

/// Shortens `title` to at most `max` characters, marking the cut with `...`.
pub fn truncate_title(title: &str, max: usize) -> String {
    if title.chars().count() <= max {
        return title.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = title.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Groups PRs by `owner/repo`, repositories in alphabetical order and PRs
/// by number within each.
pub fn group_by_repo(prs: &[PullRequest]) -> BTreeMap<String, Vec<&PullRequest>> {
    let mut groups: BTreeMap<String, Vec<&PullRequest>> = BTreeMap::new();
    for pr in prs {
        let key = pr
            .pr_ref()
            .map(|r| r.repo.to_string())
            .unwrap_or_else(|| UNPARSED_GROUP.to_string());
        groups.entry(key).or_default().push(pr);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|pr| (pr.pr_ref().map(|r| r.number), pr.url.clone()));
    }
    groups
}

fn format_pr_line(pr: &PullRequest) -> String {
    let number = pr
        .pr_ref()
        .map(|r| format!("#{}", r.number))
        .unwrap_or_default();
    let author = if pr.author.is_empty() { "-" } else { &pr.author };
    let title = truncate_title(&pr.title, TITLE_WIDTH);

    let line = format!(
        "    {:<7} {:<6} {:<16} {}",
        number,
        pr.state.as_str(),
        author,
        title
    );
    let line = line.trim_end().to_string();
    format!("{line}\n{:<12}{}", "", pr.url)
}

/// Writes `prs` under their repository headings.
pub fn write_grouped<W: Write>(out: &mut W, prs: &[PullRequest]) -> io::Result<()> {
    for (repo, group) in group_by_repo(prs) {
        writeln!(out, "  {repo}")?;
        for pr in group {
            writeln!(out, "{}", format_pr_line(pr))?;
        }
    }
    Ok(())
}

/// Progress output that goes silent in quiet mode.
pub struct Progress<W> {
    out: W,
    quiet: bool,
}

impl<W: Write> Progress<W> {
    pub fn new(out: W, quiet: bool) -> Self {
        Self { out, quiet }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn line(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.out.write_fmt(args)?;
        self.out.write_all(b"\n")
    }

    /// Writes without a trailing newline and flushes, for text that precedes
    /// an answer typed on the same line.
    pub fn partial(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.out.write_fmt(args)?;
        self.out.flush()
    }

    pub fn section(&mut self, heading: fmt::Arguments<'_>, prs: &[PullRequest]) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        writeln!(self.out)?;
        self.out.write_fmt(heading)?;
        writeln!(self.out)?;
        write_grouped(&mut self.out, prs)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
