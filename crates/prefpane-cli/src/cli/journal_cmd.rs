use super::*;

pub(super) fn handle_journal(ctx: &AppContext, args: JournalArgs) -> anyhow::Result<()> {
    let Some(journal) = &ctx.journal else {
        bail!("Operation journal is not available");
    };
    print!("{}", render_journal(journal, args.limit)?);
    Ok(())
}

/// Most recent journal lines, or a note naming the empty directory.
pub(super) fn render_journal(journal: &OperationJournal, limit: usize) -> anyhow::Result<String> {
    let lines = journal.tail(limit)?;
    if lines.is_empty() {
        return Ok(format!(
            "No operations recorded in {}\n",
            journal.base_dir().display()
        ));
    }
    Ok(lines.into_iter().map(|line| line + "\n").collect())
}
