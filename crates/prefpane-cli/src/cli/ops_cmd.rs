use super::terminal::{Interrupt, confirm, terminal_sink, wait_for};
use super::*;

pub(super) fn handle_backup(ctx: &AppContext, args: BackupArgs) -> anyhow::Result<()> {
    backup_with(ctx, args, &Interrupt::register())
}

pub(super) fn backup_with(
    ctx: &AppContext,
    args: BackupArgs,
    interrupt: &Interrupt,
) -> anyhow::Result<()> {
    let queue = TaskQueue::new();
    let section = ctx.backup_section(&queue, ctx.backup_manager())?;
    let Some(parent) = args.dir.or_else(|| section.default_folder()) else {
        bail!("No backup folder given and none used before");
    };
    let controller = section.start_backup(&parent, terminal_sink(&queue), |_| {})?;
    let state = wait_for(&queue, &controller, interrupt);
    ctx.save()?;
    settle(&controller, state)
}

pub(super) fn handle_restore(ctx: &AppContext, args: RestoreArgs) -> anyhow::Result<()> {
    let queue = TaskQueue::new();
    let section = ctx.backup_section(&queue, ctx.backup_manager())?;
    let answer = confirm_restore(
        ctx,
        &section,
        &args,
        &mut io::stdin().lock(),
        &mut io::stdout(),
    )?;
    let Some(confirmed) = answer else {
        return Ok(());
    };
    run_restore(&queue, &section, confirmed, &Interrupt::register())
}

/// Asks before anything is overwritten unless `--yes` was given. A declined
/// restore only remembers the folder.
pub(super) fn confirm_restore(
    ctx: &AppContext,
    section: &BackupSection,
    args: &RestoreArgs,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> anyhow::Result<Option<ConfirmedRestore>> {
    let request = section.request_restore(&args.dir);
    if !args.yes {
        let accepted = confirm(&request.warning(), input, output).context("read confirmation")?;
        if !accepted {
            request.decline();
            ctx.save()?;
            writeln!(output, "Restore cancelled")?;
            return Ok(None);
        }
    }
    Ok(Some(request.confirm()))
}

/// Settings are not saved afterwards; that would overwrite what was just
/// restored.
pub(super) fn run_restore(
    queue: &TaskQueue,
    section: &BackupSection,
    confirmed: ConfirmedRestore,
    interrupt: &Interrupt,
) -> anyhow::Result<()> {
    let controller = section.start_restore(
        confirmed,
        terminal_sink(queue),
        |outcome: &OperationOutcome| {
            if *outcome == OperationOutcome::Completed {
                println!("Restart required to apply the restored configuration.");
            }
        },
    )?;
    let state = wait_for(queue, &controller, interrupt);
    settle(&controller, state)
}

pub(super) fn handle_auto_backup(ctx: &AppContext, args: AutoBackupArgs) -> anyhow::Result<()> {
    let manager = ctx.backup_manager();
    if args.if_due {
        if !ctx.store.bool_or(AUTO_ENABLE, false) {
            println!("Auto backup is not enabled");
            return Ok(());
        }
        if !manager.auto_backup_due(OffsetDateTime::now_utc()) {
            println!("Auto backup is not due yet");
            return Ok(());
        }
    }
    let queue = TaskQueue::new();
    let section = ctx.backup_section(&queue, manager)?;
    let controller = section.start_auto_backup(terminal_sink(&queue), |_| {})?;
    let state = wait_for(&queue, &controller, &Interrupt::register());
    ctx.save()?;
    settle(&controller, state)
}

pub(super) fn handle_proxy_test(ctx: &AppContext) -> anyhow::Result<()> {
    let queue = TaskQueue::new();
    let section = ctx.proxy_section(&queue)?;
    if section.test_target().is_none() {
        bail!("SOCKS test unavailable: enable the proxy and SOCKS, then set a valid host and port");
    }
    let controller = section.start_proxy_test(terminal_sink(&queue), |_| {})?;
    let state = wait_for(&queue, &controller, &Interrupt::register());
    settle(&controller, state)
}

/// Anything but a completed operation makes the command fail.
pub(super) fn settle(
    controller: &OperationController,
    state: OperationState,
) -> anyhow::Result<()> {
    if state == OperationState::Completed {
        return Ok(());
    }
    bail!(
        "{} {} ({})",
        controller.kind().label(),
        state,
        controller.target()
    )
}
