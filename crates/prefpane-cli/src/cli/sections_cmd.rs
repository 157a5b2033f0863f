use super::*;

pub(super) fn handle_sections(ctx: &AppContext) -> anyhow::Result<()> {
    let queue = TaskQueue::new();
    let backup = ctx.backup_section(&queue, ctx.backup_manager())?;
    let proxy = ctx.proxy_section(&queue)?;
    let sections: [&dyn ConfigSection; 2] = [&backup, &proxy];
    for section in sections {
        print!("{}", render_section(section));
    }
    let status = backup.status();
    println!("last backup: {}", status.last_time_text());
    if let Some(error) = status.last_error {
        println!("last backup error: {error}");
    }
    Ok(())
}

pub(super) fn render_section(section: &dyn ConfigSection) -> String {
    let mut out = format!("[{}]\n", section.name());
    for param in section.parameters().iter() {
        out.push_str(&format!(
            "  {} {} = {}\n",
            marker(param.is_enabled()),
            param.key(),
            param.value()
        ));
    }
    for control in section.controls() {
        out.push_str(&format!(
            "  {} <{}>\n",
            marker(control.is_enabled()),
            control.name()
        ));
    }
    out
}

fn marker(enabled: bool) -> char {
    if enabled { '+' } else { '-' }
}
