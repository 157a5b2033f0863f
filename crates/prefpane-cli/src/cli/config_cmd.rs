use super::*;

pub(super) fn handle_config(ctx: &AppContext, args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommands::Get(args) => {
            println!("{}", describe(ctx, &args.key)?);
            Ok(())
        }
        ConfigCommands::Set(args) => {
            let value = set_value(ctx, &args.key, &args.value, args.kind.map(ParamKind::from))?;
            ctx.save()?;
            println!("{} = {value}", args.key);
            Ok(())
        }
        ConfigCommands::Unset(args) => {
            match ctx.store.remove(&args.key) {
                Some(_) => println!("{} removed", args.key),
                None => println!("{} was not set", args.key),
            }
            ctx.save()
        }
        ConfigCommands::List(args) => {
            let entries = ctx.store.entries();
            if args.json {
                let map: serde_json::Map<String, serde_json::Value> = entries
                    .into_iter()
                    .map(|(key, value)| Ok((key, serde_json::to_value(value)?)))
                    .collect::<Result<_, serde_json::Error>>()
                    .context("serialize settings")?;
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                for (key, value) in entries {
                    println!("{key} = {value} ({})", value.kind());
                }
            }
            Ok(())
        }
    }
}

/// Stored value, or the section default when nothing is stored.
pub(super) fn describe(ctx: &AppContext, key: &str) -> anyhow::Result<String> {
    if let Some(value) = ctx.store.get(key) {
        return Ok(value.to_string());
    }
    let queue = TaskQueue::new();
    let backup = ctx.backup_section(&queue, ctx.backup_manager())?;
    let proxy = ctx.proxy_section(&queue)?;
    let sections: [&dyn ConfigSection; 2] = [&backup, &proxy];
    Ok(sections
        .iter()
        .find_map(|section| section.parameters().get(key))
        .map(|param| format!("{} (default)", param.value()))
        .unwrap_or_else(|| "<unset>".to_string()))
}

/// Parses and stores `raw`. Keys a section declares are validated against
/// that parameter's kind and constraints.
pub(super) fn set_value(
    ctx: &AppContext,
    key: &str,
    raw: &str,
    kind: Option<ParamKind>,
) -> anyhow::Result<ParamValue> {
    let queue = TaskQueue::new();
    let backup = ctx.backup_section(&queue, ctx.backup_manager())?;
    let proxy = ctx.proxy_section(&queue)?;
    let sections: [&dyn ConfigSection; 2] = [&backup, &proxy];
    if let Some(param) = sections
        .iter()
        .find_map(|section| section.parameters().get(key))
    {
        let value = ParamValue::parse(param.kind(), raw)?;
        param
            .set_value(value.clone())
            .with_context(|| format!("set {key}"))?;
        return Ok(value);
    }
    let kind = kind
        .or_else(|| ctx.store.get(key).map(|value| value.kind()))
        .unwrap_or(ParamKind::Str);
    let value = ParamValue::parse(kind, raw)?;
    ctx.store.set(key, value.clone());
    Ok(value)
}
