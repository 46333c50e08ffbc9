use chern_dite::UNCONNECTED_LIST;

use super::CommandTable;
use crate::{CommandError, Shell};

pub(super) fn register(table: &mut CommandTable) {
    table.add(
        "dite",
        "[serverurl]",
        "show whether DITE answers, or point the project at another one",
        0..=1,
        dite,
    );
    table.add("runners", "", "list runners registered with DITE", 0..=0, runners);
    table.add(
        "register_runner",
        "<name> <url> <secret>",
        "register a runner with DITE",
        3..=3,
        register_runner,
    );
    table.add(
        "remove_runner",
        "<name>",
        "unregister a runner",
        1..=1,
        remove_runner,
    );
}

fn dite(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let project = shell.project()?;
    if let Some(url) = args.first() {
        project.set_serverurl(url)?;
    }
    let status = shell.dispatcher()?.dite_status();
    Ok(vec![format!("DITE at {}: {}", project.serverurl()?, status)])
}

fn runners(shell: &mut Shell, _: &[String]) -> Result<Vec<String>, CommandError> {
    let dispatcher = shell.dispatcher()?;
    let names = dispatcher.runners();
    if names.first().map(String::as_str) == Some(UNCONNECTED_LIST) {
        return Ok(names);
    }
    let urls = dispatcher.runners_url();

    let mut lines = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let url = urls.get(i).map(String::as_str).unwrap_or("?");
        let connection = dispatcher.runner_connection(name);
        lines.push(format!("{}  {}  {}", name, url, connection));
    }
    if lines.is_empty() {
        lines.push("no runners registered".into());
    }
    Ok(lines)
}

fn register_runner(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let reply = shell
        .dispatcher()?
        .register_runner(&args[0], &args[1], &args[2])?;
    Ok(vec![reply])
}

fn remove_runner(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    shell.dispatcher()?.remove_runner(&args[0])?;
    Ok(vec![])
}
