use chern_dite::DEFAULT_RUNNER;
use chern_store::Node;

use super::CommandTable;
use crate::{impressible, CommandError, Shell};

pub(super) fn register(table: &mut CommandTable) {
    table.add(
        "submit",
        "[runner]",
        "deposit and run everything at or below the current node",
        0..=1,
        submit,
    );
    table.add("kill", "", "stop the run of the current node", 0..=0, kill);
    table.add(
        "collect",
        "",
        "ask the runner to gather the outputs of the current node",
        0..=0,
        collect,
    );
    table.add(
        "display",
        "<file>",
        "print where an output file lives on the runner",
        1..=1,
        display,
    );
    table.add(
        "export",
        "<file> <destination>",
        "download an output file of the current node",
        2..=2,
        export,
    );
    table.add(
        "send",
        "<data directory>",
        "upload raw data for the current data task",
        1..=1,
        send,
    );
}

fn submit(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let node = shell.current_node()?;
    let runner = match (args.first(), &node) {
        (Some(runner), _) => runner.clone(),
        (None, Node::Task(task)) => task.default_runner()?,
        (None, _) => DEFAULT_RUNNER.to_string(),
    };
    let reply = shell.dispatcher()?.submit(&node, &runner)?;
    Ok(vec![reply])
}

fn kill(shell: &mut Shell, _: &[String]) -> Result<Vec<String>, CommandError> {
    let node = shell.current_node()?;
    Ok(vec![shell.dispatcher()?.kill(impressible(&node)?)?])
}

fn collect(shell: &mut Shell, _: &[String]) -> Result<Vec<String>, CommandError> {
    let node = shell.current_node()?;
    Ok(vec![shell.dispatcher()?.collect(impressible(&node)?)?])
}

fn display(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let node = shell.current_node()?;
    Ok(vec![shell
        .dispatcher()?
        .get_file(impressible(&node)?, &args[0])?])
}

fn export(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let node = shell.current_node()?;
    let mut destination = shell.local_path(&args[1])?;
    if destination.is_dir() {
        destination.push(&args[0]);
    }
    shell
        .dispatcher()?
        .export(impressible(&node)?, &args[0], &destination)?;
    Ok(vec![])
}

fn send(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let task = shell.current_task()?;
    let data_dir = shell.local_path(&args[0])?;
    shell.dispatcher()?.send(&task, &data_dir)?;
    Ok(vec![])
}
