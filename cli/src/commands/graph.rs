use std::path::PathBuf;

use chern_store::doctor::doctor;
use chern_store::object::Container;
use chern_store::Node;

use super::CommandTable;
use crate::{not_a, CommandError, Shell};

pub(super) fn register(table: &mut CommandTable) {
    table.add("mkdir", "<path>", "create a directory", 1..=1, mkdir);
    table.add("create_task", "<path>", "create a task", 1..=1, create_task);
    table.add(
        "create_algorithm",
        "<path>",
        "create an algorithm",
        1..=1,
        create_algorithm,
    );
    table.add(
        "create_data",
        "<path>",
        "create a task holding raw data",
        1..=1,
        create_data,
    );
    table.add(
        "mv",
        "<path> <destination>",
        "move a node, keeping its impressions and arcs",
        2..=2,
        mv,
    );
    table.add(
        "cp",
        "<path> <destination>",
        "copy a node, keeping arcs within the copy",
        2..=2,
        cp,
    );
    table.add("rm", "<path>", "remove a node and its arcs", 1..=1, rm);
    table.add(
        "add_input",
        "<path> <alias>",
        "use the output of a task as an input of the current task",
        2..=2,
        add_input,
    );
    table.add(
        "remove_input",
        "<alias>",
        "drop an input of the current task",
        1..=1,
        remove_input,
    );
    table.add(
        "add_algorithm",
        "<path>",
        "set the algorithm of the current task",
        1..=1,
        add_algorithm,
    );
    table.add(
        "add_parameter",
        "<key> <value>",
        "set a parameter of the current task",
        2..=2,
        add_parameter,
    );
    table.add(
        "remove_parameter",
        "<key>",
        "drop a parameter of the current task",
        1..=1,
        remove_parameter,
    );
    table.add(
        "doctor",
        "[fix]",
        "find one-sided arcs and broken aliases below the current node, and repair them with fix",
        0..=1,
        run_doctor,
    );
}

/// The container a new node named by `arg` goes into, and the node's name.
fn parent_of(shell: &Shell, arg: &str) -> Result<(Node, String), CommandError> {
    let path = shell.resolve(arg)?;
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return Err(CommandError::Usage(format!("{} names no new node", arg)));
    };
    let parent = Node::open(shell.root()?, parent);
    if parent.as_container().is_none() {
        return Err(not_a(&parent, "directory"));
    }
    Ok((parent, name.to_string_lossy().into_owned()))
}

fn container(node: &Node) -> &dyn Container {
    node.as_container()
        .expect("Chern bug: parent_of returned a non-container")
}

fn mkdir(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let (parent, name) = parent_of(shell, &args[0])?;
    container(&parent).create_directory(&name)?;
    Ok(vec![])
}

fn create_task(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let (parent, name) = parent_of(shell, &args[0])?;
    container(&parent).create_task(&name)?;
    Ok(vec![])
}

fn create_algorithm(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let (parent, name) = parent_of(shell, &args[0])?;
    container(&parent).create_algorithm(&name)?;
    Ok(vec![])
}

fn create_data(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let (parent, name) = parent_of(shell, &args[0])?;
    container(&parent).create_data(&name)?;
    Ok(vec![])
}

/// The node to move or copy, and where it ends up. A destination that is an
/// existing directory receives the node under its current name.
fn source_and_destination(
    shell: &Shell,
    args: &[String],
) -> Result<(Node, PathBuf), CommandError> {
    let node = shell.node_at(&args[0])?;
    node.require_live()?;
    let mut destination = shell.resolve(&args[1])?;
    if Node::open(shell.root()?, &destination).as_container().is_some() {
        if let Some(name) = node.path().file_name() {
            destination.push(name);
        }
    }
    Ok((node, destination))
}

fn mv(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let (node, destination) = source_and_destination(shell, args)?;
    let moved = node.move_to(shell.session(), &destination)?;

    let cwd = shell.cwd()?.to_path_buf();
    if let Ok(below) = cwd.strip_prefix(node.path()) {
        shell.set_cwd(moved.path().join(below));
    }
    Ok(vec![])
}

fn cp(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let (node, destination) = source_and_destination(shell, args)?;
    node.copy_to(shell.session(), &destination)?;
    Ok(vec![])
}

fn rm(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let node = shell.node_at(&args[0])?;
    node.rm(shell.session())?;

    if shell.cwd()?.starts_with(node.path()) {
        if let Some(parent) = node.path().parent() {
            shell.set_cwd(parent.to_path_buf());
        }
    }
    Ok(vec![])
}

fn add_input(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let task = shell.current_task()?;
    let input = shell.node_at(&args[0])?;
    task.add_input(&input, &args[1])?;
    shell.session().graph_changed();
    Ok(vec![])
}

fn remove_input(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    shell.current_task()?.remove_input(&args[0])?;
    shell.session().graph_changed();
    Ok(vec![])
}

fn add_algorithm(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let task = shell.current_task()?;
    let algorithm = shell.node_at(&args[0])?;
    task.add_algorithm(&algorithm)?;
    shell.session().graph_changed();
    Ok(vec![])
}

fn add_parameter(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    shell.current_task()?.add_parameter(&args[0], &args[1])?;
    Ok(vec![])
}

fn remove_parameter(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    shell.current_task()?.remove_parameter(&args[0])?;
    Ok(vec![])
}

fn run_doctor(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let fix = match args.first().map(String::as_str) {
        None => false,
        Some("fix") => true,
        Some(_) => return Err(CommandError::Usage("doctor [fix]".into())),
    };
    let node = shell.current_node()?;
    let report = doctor(shell.session(), &node, |_| fix)?;
    if report.is_empty() {
        return Ok(vec!["no problems found".into()]);
    }
    Ok(report
        .into_iter()
        .map(|(finding, repaired)| {
            let verb = if repaired { "repaired" } else { "found" };
            format!("{}: {}", verb, finding)
        })
        .collect())
}
