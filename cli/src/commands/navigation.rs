use std::path::Path;

use chern_store::fsutil::tree_excluded;
use chern_store::object::{Algorithm, HasConfig, Project, Task};
use chern_store::Node;

use super::CommandTable;
use crate::{CommandError, Shell};

pub(super) fn register(table: &mut CommandTable) {
    table.add("pwd", "", "print the current node", 0..=0, pwd);
    table.add(
        "cd",
        "<path|index|@>",
        "move to another node, or to a child listed by ls",
        1..=1,
        cd,
    );
    table.add(
        "cd_project",
        "<name>",
        "switch to a registered project",
        1..=1,
        cd_project,
    );
    table.add("ls", "[path]", "describe a node and list its children", 0..=1, ls);
    table.add("ls_projects", "", "list registered projects", 0..=0, ls_projects);
    table.add(
        "status",
        "[path]",
        "local and run status of every task and algorithm below a node",
        0..=1,
        status,
    );
}

fn pwd(shell: &mut Shell, _: &[String]) -> Result<Vec<String>, CommandError> {
    Ok(vec![shell.display_path(shell.cwd()?)?])
}

fn cd(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let target = &args[0];
    let by_name = shell.resolve(target)?;
    let path = match target.parse::<usize>() {
        Ok(index) if !by_name.exists() => {
            let children = shell.current_node()?.sub_objects()?;
            children
                .get(index)
                .map(|child| child.path().to_path_buf())
                .ok_or_else(|| {
                    CommandError::Usage(format!("cd <index>, there is no child {}", index))
                })?
        }
        _ => by_name,
    };

    let node = Node::open(shell.root()?, &path);
    node.require_live()?;
    shell.set_cwd(path);
    Ok(vec![])
}

fn cd_project(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let local_config = shell.session().local_config();
    local_config.set_current_project(&args[0])?;
    let path = local_config
        .project_path(&args[0])?
        .ok_or(CommandError::NoProject)?;
    let project = Project::open(&path)?;
    shell.session().reset();
    shell.set_cwd(project.root().to_path_buf());
    Ok(vec![])
}

fn ls(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let node = match args.first() {
        Some(path) => shell.node_at(path)?,
        None => shell.current_node()?,
    };
    node.require_live()?;

    let object_type = node
        .object_type()
        .map_or_else(|| "zombie".to_string(), |t| t.to_string());
    let mut lines = vec![format!("{} ({})", shell.display(&node)?, object_type)];
    match &node {
        Node::Task(task) => describe_task(shell, task, &mut lines)?,
        Node::Algorithm(algorithm) => describe_algorithm(shell, algorithm, &mut lines)?,
        _ => {}
    }

    for (i, child) in node.sub_objects()?.iter().enumerate() {
        let name = child
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let object_type = child
            .object_type()
            .map_or_else(|| "zombie".to_string(), |t| t.to_string());
        lines.push(format!("  [{}] {} ({})", i, name, object_type));
    }
    Ok(lines)
}

/// Appends `title:` and the indented items, or `title: none`.
fn section(lines: &mut Vec<String>, title: &str, items: Vec<String>) {
    if items.is_empty() {
        lines.push(format!("{}: none", title));
    } else {
        lines.push(format!("{}:", title));
        lines.extend(items.into_iter().map(|item| format!("  {}", item)));
    }
}

fn files_of(path: &Path) -> Result<Vec<String>, CommandError> {
    Ok(tree_excluded(path)?
        .iter()
        .flat_map(|entry| entry.files().iter().map(|name| entry.member(name)))
        .collect())
}

fn describe_task(shell: &Shell, task: &Task, lines: &mut Vec<String>) -> Result<(), CommandError> {
    lines.push(format!("environment: {}", task.environment()?));
    if task.is_rawdata()? {
        let md5 = task.input_md5()?.unwrap_or_else(|| "none".into());
        lines.push(format!("input md5: {}", md5));
    } else {
        let algorithm = match task.algorithm()? {
            Some(algorithm) => shell.display_path(algorithm.path())?,
            None => "none".to_string(),
        };
        lines.push(format!("algorithm: {}", algorithm));
    }

    let mut inputs = Vec::new();
    for (alias, input) in task.inputs()? {
        inputs.push(format!("{}: {}", alias, shell.display(&input)?));
    }
    section(lines, "inputs", inputs);

    let parameters = task
        .parameters()?
        .into_iter()
        .map(|(key, value)| format!("{} = {}", key, value))
        .collect();
    section(lines, "parameters", parameters);
    section(lines, "files", files_of(task.path())?);
    Ok(())
}

fn describe_algorithm(
    shell: &Shell,
    algorithm: &Algorithm,
    lines: &mut Vec<String>,
) -> Result<(), CommandError> {
    lines.push(format!("environment: {}", algorithm.environment()?));
    section(lines, "commands", algorithm.commands()?);

    let mut users = Vec::new();
    for user in algorithm.users()? {
        users.push(shell.display_path(&shell.root()?.join(user))?);
    }
    section(lines, "used by", users);
    section(lines, "files", files_of(algorithm.path())?);
    Ok(())
}

fn ls_projects(shell: &mut Shell, _: &[String]) -> Result<Vec<String>, CommandError> {
    let local_config = shell.session().local_config();
    let current = local_config.current_project()?;
    Ok(local_config
        .projects()?
        .into_iter()
        .map(|(name, path)| {
            let marker = if current.as_deref() == Some(name.as_str()) {
                "*"
            } else {
                " "
            };
            format!("{} {}: {}", marker, name, path.display())
        })
        .collect())
}

fn status(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let node = match args.first() {
        Some(path) => shell.node_at(path)?,
        None => shell.current_node()?,
    };
    node.require_live()?;
    let dispatcher = shell.dispatcher()?;

    let mut lines = Vec::new();
    for node in node.sub_objects_recursively()? {
        let Some(impressible) = node.as_impressible() else {
            continue;
        };
        let local = shell.session().local_status(impressible)?;
        let run = dispatcher.run_status(&node)?;
        lines.push(format!("{}  {}  {}", shell.display(&node)?, local, run));
    }
    if lines.is_empty() {
        lines.push(format!(
            "no tasks or algorithms below {}",
            shell.display(&node)?
        ));
    }
    Ok(lines)
}
