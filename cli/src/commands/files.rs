use std::path::Path;
use std::process::Command;

use chern_store::fsutil::{normalize_within, README_FILE};
use chern_store::object::{import_file as import, move_file, rm_file as remove, HasConfig};

use super::CommandTable;
use crate::{impressible, CommandError, Shell};

/// Used when `$EDITOR` is unset.
const FALLBACK_EDITOR: &str = "vi";

pub(super) fn register(table: &mut CommandTable) {
    table.add(
        "import_file",
        "<source>",
        "copy a file or directory into the current task or algorithm",
        1..=1,
        import_file,
    );
    table.add(
        "rm_file",
        "<name>",
        "remove a file of the current task or algorithm",
        1..=1,
        rm_file,
    );
    table.add(
        "mv_file",
        "<name> <new name>",
        "rename a file of the current task or algorithm",
        2..=2,
        mv_file,
    );
    table.add(
        "edit_script",
        "<name>",
        "open a file of the current task or algorithm in $EDITOR",
        1..=1,
        edit_script,
    );
    table.add(
        "edit_readme",
        "",
        "open the README of the current node in $EDITOR",
        0..=0,
        edit_readme,
    );
    table.add("cat", "<name>", "print a file of the current node", 1..=1, cat);
}

fn import_file(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let node = shell.current_node()?;
    let source = shell.local_path(&args[0])?;
    import(impressible(&node)?, &source)?;
    Ok(vec![])
}

fn rm_file(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let node = shell.current_node()?;
    remove(impressible(&node)?, &args[0])?;
    Ok(vec![])
}

fn mv_file(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let node = shell.current_node()?;
    move_file(impressible(&node)?, &args[0], &args[1])?;
    Ok(vec![])
}

fn edit_script(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let node = shell.current_node()?;
    let path = normalize_within(impressible(&node)?.path(), &args[0])?;
    run_editor(&path)?;
    Ok(vec![])
}

fn edit_readme(shell: &mut Shell, _: &[String]) -> Result<Vec<String>, CommandError> {
    let node = shell.current_node()?;
    run_editor(&node.require_live()?.path().join(README_FILE))?;
    Ok(vec![])
}

/// Blocks until `$EDITOR` exits.
fn run_editor(path: &Path) -> Result<(), CommandError> {
    let editor = std::env::var("EDITOR")
        .ok()
        .filter(|editor| !editor.is_empty())
        .unwrap_or_else(|| FALLBACK_EDITOR.to_string());

    let status = Command::new(&editor)
        .arg(path)
        .status()
        .map_err(|e| CommandError::Editor {
            editor: editor.clone(),
            reason: e.to_string(),
        })?;
    if !status.success() {
        return Err(CommandError::Editor {
            editor,
            reason: status.to_string(),
        });
    }
    Ok(())
}

fn cat(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let node = shell.current_node()?;
    let path = normalize_within(node.require_live()?.path(), &args[0])?;
    let text = std::fs::read_to_string(&path).map_err(|source| CommandError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(text.lines().map(str::to_string).collect())
}
