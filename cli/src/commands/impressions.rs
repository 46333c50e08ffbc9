use chern_store::object::HasImpression;
use chern_store::Node;
use tracing::{instrument, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use super::CommandTable;
use crate::{impressible, CommandError, Shell};

pub(super) fn register(table: &mut CommandTable) {
    table.add(
        "impress",
        "[path]",
        "snapshot every task and algorithm at or below a node",
        0..=1,
        impress,
    );
    table.add(
        "impression",
        "",
        "print the current impression and its lineage",
        0..=0,
        impression,
    );
    table.add(
        "clean_impressions",
        "",
        "forget the current impression, keeping its files",
        0..=0,
        clean_impressions,
    );
    table.add(
        "impview",
        "",
        "list the archive of the current impression",
        0..=0,
        impview,
    );
}

#[instrument(skip_all, fields(indicatif.pb_show = 1))]
fn impress(shell: &mut Shell, args: &[String]) -> Result<Vec<String>, CommandError> {
    let node = match args.first() {
        Some(path) => shell.node_at(path)?,
        None => shell.current_node()?,
    };
    node.require_live()?;

    let span = Span::current();
    span.pb_set_style(&chern_tracing::PB_SPINNER_STYLE);
    span.pb_set_message(&format!("Impressing {}", shell.display(&node)?));
    span.pb_start();

    match node.as_impressible() {
        Some(impressible) => shell.session().impress(impressible)?,
        None => shell.session().impress_node(&node)?,
    }
    Ok(vec![])
}

fn impression(shell: &mut Shell, _: &[String]) -> Result<Vec<String>, CommandError> {
    let node = shell.current_node()?;
    let Some(impression) = impressible(&node)?.impression()? else {
        return Ok(vec!["no impression".into()]);
    };

    let mut lines = vec![impression.uuid().to_string()];
    let parents = impression.parents()?;
    if !parents.is_empty() {
        lines.push(format!("parents: {}", parents.join(" ")));
    }
    let dependencies = impression.dependencies()?;
    if !dependencies.is_empty() {
        lines.push(format!("dependencies: {}", dependencies.join(" ")));
    }
    Ok(lines)
}

fn clean_impressions(shell: &mut Shell, _: &[String]) -> Result<Vec<String>, CommandError> {
    let node = shell.current_node()?;
    impressible(&node)?.clean_impressions()?;
    shell.session().graph_changed();
    Ok(vec![])
}

fn impview(shell: &mut Shell, _: &[String]) -> Result<Vec<String>, CommandError> {
    let node = shell.current_node()?;
    let impression = current(&node)?;
    Ok(shell.session().archive_members(&impression)?)
}

fn current(node: &Node) -> Result<chern_store::impression::Impression, CommandError> {
    impressible(node)?.impression()?.ok_or_else(|| {
        CommandError::Store(chern_store::Error::NotImpressed(node.to_string()))
    })
}
