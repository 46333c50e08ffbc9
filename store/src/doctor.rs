//! Detection and repair of one-sided arcs and broken aliases.
//!
//! Findings are computed over a subtree without writing anything. Each repair
//! re-checks the condition it fixes, so applying a finding twice is harmless.
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use tracing::{info, instrument};

use crate::fsutil::is_identifier;
use crate::object::{HasArcs, HasConfig, Node, ObjectHandle, ObjectType};
use crate::{Error, Session};

/// An inconsistency in the arcs or aliases of a node, named by invariant paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// `predecessor` is a zombie or does not list `node` among its successors.
    DanglingPredecessor { node: String, predecessor: String },
    /// `successor` is a zombie or does not list `node` among its predecessors.
    DanglingSuccessor { node: String, successor: String },
    /// A task input without an alias.
    UnnamedInput { node: String, input: String },
    /// An alias bound to a path that is not a predecessor.
    OrphanAlias {
        node: String,
        alias: String,
        path: String,
    },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::DanglingPredecessor { node, predecessor } => write!(
                f,
                "{}: predecessor {} does not list it as a successor",
                node, predecessor
            ),
            Finding::DanglingSuccessor { node, successor } => write!(
                f,
                "{}: successor {} does not list it as a predecessor",
                node, successor
            ),
            Finding::UnnamedInput { node, input } => {
                write!(f, "{}: input {} has no alias", node, input)
            }
            Finding::OrphanAlias { node, alias, path } => write!(
                f,
                "{}: alias {} points to {}, which is not an input",
                node, alias, path
            ),
        }
    }
}

/// Lists every finding at or below `node`, in traversal order.
pub fn diagnose(node: &Node) -> Result<Vec<Finding>, Error> {
    let mut findings = Vec::new();
    for node in node.sub_objects_recursively()? {
        let Some(node) = node.as_arcs() else {
            continue;
        };
        let path = node.invariant_path();

        for predecessor in node.predecessor_paths()? {
            let far = Node::from_handle(node.handle().sibling(&predecessor));
            let reciprocated = match far.as_arcs() {
                Some(far) => far.has_successor(&path)?,
                None => false,
            };
            if !reciprocated {
                findings.push(Finding::DanglingPredecessor {
                    node: path.clone(),
                    predecessor,
                });
            } else if far.object_type() == Some(ObjectType::Task)
                && node.alias_of(&predecessor)?.is_none()
            {
                findings.push(Finding::UnnamedInput {
                    node: path.clone(),
                    input: predecessor,
                });
            }
        }

        for successor in node.successor_paths()? {
            let far = Node::from_handle(node.handle().sibling(&successor));
            let reciprocated = match far.as_arcs() {
                Some(far) => far.has_predecessor(&path)?,
                None => false,
            };
            if !reciprocated {
                findings.push(Finding::DanglingSuccessor {
                    node: path.clone(),
                    successor,
                });
            }
        }

        for (alias, target) in node.alias_to_path()? {
            if !node.has_predecessor(&target)? {
                findings.push(Finding::OrphanAlias {
                    node: path.clone(),
                    alias,
                    path: target,
                });
            }
        }
    }
    Ok(findings)
}

/// Applies the repair for `finding` in the project rooted at `root`.
/// A finding whose condition no longer holds is left alone.
pub fn repair(root: &Path, finding: &Finding) -> Result<(), Error> {
    let node_path = match finding {
        Finding::DanglingPredecessor { node, .. }
        | Finding::DanglingSuccessor { node, .. }
        | Finding::UnnamedInput { node, .. }
        | Finding::OrphanAlias { node, .. } => node,
    };
    let node = Node::from_handle(ObjectHandle::new(root, root).sibling(node_path));
    let Some(node) = node.as_arcs() else {
        return Ok(());
    };

    match finding {
        Finding::DanglingPredecessor { predecessor, .. } => node.unlink_predecessor(predecessor),
        Finding::DanglingSuccessor { successor, .. } => node.unlink_successor(successor),
        Finding::UnnamedInput { input, .. } => {
            if !node.has_predecessor(input)? || node.alias_of(input)?.is_some() {
                return Ok(());
            }
            let alias = derive_alias(input, &node.alias_to_path()?);
            node.set_alias(&alias, input)
        }
        Finding::OrphanAlias { alias, path, .. } => {
            if node.path_of(alias)?.as_deref() != Some(path.as_str())
                || node.has_predecessor(path)?
            {
                return Ok(());
            }
            node.remove_alias(alias)
        }
    }
}

/// Diagnoses the subtree at `node` and repairs every finding `confirm` accepts.
/// Returns each finding with whether it was repaired.
#[instrument(skip_all, fields(node = %node), err)]
pub fn doctor(
    session: &Session,
    node: &Node,
    mut confirm: impl FnMut(&Finding) -> bool,
) -> Result<Vec<(Finding, bool)>, Error> {
    let root = node.handle().root().to_path_buf();
    let mut report = Vec::new();
    for finding in diagnose(node)? {
        let accepted = confirm(&finding);
        if accepted {
            repair(&root, &finding)?;
            info!(%finding, "repaired");
        }
        report.push((finding, accepted));
    }
    if report.iter().any(|(_, repaired)| *repaired) {
        session.graph_changed();
    }
    Ok(report)
}

/// An identifier derived from the last component of `input`, unique among `taken`.
fn derive_alias(input: &str, taken: &BTreeMap<String, String>) -> String {
    let name = input.rsplit('/').next().unwrap_or(input);
    let mut base: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if base.is_empty() {
        base = "input".into();
    } else if base.starts_with(|c: char| c.is_ascii_digit()) {
        base.insert(0, '_');
    }
    debug_assert!(is_identifier(&base));

    let mut alias = base.clone();
    let mut suffix = 1;
    while taken.contains_key(&alias) {
        alias = format!("{}_{}", base, suffix);
        suffix += 1;
    }
    alias
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rstest::rstest;

    use super::derive_alias;

    #[rstest]
    #[case::plain("tasks/gen", &[], "gen")]
    #[case::dashes("tasks/my-data.v2", &[], "my_data_v2")]
    #[case::leading_digit("tasks/2018", &[], "_2018")]
    #[case::taken("tasks/gen", &["gen"], "gen_1")]
    #[case::taken_twice("tasks/gen", &["gen", "gen_1"], "gen_2")]
    fn aliases(#[case] input: &str, #[case] taken: &[&str], #[case] expected: &str) {
        let taken: BTreeMap<String, String> = taken
            .iter()
            .map(|a| (a.to_string(), String::new()))
            .collect();
        assert_eq!(expected, derive_alias(input, &taken));
    }
}
