use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use super::{HasConfig, Node, ObjectHandle, ObjectType};
use crate::fsutil::is_identifier;
use crate::Error;

type AliasMap = BTreeMap<String, String>;

/// Predecessor/successor arcs and input aliases. Implemented by tasks and algorithms.
///
/// An arc is stored on both endpoints: the predecessor's invariant path in
/// `predecessors` of the dependent node, and the dependent's path in
/// `successors` of the predecessor.
pub trait HasArcs: HasConfig {
    fn as_arcs(&self) -> &dyn HasArcs;

    fn predecessor_paths(&self) -> Result<Vec<String>, Error> {
        self.config_file().read_or_default("predecessors")
    }

    fn successor_paths(&self) -> Result<Vec<String>, Error> {
        self.config_file().read_or_default("successors")
    }

    fn predecessors(&self) -> Result<Vec<Node>, Error> {
        Ok(self
            .predecessor_paths()?
            .iter()
            .map(|p| Node::from_handle(self.handle().sibling(p)))
            .collect())
    }

    fn successors(&self) -> Result<Vec<Node>, Error> {
        Ok(self
            .successor_paths()?
            .iter()
            .map(|p| Node::from_handle(self.handle().sibling(p)))
            .collect())
    }

    fn has_predecessor(&self, path: &str) -> Result<bool, Error> {
        Ok(self.predecessor_paths()?.iter().any(|p| p == path))
    }

    fn has_successor(&self, path: &str) -> Result<bool, Error> {
        Ok(self.successor_paths()?.iter().any(|p| p == path))
    }

    fn alias_to_path(&self) -> Result<AliasMap, Error> {
        self.config_file().read_or_default("alias_to_path")
    }

    fn path_to_alias(&self) -> Result<AliasMap, Error> {
        self.config_file().read_or_default("path_to_alias")
    }

    fn alias_of(&self, path: &str) -> Result<Option<String>, Error> {
        Ok(self.path_to_alias()?.remove(path))
    }

    fn path_of(&self, alias: &str) -> Result<Option<String>, Error> {
        Ok(self.alias_to_path()?.remove(alias))
    }

    /// Validates adding `other` as a predecessor of `self` without writing anything.
    fn check_arc_from(&self, other: &dyn HasArcs) -> Result<(), Error> {
        self.check_arc_replacing(other, None)
    }

    /// Like [HasArcs::check_arc_from], as if the algorithm at `replaced` had
    /// already been unlinked.
    fn check_arc_replacing(
        &self,
        other: &dyn HasArcs,
        replaced: Option<&str>,
    ) -> Result<(), Error> {
        if self.object_type() != Some(ObjectType::Task) {
            return Err(Error::InvalidTarget(format!(
                "{} is not a task, only tasks have inputs",
                self.handle()
            )));
        }
        let other_type = match other.object_type() {
            Some(t @ (ObjectType::Task | ObjectType::Algorithm)) => t,
            _ => {
                return Err(Error::InvalidTarget(format!(
                    "{} is neither a task nor an algorithm",
                    other.handle()
                )))
            }
        };

        let self_path = self.invariant_path();
        let other_path = other.invariant_path();
        if self_path == other_path {
            return Err(Error::ConstraintViolation(format!(
                "{} cannot depend on itself",
                self.handle()
            )));
        }
        if self.has_predecessor(&other_path)? || other.has_successor(&self_path)? {
            return Err(Error::ConstraintViolation(format!(
                "{} is already a predecessor of {}",
                other.handle(),
                self.handle()
            )));
        }
        if other_type == ObjectType::Algorithm {
            if let Some(existing) = self.predecessors()?.into_iter().find(|p| {
                p.object_type() == Some(ObjectType::Algorithm)
                    && Some(p.invariant_path().as_str()) != replaced
            }) {
                return Err(Error::ConstraintViolation(format!(
                    "{} already uses algorithm {}",
                    self.handle(),
                    existing
                )));
            }
        }
        if depends_on(other.handle(), &self_path)? {
            return Err(Error::ConstraintViolation(format!(
                "{} depends on {}, the arc would close a cycle",
                other.handle(),
                self.handle()
            )));
        }
        Ok(())
    }

    /// Makes `other` a predecessor of `self`, writing both endpoints.
    fn add_arc_from(&self, other: &dyn HasArcs) -> Result<(), Error> {
        self.check_arc_from(other)?;

        let self_path = self.invariant_path();
        let other_path = other.invariant_path();
        push_path(self.handle(), "predecessors", &other_path)?;
        push_path(other.handle(), "successors", &self_path)?;
        debug!(from = %other_path, to = %self_path, "added arc");
        Ok(())
    }

    fn add_arc_to(&self, other: &dyn HasArcs) -> Result<(), Error> {
        other.add_arc_from(self.as_arcs())
    }

    /// Removes `other` from the predecessors of `self`, dropping its alias.
    /// Unless `single` is set, `self` is also removed from the successors of `other`.
    fn remove_arc_from(&self, other: &dyn HasArcs, single: bool) -> Result<(), Error> {
        self.unlink_predecessor(&other.invariant_path())?;
        if !single {
            other.unlink_successor(&self.invariant_path())?;
        }
        Ok(())
    }

    fn remove_arc_to(&self, other: &dyn HasArcs, single: bool) -> Result<(), Error> {
        self.unlink_successor(&other.invariant_path())?;
        if !single {
            other.unlink_predecessor(&self.invariant_path())?;
        }
        Ok(())
    }

    /// Drops `path` from this node's predecessors together with any alias bound to it.
    /// Only this endpoint is written. A path that is not a predecessor is a no-op.
    fn unlink_predecessor(&self, path: &str) -> Result<(), Error> {
        let file = self.config_file();
        let dropped = file.update(|table| {
            let mut predecessors: Vec<String> = file.get_from(table, "predecessors")?;
            let mut alias_to_path: AliasMap = file.get_from(table, "alias_to_path")?;
            let mut path_to_alias: AliasMap = file.get_from(table, "path_to_alias")?;

            predecessors.retain(|p| p != path);
            path_to_alias.remove(path);
            let mut dropped = Vec::new();
            alias_to_path.retain(|alias, p| {
                if p == path {
                    dropped.push(alias.clone());
                    false
                } else {
                    true
                }
            });

            file.set_in(table, "predecessors", &predecessors)?;
            file.set_in(table, "alias_to_path", &alias_to_path)?;
            file.set_in(table, "path_to_alias", &path_to_alias)?;
            Ok(dropped)
        })?;

        for alias in dropped {
            forget_alias_order(self.handle(), &alias)?;
        }
        Ok(())
    }

    /// Drops `path` from this node's successors. Only this endpoint is written.
    fn unlink_successor(&self, path: &str) -> Result<(), Error> {
        let file = self.config_file();
        file.update(|table| {
            let mut successors: Vec<String> = file.get_from(table, "successors")?;
            successors.retain(|p| p != path);
            file.set_in(table, "successors", &successors)
        })
    }

    /// Binds `alias` to the predecessor at `path`. An empty alias is a no-op.
    fn set_alias(&self, alias: &str, path: &str) -> Result<(), Error> {
        if alias.is_empty() {
            return Ok(());
        }
        if !is_identifier(alias) {
            return Err(Error::ConstraintViolation(format!(
                "{} is not a valid alias",
                alias
            )));
        }
        if !self.has_predecessor(path)? {
            return Err(Error::ConstraintViolation(format!(
                "{} is not a predecessor of {}",
                path,
                self.handle()
            )));
        }

        let file = self.config_file();
        let replaced = file.update(|table| {
            let mut alias_to_path: AliasMap = file.get_from(table, "alias_to_path")?;
            let mut path_to_alias: AliasMap = file.get_from(table, "path_to_alias")?;

            if let Some(bound) = alias_to_path.get(alias) {
                if bound != path {
                    return Err(Error::ConstraintViolation(format!(
                        "alias {} is already bound to {}",
                        alias, bound
                    )));
                }
            }
            let replaced = path_to_alias
                .insert(path.to_string(), alias.to_string())
                .filter(|old| old != alias);
            if let Some(old) = &replaced {
                alias_to_path.remove(old);
            }
            alias_to_path.insert(alias.to_string(), path.to_string());

            file.set_in(table, "alias_to_path", &alias_to_path)?;
            file.set_in(table, "path_to_alias", &path_to_alias)?;
            Ok(replaced)
        })?;

        if let Some(old) = replaced {
            forget_alias_order(self.handle(), &old)?;
        }
        remember_alias_order(self.handle(), alias)
    }

    /// Unbinds `alias`. An empty or unknown alias is a no-op.
    fn remove_alias(&self, alias: &str) -> Result<(), Error> {
        if alias.is_empty() {
            return Ok(());
        }
        let file = self.config_file();
        let removed = file.update(|table| {
            let mut alias_to_path: AliasMap = file.get_from(table, "alias_to_path")?;
            let mut path_to_alias: AliasMap = file.get_from(table, "path_to_alias")?;

            let Some(path) = alias_to_path.remove(alias) else {
                return Ok(false);
            };
            if path_to_alias.get(&path).map(String::as_str) == Some(alias) {
                path_to_alias.remove(&path);
            }

            file.set_in(table, "alias_to_path", &alias_to_path)?;
            file.set_in(table, "path_to_alias", &path_to_alias)?;
            Ok(true)
        })?;

        if removed {
            forget_alias_order(self.handle(), alias)?;
        }
        Ok(())
    }

    /// Replaces every path this node stores for which `rewrite` returns a new
    /// one, in arcs and aliases alike, keeping order. Only this endpoint is written.
    fn rewrite_paths(&self, rewrite: &dyn Fn(&str) -> Option<String>) -> Result<(), Error> {
        let apply = |p: String| rewrite(&p).unwrap_or(p);
        let file = self.config_file();
        file.update(|table| {
            let predecessors: Vec<String> = file.get_from(table, "predecessors")?;
            let successors: Vec<String> = file.get_from(table, "successors")?;
            let alias_to_path: AliasMap = file.get_from(table, "alias_to_path")?;
            let path_to_alias: AliasMap = file.get_from(table, "path_to_alias")?;

            let predecessors: Vec<String> = predecessors.into_iter().map(apply).collect();
            let successors: Vec<String> = successors.into_iter().map(apply).collect();
            let alias_to_path: AliasMap = alias_to_path
                .into_iter()
                .map(|(alias, p)| (alias, apply(p)))
                .collect();
            let path_to_alias: AliasMap = path_to_alias
                .into_iter()
                .map(|(p, alias)| (apply(p), alias))
                .collect();

            file.set_in(table, "predecessors", &predecessors)?;
            file.set_in(table, "successors", &successors)?;
            file.set_in(table, "alias_to_path", &alias_to_path)?;
            file.set_in(table, "path_to_alias", &path_to_alias)
        })
    }

    /// Forgets every arc and alias of this node, on this endpoint only.
    fn clean_flow(&self) -> Result<(), Error> {
        let file = self.config_file();
        file.update(|table| {
            file.set_in(table, "predecessors", &Vec::<String>::new())?;
            file.set_in(table, "successors", &Vec::<String>::new())?;
            file.set_in(table, "alias_to_path", &AliasMap::new())?;
            file.set_in(table, "path_to_alias", &AliasMap::new())
        })
    }
}

fn push_path(handle: &ObjectHandle, key: &str, path: &str) -> Result<(), Error> {
    let file = handle.config_file();
    file.update(|table| {
        let mut paths: Vec<String> = file.get_from(table, key)?;
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_string());
        }
        file.set_in(table, key, &paths)
    })
}

/// True if `target` is reachable from `start` by following predecessors,
/// or is `start` itself.
pub(crate) fn depends_on(start: &ObjectHandle, target: &str) -> Result<bool, Error> {
    let mut stack = vec![start.invariant_path()];
    let mut visited = HashSet::new();
    while let Some(current) = stack.pop() {
        if current == target {
            return Ok(true);
        }
        if !visited.insert(current.clone()) {
            continue;
        }
        let predecessors: Vec<String> = start
            .sibling(&current)
            .config_file()
            .read_or_default("predecessors")?;
        stack.extend(predecessors);
    }
    Ok(false)
}

/// Appends `alias` to the `alias` order list of a task's `chern.yaml`.
fn remember_alias_order(handle: &ObjectHandle, alias: &str) -> Result<(), Error> {
    if handle.object_type() != Some(ObjectType::Task) {
        return Ok(());
    }
    let yaml = handle.yaml_file();
    yaml.update(|table| {
        let mut order: Vec<String> = yaml.get_from(table, "alias")?;
        if !order.iter().any(|a| a == alias) {
            order.push(alias.to_string());
            yaml.set_in(table, "alias", &order)?;
        }
        Ok(())
    })
}

fn forget_alias_order(handle: &ObjectHandle, alias: &str) -> Result<(), Error> {
    let yaml = handle.yaml_file();
    if !yaml.exists() {
        return Ok(());
    }
    yaml.update(|table| {
        let mut order: Vec<String> = yaml.get_from(table, "alias")?;
        if order.iter().any(|a| a == alias) {
            order.retain(|a| a != alias);
            yaml.set_in(table, "alias", &order)?;
        }
        Ok(())
    })
}
