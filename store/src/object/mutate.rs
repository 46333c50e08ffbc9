//! Subtree copy, move and removal, keeping arcs consistent on both endpoints.
use std::path::Path;

use tracing::{debug, instrument, warn};

use super::{HasConfig, Node, ObjectHandle};
use crate::fsutil::copy_tree;
use crate::{Error, Session};

impl Node {
    /// Checks that the subtree rooted at `self` may be copied or moved to `destination`.
    fn check_destination(&self, destination: &Path) -> Result<(), Error> {
        match self {
            Node::Project(_) => {
                return Err(Error::InvalidTarget(
                    "the project itself cannot be copied or moved".into(),
                ))
            }
            Node::Zombie(handle) => {
                return Err(Error::InvalidTarget(format!(
                    "{} is not a chern object",
                    handle
                )))
            }
            _ => {}
        }

        let root = self.handle().root();
        if !destination.starts_with(root) || destination == root {
            return Err(Error::InvalidTarget(format!(
                "{} is outside the project",
                destination.display()
            )));
        }
        if destination.exists() {
            return Err(Error::InvalidTarget(format!(
                "{} already exists",
                destination.display()
            )));
        }
        if destination.starts_with(self.path()) {
            return Err(Error::ConstraintViolation(format!(
                "cannot copy or move {} into itself",
                self
            )));
        }

        let parent = destination
            .parent()
            .map(|p| Node::open(root, p))
            .filter(|p| p.as_container().is_some())
            .ok_or_else(|| {
                Error::InvalidTarget(format!(
                    "the parent of {} is not a directory",
                    destination.display()
                ))
            })?;
        debug!(parent = %parent, "destination checked");
        Ok(())
    }

    /// Where a node of this subtree ends up once the subtree sits at `destination`.
    fn counterpart(&self, node: &Node, destination: &Path) -> Node {
        let relative = node
            .path()
            .strip_prefix(self.path())
            .expect("Chern bug: subtree node outside its subtree");
        Node::open(self.handle().root(), destination.join(relative))
    }

    fn contains(&self, invariant_path: &str) -> bool {
        self.handle()
            .sibling(invariant_path)
            .is_within(self.handle())
    }

    /// Duplicates this subtree at `destination`. Arcs between copied nodes are
    /// recreated between the copies, arcs leaving the subtree are dropped,
    /// and every copied task and algorithm is impressed afresh.
    #[instrument(skip_all, fields(node = %self, destination = %destination.display()), err)]
    pub fn copy_to(&self, session: &Session, destination: &Path) -> Result<Node, Error> {
        self.check_destination(destination)?;
        let originals = self.sub_objects_recursively()?;

        copy_tree(self.path(), destination)?;

        let copies: Vec<Node> = originals
            .iter()
            .map(|n| self.counterpart(n, destination))
            .collect();
        for copy in &copies {
            if let Some(copy) = copy.as_impressible() {
                copy.clean_flow()?;
                copy.clean_impressions()?;
            }
        }

        for (original, copy) in originals.iter().zip(&copies) {
            let (Some(original), Some(copy)) = (original.as_arcs(), copy.as_arcs()) else {
                continue;
            };
            for predecessor in original.predecessor_paths()? {
                if !self.contains(&predecessor) {
                    debug!(node = %copy.handle(), %predecessor, "dropping external input");
                    continue;
                }
                let alias = original.alias_of(&predecessor)?;
                let new_predecessor = self.counterpart(
                    &Node::from_handle(self.handle().sibling(&predecessor)),
                    destination,
                );
                if let Some(new_predecessor) = new_predecessor.as_arcs() {
                    copy.add_arc_from(new_predecessor)?;
                    if let Some(alias) = alias {
                        copy.set_alias(&alias, &new_predecessor.invariant_path())?;
                    }
                }
            }
        }

        for copy in &copies {
            if let Node::Task(task) = copy {
                task.sync_alias_order()?;
            }
        }

        session.graph_changed();
        for copy in &copies {
            if let Some(copy) = copy.as_impressible() {
                session.impress(copy)?;
            }
        }
        Ok(Node::open(self.handle().root(), destination))
    }

    /// Moves this subtree to `destination`, keeping every impression.
    /// Arcs to nodes outside the subtree are rewritten on the far endpoint.
    /// Fails before touching anything if a task or algorithm of the subtree is not impressed.
    #[instrument(skip_all, fields(node = %self, destination = %destination.display()), err)]
    pub fn move_to(&self, session: &Session, destination: &Path) -> Result<Node, Error> {
        self.check_destination(destination)?;
        let originals = self.sub_objects_recursively()?;
        for node in &originals {
            if let Some(node) = node.as_impressible() {
                if !session.is_impressed_fast(node)? {
                    return Err(Error::NotImpressed(format!(
                        "{} must be impressed before it is moved",
                        node.handle()
                    )));
                }
            }
        }

        copy_tree(self.path(), destination)?;

        let old_prefix = self.invariant_path();
        let new_prefix = ObjectHandle::new(self.handle().root(), destination).invariant_path();
        let relocate = |path: &str| -> Option<String> {
            let rest = path.strip_prefix(old_prefix.as_str())?;
            (rest.is_empty() || rest.starts_with('/')).then(|| format!("{}{}", new_prefix, rest))
        };

        for original in &originals {
            let Some(original) = original.as_arcs() else {
                continue;
            };
            let old_path = original.invariant_path();
            let Some(new_path) = relocate(&old_path) else {
                continue;
            };
            let moved = Node::from_handle(self.handle().sibling(&new_path));
            if let Some(moved) = moved.as_arcs() {
                moved.rewrite_paths(&relocate)?;
            }

            let rename = |p: &str| (p == old_path).then(|| new_path.clone());
            let external = original
                .predecessor_paths()?
                .into_iter()
                .chain(original.successor_paths()?)
                .filter(|p| !self.contains(p));
            for path in external {
                let endpoint = Node::from_handle(self.handle().sibling(&path));
                match endpoint.as_arcs() {
                    Some(endpoint) => endpoint.rewrite_paths(&rename)?,
                    None => warn!(node = %old_path, endpoint = %path, "leaving arc to a zombie"),
                }
            }
        }

        std::fs::remove_dir_all(self.path()).map_err(Error::io(self.path()))?;
        session.graph_changed();
        Ok(Node::open(self.handle().root(), destination))
    }

    /// Deletes this subtree after unlinking every arc that leaves it.
    /// Impressions are kept.
    #[instrument(skip_all, fields(node = %self), err)]
    pub fn rm(&self, session: &Session) -> Result<(), Error> {
        if matches!(self, Node::Project(_)) {
            return Err(Error::InvalidTarget(
                "the project root cannot be removed".into(),
            ));
        }
        if !self.path().exists() {
            return Err(Error::InvalidTarget(format!("{} does not exist", self)));
        }

        for node in self.sub_objects_recursively()? {
            let Some(node) = node.as_arcs() else {
                continue;
            };
            let path = node.invariant_path();
            for predecessor in node.predecessor_paths()? {
                if self.contains(&predecessor) {
                    continue;
                }
                let predecessor = Node::from_handle(self.handle().sibling(&predecessor));
                if let Some(predecessor) = predecessor.as_arcs() {
                    predecessor.unlink_successor(&path)?;
                }
            }
            for successor in node.successor_paths()? {
                if self.contains(&successor) {
                    continue;
                }
                let successor = Node::from_handle(self.handle().sibling(&successor));
                if let Some(successor) = successor.as_arcs() {
                    successor.unlink_predecessor(&path)?;
                }
            }
        }

        std::fs::remove_dir_all(self.path()).map_err(Error::io(self.path()))?;
        session.graph_changed();
        Ok(())
    }
}
