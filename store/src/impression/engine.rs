use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, instrument};

use super::{generate_uuid, pack, Impression, ImpressionConfig};
use crate::fsutil::{dir_mtime, files_equal, tree_excluded};
use crate::object::{HasArcs, HasConfig, HasImpression, Node, ObjectType};
use crate::{Error, Session};

/// Answers younger than this are trusted without looking at the disk.
const CONSULT_FLOOR: Duration = Duration::from_secs(1);

/// Local state of a task or algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalStatus {
    New,
    Impressed,
}

impl fmt::Display for LocalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalStatus::New => f.write_str("new"),
            LocalStatus::Impressed => f.write_str("impressed"),
        }
    }
}

impl Session {
    /// Snapshots `node` unless its current impression is still valid,
    /// impressing its predecessors first.
    #[instrument(skip_all, fields(node = %node.handle()), err)]
    pub fn impress(&self, node: &dyn HasImpression) -> Result<(), Error> {
        if self.is_impressed_fast(node)? {
            debug!("already impressed");
            return Ok(());
        }

        for predecessor in node.predecessors()? {
            let predecessor = predecessor.as_impressible().ok_or_else(|| {
                Error::InvalidTarget(format!(
                    "predecessor {} of {} is not a task or algorithm",
                    predecessor,
                    node.handle()
                ))
            })?;
            self.impress(predecessor)?;
        }

        let impression = self.create_impression(node)?;
        self.cache().borrow_mut().invalidate(node.path());
        info!(uuid = impression.uuid(), "impressed");
        Ok(())
    }

    /// Impresses every task and algorithm at or below `node`. Other nodes are skipped.
    pub fn impress_node(&self, node: &Node) -> Result<(), Error> {
        for node in node.sub_objects_recursively()? {
            if let Some(node) = node.as_impressible() {
                self.impress(node)?;
            }
        }
        Ok(())
    }

    fn create_impression(&self, node: &dyn HasImpression) -> Result<Impression, Error> {
        let object_type = node
            .object_type()
            .ok_or_else(|| Error::InvalidTarget(format!("{} is not a chern object", node.handle())))?;

        let mut dependencies = Vec::new();
        let mut impression_of = BTreeMap::new();
        for predecessor in node.predecessors()? {
            let uuid = predecessor
                .as_impressible()
                .map(|p| p.impression())
                .transpose()?
                .flatten()
                .ok_or_else(|| Error::NotImpressed(predecessor.to_string()))?
                .uuid()
                .to_string();
            impression_of.insert(predecessor.invariant_path(), uuid.clone());
            dependencies.push(uuid);
        }
        dependencies.sort();

        let alias_to_impression = if object_type == ObjectType::Task {
            let mut aliases = BTreeMap::new();
            for (alias, path) in node.alias_to_path()? {
                if let Some(uuid) = impression_of.get(&path) {
                    aliases.insert(alias, uuid.clone());
                }
            }
            Some(aliases)
        } else {
            None
        };

        let parents = match node.impression()? {
            Some(previous) => {
                // a vanished previous impression still counts as a parent
                let mut parents = previous.parents().unwrap_or_default();
                parents.push(previous.uuid().to_string());
                parents
            }
            None => vec![],
        };

        let impression = Impression::new(node.handle().root(), generate_uuid());
        let contents = impression.contents_path();
        let tree = tree_excluded(node.path())?;
        for entry in &tree {
            let dir = match entry.dirpath() {
                "." => contents.clone(),
                dirpath => contents.join(dirpath),
            };
            std::fs::create_dir_all(&dir).map_err(Error::io(&dir))?;
            for name in entry.files() {
                let member = entry.member(name);
                let target = contents.join(&member);
                std::fs::copy(node.path().join(&member), &target).map_err(Error::io(&target))?;
            }
        }

        impression.write_config(&ImpressionConfig {
            object_type,
            tree: tree.clone(),
            dependencies,
            parents,
            current_path: node.invariant_path(),
            alias_to_impression,
        })?;

        let tarball = impression.tarball_path();
        self.tokio_handle()
            .block_on(pack::pack(&contents, &tree, &tarball))
            .map_err(Error::archive(&tarball))?;

        node.set_impression(impression.uuid())?;
        Ok(impression)
    }

    /// Recomputes whether the current impression of `node` matches its files and predecessors.
    pub fn is_impressed(&self, node: &dyn HasImpression) -> Result<bool, Error> {
        let Some(impression) = node.impression()? else {
            return Ok(false);
        };
        if impression.is_zombie() {
            return Ok(false);
        }

        let mut dependencies = Vec::new();
        for predecessor in node.predecessors()? {
            let Some(predecessor) = predecessor.as_impressible() else {
                return Ok(false);
            };
            if !self.is_impressed_fast(predecessor)? {
                return Ok(false);
            }
            match predecessor.impression()? {
                Some(impression) => dependencies.push(impression.uuid().to_string()),
                None => return Ok(false),
            }
        }
        dependencies.sort();

        let config = impression.config()?;
        if dependencies != config.dependencies {
            return Ok(false);
        }

        let tree = tree_excluded(node.path())?;
        if tree != config.tree {
            return Ok(false);
        }

        let contents = impression.contents_path();
        for entry in &tree {
            for name in entry.files() {
                let member = entry.member(name);
                if !files_equal(&node.path().join(&member), &contents.join(&member))? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Memoized [Session::is_impressed]: answers younger than a second are reused,
    /// as are older ones if nothing in the project changed since.
    pub fn is_impressed_fast(&self, node: &dyn HasImpression) -> Result<bool, Error> {
        let cached = self.cache().borrow().impression(node.path());
        if let Some((checked_at, impressed)) = cached {
            let fresh = SystemTime::now()
                .duration_since(checked_at)
                .map_or(true, |age| age < CONSULT_FLOOR);
            if fresh || dir_mtime(node.handle().root())? < checked_at {
                return Ok(impressed);
            }
        }

        let impressed = self.is_impressed(node)?;
        self.cache()
            .borrow_mut()
            .record_impression(node.path(), SystemTime::now(), impressed);
        Ok(impressed)
    }

    pub fn local_status(&self, node: &dyn HasImpression) -> Result<LocalStatus, Error> {
        if self.is_impressed_fast(node)? {
            Ok(LocalStatus::Impressed)
        } else {
            Ok(LocalStatus::New)
        }
    }

    /// Extracts the archive of `impression` below `dest`.
    pub fn unpack(&self, impression: &Impression, dest: &Path) -> Result<(), Error> {
        let tarball = impression.tarball_path();
        self.tokio_handle()
            .block_on(pack::unpack(&tarball, dest))
            .map_err(Error::archive(&tarball))
    }

    /// Member names of the archive of `impression`.
    pub fn archive_members(&self, impression: &Impression) -> Result<Vec<String>, Error> {
        let tarball = impression.tarball_path();
        self.tokio_handle()
            .block_on(pack::members(&tarball))
            .map_err(Error::archive(&tarball))
    }
}
