//! The object graph: typed nodes persisted as directories, connected by arcs.
//!
//! Nodes are path handles. Nothing is cached in memory, every accessor reads
//! the node's files, and predecessors/successors are resolved on demand from
//! the invariant paths stored in `.chern/config.json`.
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigFile, YamlFile};
use crate::fsutil::{self, CHERN_DIR, CONFIG_FILE, README_FILE, SETTINGS_FILE};
use crate::impression::Impression;
use crate::Error;

mod algorithm;
mod arcs;
mod container;
mod files;
mod mutate;
mod project;
mod task;

pub use algorithm::Algorithm;
pub use arcs::HasArcs;
pub use container::{Container, Directory};
pub use files::{import_file, move_file, rm_file};
pub use project::{
    create_project, Project, CHERN_VERSION, DEFAULT_SERVER_URL, RESERVED_PROJECT_NAMES,
};
pub use task::{Task, DEFAULT_ENVIRONMENT, DEFAULT_MEMORY_LIMIT, RAWDATA_ENVIRONMENT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Project,
    Directory,
    Task,
    Algorithm,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Project => "project",
            ObjectType::Directory => "directory",
            ObjectType::Task => "task",
            ObjectType::Algorithm => "algorithm",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(ObjectType::Project),
            "directory" => Ok(ObjectType::Directory),
            "task" => Ok(ObjectType::Task),
            "algorithm" => Ok(ObjectType::Algorithm),
            other => Err(Error::InvalidTarget(format!("unknown object type {}", other))),
        }
    }
}

/// Location of a node: its absolute path and the root of the project it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    root: PathBuf,
    path: PathBuf,
}

impl ObjectHandle {
    pub fn new(root: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path relative to the project root, `/`-separated. Empty for the project itself.
    pub fn invariant_path(&self) -> String {
        match self.path.strip_prefix(&self.root) {
            Ok(relative) => fsutil::slash_path(relative),
            Err(_) => self.path.to_string_lossy().into_owned(),
        }
    }

    /// Handle of the node stored at `invariant_path` in the same project.
    pub fn sibling(&self, invariant_path: &str) -> ObjectHandle {
        ObjectHandle::new(self.root.clone(), self.root.join(invariant_path))
    }

    pub fn config_file(&self) -> ConfigFile {
        ConfigFile::new(self.path.join(CHERN_DIR).join(CONFIG_FILE))
    }

    pub fn yaml_file(&self) -> YamlFile {
        YamlFile::new(self.path.join(SETTINGS_FILE))
    }

    /// The stored object type, or `None` if the config is missing or unreadable.
    pub fn object_type(&self) -> Option<ObjectType> {
        self.config_file()
            .read_variable::<ObjectType>("object_type")
            .ok()
            .flatten()
    }

    pub fn is_zombie(&self) -> bool {
        self.object_type().is_none()
    }

    /// True if `self` is `other` or lies below it.
    pub fn is_within(&self, other: &ObjectHandle) -> bool {
        self.path.starts_with(&other.path)
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let invariant_path = self.invariant_path();
        if invariant_path.is_empty() {
            f.write_str("@")
        } else {
            f.write_str(&invariant_path)
        }
    }
}

/// Shared access to a node's config and metadata files.
pub trait HasConfig {
    fn handle(&self) -> &ObjectHandle;

    fn path(&self) -> &Path {
        self.handle().path()
    }

    fn invariant_path(&self) -> String {
        self.handle().invariant_path()
    }

    fn config_file(&self) -> ConfigFile {
        self.handle().config_file()
    }

    fn object_type(&self) -> Option<ObjectType> {
        self.handle().object_type()
    }

    /// Contents of the node's `README.md`, empty if there is none.
    fn readme(&self) -> Result<String, Error> {
        let path = self.path().join(README_FILE);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(Error::io(&path)(e)),
        }
    }

    fn set_readme(&self, text: &str) -> Result<(), Error> {
        fsutil::write_atomic(&self.path().join(README_FILE), text.as_bytes())
    }
}

/// Access to a node's current impression. Implemented by tasks and algorithms.
pub trait HasImpression: HasArcs {
    fn as_impressible(&self) -> &dyn HasImpression;

    fn impression(&self) -> Result<Option<Impression>, Error> {
        Ok(self
            .config_file()
            .read_variable::<String>("impression")?
            .filter(|uuid| !uuid.is_empty())
            .map(|uuid| Impression::new(self.handle().root(), uuid)))
    }

    fn set_impression(&self, uuid: &str) -> Result<(), Error> {
        self.config_file().write_variable("impression", uuid)
    }

    /// Forgets the current impression. The impression directories stay.
    fn clean_impressions(&self) -> Result<(), Error> {
        self.set_impression("")
    }
}

/// A node of the graph, resolved from its on-disk `object_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Project(Project),
    Directory(Directory),
    Task(Task),
    Algorithm(Algorithm),
    /// A handle without a readable `.chern/config.json`.
    Zombie(ObjectHandle),
}

/// Returns the node at an absolute path, locating its project root first.
pub fn get_node(path: &Path) -> Result<Node, Error> {
    let root = fsutil::project_root_of(path)?;
    Ok(Node::open(root, path))
}

impl Node {
    pub fn open(root: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Node {
        Node::from_handle(ObjectHandle::new(root, path))
    }

    pub fn from_handle(handle: ObjectHandle) -> Node {
        match handle.object_type() {
            Some(ObjectType::Project) => Node::Project(Project(handle)),
            Some(ObjectType::Directory) => Node::Directory(Directory(handle)),
            Some(ObjectType::Task) => Node::Task(Task(handle)),
            Some(ObjectType::Algorithm) => Node::Algorithm(Algorithm(handle)),
            None => Node::Zombie(handle),
        }
    }

    pub fn handle(&self) -> &ObjectHandle {
        match self {
            Node::Project(n) => n.handle(),
            Node::Directory(n) => n.handle(),
            Node::Task(n) => n.handle(),
            Node::Algorithm(n) => n.handle(),
            Node::Zombie(handle) => handle,
        }
    }

    pub fn path(&self) -> &Path {
        self.handle().path()
    }

    pub fn invariant_path(&self) -> String {
        self.handle().invariant_path()
    }

    pub fn object_type(&self) -> Option<ObjectType> {
        match self {
            Node::Project(_) => Some(ObjectType::Project),
            Node::Directory(_) => Some(ObjectType::Directory),
            Node::Task(_) => Some(ObjectType::Task),
            Node::Algorithm(_) => Some(ObjectType::Algorithm),
            Node::Zombie(_) => None,
        }
    }

    pub fn is_zombie(&self) -> bool {
        matches!(self, Node::Zombie(_))
    }

    pub fn as_config(&self) -> Option<&dyn HasConfig> {
        match self {
            Node::Project(n) => Some(n),
            Node::Directory(n) => Some(n),
            Node::Task(n) => Some(n),
            Node::Algorithm(n) => Some(n),
            Node::Zombie(_) => None,
        }
    }

    pub fn as_arcs(&self) -> Option<&dyn HasArcs> {
        match self {
            Node::Task(n) => Some(n),
            Node::Algorithm(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_impressible(&self) -> Option<&dyn HasImpression> {
        match self {
            Node::Task(n) => Some(n),
            Node::Algorithm(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&dyn Container> {
        match self {
            Node::Project(n) => Some(n),
            Node::Directory(n) => Some(n),
            _ => None,
        }
    }

    /// Fails with [Error::InvalidTarget] for zombies.
    pub fn require_live(&self) -> Result<&dyn HasConfig, Error> {
        self.as_config()
            .ok_or_else(|| Error::InvalidTarget(format!("{} is not a chern object", self.handle())))
    }

    /// Direct children that are nodes, sorted by name.
    pub fn sub_objects(&self) -> Result<Vec<Node>, Error> {
        if self.as_container().is_none() {
            return Ok(vec![]);
        }

        let mut children = Vec::new();
        let entries = std::fs::read_dir(self.path()).map_err(Error::io(self.path()))?;
        for entry in entries {
            let entry = entry.map_err(Error::io(self.path()))?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            if path.is_dir() && path.join(CHERN_DIR).join(CONFIG_FILE).is_file() {
                children.push(path);
            }
        }
        children.sort();

        Ok(children
            .into_iter()
            .map(|path| Node::open(self.handle().root(), path))
            .collect())
    }

    /// Breadth-first listing of `self` and everything below it.
    pub fn sub_objects_recursively(&self) -> Result<Vec<Node>, Error> {
        let mut queue = vec![self.clone()];
        let mut i = 0;
        while i < queue.len() {
            let children = queue[i].sub_objects()?;
            queue.extend(children);
            i += 1;
        }
        Ok(queue)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.handle().fmt(f)
    }
}

/// Implements [HasConfig] for a newtype over [ObjectHandle].
macro_rules! impl_has_config {
    ($($ty:ident),*) => {
        $(
            impl HasConfig for $ty {
                fn handle(&self) -> &ObjectHandle {
                    &self.0
                }
            }
        )*
    };
}

impl_has_config!(Project, Directory, Task, Algorithm);
