//! Throwaway projects for tests, shared with the dite and cli crates.
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use tempfile::TempDir;
use tokio::runtime::Runtime;

use crate::config::LocalConfig;
use crate::object::{
    create_project, Algorithm, Container, Directory, HasConfig, Project, Task,
};
use crate::{Node, Session};

pub const PROJECT_NAME: &str = "demo";
pub const SCRIPT_NAME: &str = "a.py";
pub const SCRIPT_CONTENTS: &[u8] = b"x";
pub const SCRIPT_CONTENTS_EDITED: &[u8] = b"y";

lazy_static! {
    /// Files of the raw data directory sent by `send` tests.
    pub static ref RAWDATA_FILES: Vec<(&'static str, &'static [u8])> = vec![
        ("events/run1.root", b"run 1".as_slice()),
        ("events/run2.root", b"run 2".as_slice()),
        ("README", b"two runs".as_slice()),
    ];
}

/// A registered project in a temporary directory, with its own local config
/// and a session driven by a dedicated runtime.
pub struct Sandbox {
    pub session: Session,
    pub project: Project,
    pub project_dir: TempDir,
    pub config_dir: TempDir,
    pub runtime: Runtime,
}

impl Sandbox {
    pub fn new() -> Self {
        let runtime = Runtime::new().expect("must create runtime");
        let config_dir = TempDir::new().expect("must create config dir");
        let project_dir = TempDir::new().expect("must create project dir");

        let local_config = LocalConfig::at(config_dir.path());
        let project = create_project(&local_config, PROJECT_NAME, project_dir.path())
            .expect("must create project");
        let session = Session::new(runtime.handle().clone(), local_config);

        Self {
            session,
            project,
            project_dir,
            config_dir,
            runtime,
        }
    }

    pub fn root(&self) -> &Path {
        self.project.root()
    }

    /// Absolute path of the node at `invariant_path`.
    pub fn path(&self, invariant_path: &str) -> PathBuf {
        self.root().join(invariant_path)
    }

    pub fn node(&self, invariant_path: &str) -> Node {
        Node::open(self.root(), self.path(invariant_path))
    }

    /// The directory at `invariant_path`, created with its parents if missing.
    pub fn directory(&self, invariant_path: &str) -> Directory {
        let mut current: Option<Directory> = None;
        let mut walked = String::new();
        for name in invariant_path.split('/') {
            if !walked.is_empty() {
                walked.push('/');
            }
            walked.push_str(name);
            current = Some(match self.node(&walked) {
                Node::Directory(directory) => directory,
                _ => {
                    let created = match &current {
                        Some(parent) => parent.create_directory(name),
                        None => self.project.create_directory(name),
                    };
                    created.expect("must create directory")
                }
            });
        }
        current.expect("invariant path must not be empty")
    }

    fn parent(&self, invariant_path: &str) -> (Box<dyn Container>, String) {
        match invariant_path.rsplit_once('/') {
            Some((parent, name)) => (Box::new(self.directory(parent)), name.to_string()),
            None => (Box::new(self.project.clone()), invariant_path.to_string()),
        }
    }

    /// Creates a task holding `a.py` with [SCRIPT_CONTENTS].
    pub fn task(&self, invariant_path: &str) -> Task {
        let (parent, name) = self.parent(invariant_path);
        let task = parent.create_task(&name).expect("must create task");
        std::fs::write(task.path().join(SCRIPT_NAME), SCRIPT_CONTENTS).expect("must write script");
        task
    }

    pub fn algorithm(&self, invariant_path: &str) -> Algorithm {
        let (parent, name) = self.parent(invariant_path);
        let algorithm = parent
            .create_algorithm(&name)
            .expect("must create algorithm");
        algorithm
            .add_command("python a.py")
            .expect("must add command");
        algorithm
    }

    pub fn data(&self, invariant_path: &str) -> Task {
        let (parent, name) = self.parent(invariant_path);
        parent.create_data(&name).expect("must create data task")
    }

    /// Writes [RAWDATA_FILES] below a fresh directory outside the project.
    pub fn rawdata_dir(&self) -> TempDir {
        let dir = TempDir::new().expect("must create data dir");
        for (name, contents) in RAWDATA_FILES.iter() {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("must create data subdir");
            }
            std::fs::write(path, contents).expect("must write data file");
        }
        dir
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}
