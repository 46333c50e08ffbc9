use std::path::{Path, PathBuf};

use tracing::info;

use super::{HasConfig, ObjectHandle, ObjectType};
use crate::config::{ConfigFile, LocalConfig, Table};
use crate::fsutil::{self, CHERN_DIR, PROJECT_MARKER, README_FILE};
use crate::impression::IMPRESSIONS_DIR;
use crate::Error;

pub const CHERN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Names that collide with shell subcommands.
pub const RESERVED_PROJECT_NAMES: &[&str] = &["config", "new", "projects", "start"];

/// Default runner service location written into new projects.
pub const DEFAULT_SERVER_URL: &str = "localhost:5000";

/// The root node of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project(pub(crate) ObjectHandle);

impl Project {
    /// Opens the project rooted exactly at `root`.
    pub fn open(root: &Path) -> Result<Project, Error> {
        if !root.join(CHERN_DIR).join(PROJECT_MARKER).is_file() {
            return Err(Error::NotInProject(root.to_path_buf()));
        }
        Ok(Project(ObjectHandle::new(root, root)))
    }

    /// Opens the project containing `path`.
    pub fn containing(path: &Path) -> Result<Project, Error> {
        Project::open(&fsutil::project_root_of(path)?)
    }

    pub fn root(&self) -> &Path {
        self.0.root()
    }

    pub fn name(&self) -> String {
        self.root()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn impressions_dir(&self) -> PathBuf {
        self.root().join(CHERN_DIR).join(IMPRESSIONS_DIR)
    }

    /// `.chern/hosts.json`, holding the runner service location.
    pub fn hosts_file(&self) -> ConfigFile {
        ConfigFile::new(self.root().join(CHERN_DIR).join("hosts.json"))
    }

    pub fn serverurl(&self) -> Result<String, Error> {
        Ok(self
            .hosts_file()
            .read_variable::<String>("serverurl")?
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()))
    }

    pub fn set_serverurl(&self, url: &str) -> Result<(), Error> {
        self.hosts_file().write_variable("serverurl", url)
    }

    pub fn chern_version(&self) -> Result<Option<String>, Error> {
        ConfigFile::new(self.root().join(CHERN_DIR).join(PROJECT_MARKER))
            .read_variable("chern_version")
    }
}

fn validate_project_name(name: &str) -> Result<(), Error> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || RESERVED_PROJECT_NAMES.contains(&name)
    {
        return Err(Error::InvalidTarget(format!(
            "{:?} cannot be used as a project name",
            name
        )));
    }
    Ok(())
}

/// Turns `path` into a new project named `name`, registers it in `local_config`
/// and makes it the current project.
pub fn create_project(
    local_config: &LocalConfig,
    name: &str,
    path: &Path,
) -> Result<Project, Error> {
    validate_project_name(name)?;
    if let Ok(root) = fsutil::project_root_of(path) {
        return Err(Error::InvalidTarget(format!(
            "{} is already inside the project at {}",
            path.display(),
            root.display()
        )));
    }
    if local_config.project_path(name)?.is_some() {
        return Err(Error::ConstraintViolation(format!(
            "a project named {} is already registered",
            name
        )));
    }

    let impressions = path.join(CHERN_DIR).join(IMPRESSIONS_DIR);
    std::fs::create_dir_all(&impressions).map_err(Error::io(&impressions))?;

    let marker = ConfigFile::new(path.join(CHERN_DIR).join(PROJECT_MARKER));
    let mut table = Table::new();
    marker.set_in(&mut table, "object_type", &ObjectType::Project)?;
    marker.set_in(&mut table, "chern_version", CHERN_VERSION)?;
    marker.write(&table)?;

    let project = Project(ObjectHandle::new(path, path));
    project
        .config_file()
        .write_variable("object_type", &ObjectType::Project)?;
    project.set_serverurl(DEFAULT_SERVER_URL)?;
    if !path.join(README_FILE).exists() {
        project.set_readme(&format!("# {}\n", name))?;
    }

    local_config.register_project(name, path)?;
    local_config.set_current_project(name)?;
    info!(name, path = %path.display(), "created project");
    Ok(project)
}
