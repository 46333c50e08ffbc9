use std::collections::BTreeMap;

use tracing::info;

use super::task::{DEFAULT_ENVIRONMENT, DEFAULT_MEMORY_LIMIT, RAWDATA_ENVIRONMENT};
use super::{Algorithm, HasConfig, ObjectHandle, ObjectType, Project, Task};
use crate::config::Table;
use crate::fsutil::CHERN_DIR;
use crate::Error;

/// A plain container of other nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory(pub(crate) ObjectHandle);

/// Nodes that may hold child nodes: the project and directories.
pub trait Container: HasConfig {
    fn create_directory(&self, name: &str) -> Result<Directory, Error> {
        create_node(self.handle(), name, ObjectType::Directory, None).map(Directory)
    }

    fn create_task(&self, name: &str) -> Result<Task, Error> {
        let settings = settings(&[
            ("environment", DEFAULT_ENVIRONMENT.into()),
            ("kubernetes_memory_limit", DEFAULT_MEMORY_LIMIT.into()),
            ("parameters", serde_json::Value::Object(Default::default())),
            ("alias", serde_json::Value::Array(vec![])),
        ]);
        create_node(self.handle(), name, ObjectType::Task, Some(settings)).map(Task)
    }

    fn create_algorithm(&self, name: &str) -> Result<Algorithm, Error> {
        let settings = settings(&[
            ("environment", DEFAULT_ENVIRONMENT.into()),
            ("commands", serde_json::Value::Array(vec![])),
        ]);
        create_node(self.handle(), name, ObjectType::Algorithm, Some(settings)).map(Algorithm)
    }

    /// Creates a task holding raw data, whose execution is a data upload.
    fn create_data(&self, name: &str) -> Result<Task, Error> {
        let settings = settings(&[
            ("environment", RAWDATA_ENVIRONMENT.into()),
            ("alias", serde_json::Value::Array(vec![])),
        ]);
        create_node(self.handle(), name, ObjectType::Task, Some(settings)).map(Task)
    }
}

impl Container for Project {}
impl Container for Directory {}

fn settings(entries: &[(&str, serde_json::Value)]) -> Table {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.ends_with("~undo-tree~")
    {
        return Err(Error::InvalidTarget(format!(
            "{:?} is not a valid object name",
            name
        )));
    }
    Ok(())
}

/// Creates the directory of a new node below `parent`, then its config and settings.
fn create_node(
    parent: &ObjectHandle,
    name: &str,
    object_type: ObjectType,
    settings: Option<Table>,
) -> Result<ObjectHandle, Error> {
    validate_name(name)?;
    match parent.object_type() {
        Some(ObjectType::Project | ObjectType::Directory) => {}
        _ => {
            return Err(Error::InvalidTarget(format!(
                "{} is not a directory, cannot create {} in it",
                parent, name
            )))
        }
    }

    let path = parent.path().join(name);
    if path.exists() {
        return Err(Error::ConstraintViolation(format!(
            "{} already exists",
            path.display()
        )));
    }
    let chern_dir = path.join(CHERN_DIR);
    std::fs::create_dir_all(&chern_dir).map_err(Error::io(&chern_dir))?;

    let handle = ObjectHandle::new(parent.root(), path);
    let config = handle.config_file();
    let mut table = Table::new();
    config.set_in(&mut table, "object_type", &object_type)?;
    if matches!(object_type, ObjectType::Task | ObjectType::Algorithm) {
        config.set_in(&mut table, "predecessors", &Vec::<String>::new())?;
        config.set_in(&mut table, "successors", &Vec::<String>::new())?;
        config.set_in(&mut table, "alias_to_path", &BTreeMap::<String, String>::new())?;
        config.set_in(&mut table, "path_to_alias", &BTreeMap::<String, String>::new())?;
        config.set_in(&mut table, "impression", "")?;
    }
    if object_type == ObjectType::Task {
        config.set_in(&mut table, "auto_download", &false)?;
        config.set_in(&mut table, "default_runner", "local")?;
    }
    config.write(&table)?;

    if let Some(settings) = settings {
        handle.yaml_file().write(&settings)?;
    }

    info!(path = %handle, %object_type, "created");
    Ok(handle)
}
