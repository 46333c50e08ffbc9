//! Impressions: immutable snapshots of a task or algorithm, addressed by uuid.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fsutil::{TreeEntry, CHERN_DIR};
use crate::object::ObjectType;
use crate::Error;

mod engine;
pub mod pack;

pub use engine::LocalStatus;

/// Directory below `.chern/` holding every impression of a project.
pub const IMPRESSIONS_DIR: &str = "impressions";

/// A fresh impression uuid: 32 lowercase hex characters.
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// The `config.json` stored inside an impression directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpressionConfig {
    pub object_type: ObjectType,
    pub tree: Vec<TreeEntry>,
    pub dependencies: Vec<String>,
    pub parents: Vec<String>,
    pub current_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_to_impression: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Impression {
    uuid: String,
    path: PathBuf,
}

impl Impression {
    pub fn new(root: &Path, uuid: impl Into<String>) -> Self {
        let uuid = uuid.into();
        let path = root.join(CHERN_DIR).join(IMPRESSIONS_DIR).join(&uuid);
        Self { uuid, path }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contents_path(&self) -> PathBuf {
        self.path.join("contents")
    }

    pub fn config_path(&self) -> PathBuf {
        self.path.join("config.json")
    }

    /// Name the archive is uploaded under.
    pub fn tarball_name(&self) -> String {
        format!("{}.tar.gz", self.uuid)
    }

    pub fn tarball_path(&self) -> PathBuf {
        self.path.join(format!("packed{}.tar.gz", self.uuid))
    }

    /// True if the impression directory is gone.
    pub fn is_zombie(&self) -> bool {
        !self.path.is_dir()
    }

    pub fn config(&self) -> Result<ImpressionConfig, Error> {
        let path = self.config_path();
        let bytes = std::fs::read(&path).map_err(Error::io(&path))?;
        serde_json::from_slice(&bytes).map_err(|source| Error::Json { path, source })
    }

    pub(crate) fn write_config(&self, config: &ImpressionConfig) -> Result<(), Error> {
        let path = self.config_path();
        let bytes = serde_json::to_vec_pretty(config).map_err(|source| Error::Json {
            path: path.clone(),
            source,
        })?;
        crate::fsutil::write_atomic(&path, &bytes)
    }

    pub fn tree(&self) -> Result<Vec<TreeEntry>, Error> {
        Ok(self.config()?.tree)
    }

    pub fn dependencies(&self) -> Result<Vec<String>, Error> {
        Ok(self.config()?.dependencies)
    }

    /// Earlier impressions of the same node, oldest first.
    pub fn parents(&self) -> Result<Vec<String>, Error> {
        Ok(self.config()?.parents)
    }

    /// Deletes the unpacked `contents/`. The archive and config stay.
    pub fn clean(&self) -> Result<(), Error> {
        let contents = self.contents_path();
        match std::fs::remove_dir_all(&contents) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&contents)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn uuid_shape() {
        let uuid = generate_uuid();
        assert_eq!(32, uuid.len());
        assert!(uuid
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_ne!(uuid, generate_uuid());
    }

    #[test]
    fn config_json_layout() {
        let config = ImpressionConfig {
            object_type: ObjectType::Task,
            tree: vec![TreeEntry(
                ".".into(),
                vec![],
                vec!["a.py".into(), "chern.yaml".into()],
            )],
            dependencies: vec![],
            parents: vec![],
            current_path: "tasks/t1".into(),
            alias_to_impression: None,
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(
            serde_json::json!({
                "object_type": "task",
                "tree": [[".", [], ["a.py", "chern.yaml"]]],
                "dependencies": [],
                "parents": [],
                "current_path": "tasks/t1",
            }),
            json
        );
        assert_eq!(config, serde_json::from_value(json).unwrap());
    }

    #[test]
    fn paths() {
        let impression = Impression::new(Path::new("/p"), "0123");
        assert_eq!(Path::new("/p/.chern/impressions/0123"), impression.path());
        assert_eq!(
            Path::new("/p/.chern/impressions/0123/packed0123.tar.gz"),
            impression.tarball_path()
        );
        assert_eq!("0123.tar.gz", impression.tarball_name());
        assert!(impression.is_zombie());
    }
}
