//! Flat key-value files: per-node `.chern/config.json`, user-editable
//! `chern.yaml`, and the per-user [LocalConfig].
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::fsutil::write_atomic;
use crate::Error;

/// The decoded contents of a key-value file.
pub type Table = BTreeMap<String, serde_json::Value>;

/// Encoding of a [KeyValueFile] on disk.
pub trait Format {
    fn decode(path: &Path, bytes: &[u8]) -> Result<Table, Error>;
    fn encode(path: &Path, table: &Table) -> Result<Vec<u8>, Error>;
}

#[derive(Debug, Clone, Copy)]
pub struct Json;

impl Format for Json {
    fn decode(path: &Path, bytes: &[u8]) -> Result<Table, Error> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Table::new());
        }
        serde_json::from_slice(bytes).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    fn encode(path: &Path, table: &Table) -> Result<Vec<u8>, Error> {
        serde_json::to_vec_pretty(table).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Yaml;

impl Format for Yaml {
    fn decode(path: &Path, bytes: &[u8]) -> Result<Table, Error> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Table::new());
        }
        // a document holding only `~` or a comment decodes to no table at all
        let table: Option<Table> = serde_yaml::from_slice(bytes).map_err(|source| Error::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(table.unwrap_or_default())
    }

    fn encode(path: &Path, table: &Table) -> Result<Vec<u8>, Error> {
        serde_yaml::to_string(table)
            .map(String::into_bytes)
            .map_err(|source| Error::Yaml {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// A file holding a flat string-keyed map. A missing file reads as empty.
/// Every write replaces the whole file atomically and keeps keys it does not touch.
#[derive(Debug, Clone)]
pub struct KeyValueFile<F> {
    path: PathBuf,
    _format: PhantomData<F>,
}

/// A node's `.chern/config.json`.
pub type ConfigFile = KeyValueFile<Json>;
/// A node's `chern.yaml`.
pub type YamlFile = KeyValueFile<Yaml>;

impl<F: Format> KeyValueFile<F> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _format: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn read(&self) -> Result<Table, Error> {
        match std::fs::read(&self.path) {
            Ok(bytes) => F::decode(&self.path, &bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Table::new()),
            Err(e) => Err(Error::io(&self.path)(e)),
        }
    }

    pub fn write(&self, table: &Table) -> Result<(), Error> {
        write_atomic(&self.path, &F::encode(&self.path, table)?)
    }

    /// Reads `key`, returning `None` if it is absent or null.
    pub fn read_variable<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        match self.read()?.remove(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| Error::Json {
                    path: self.path.clone(),
                    source,
                }),
        }
    }

    /// Reads `key`, falling back to `T::default()`.
    pub fn read_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, Error> {
        Ok(self.read_variable(key)?.unwrap_or_default())
    }

    pub fn write_variable<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), Error> {
        let value = self.to_value(value)?;
        self.update(|table| {
            table.insert(key.to_string(), value);
            Ok(())
        })
    }

    /// Read-modify-write of the whole table as one replacement.
    /// The file is only rewritten if `f` changed something.
    pub fn update<R>(&self, f: impl FnOnce(&mut Table) -> Result<R, Error>) -> Result<R, Error> {
        let before = self.read()?;
        let mut table = before.clone();
        let result = f(&mut table)?;
        if table != before {
            self.write(&table)?;
        }
        Ok(result)
    }

    /// Decodes `key` out of a table obtained from this file, defaulting when absent.
    pub fn get_from<T: DeserializeOwned + Default>(
        &self,
        table: &Table,
        key: &str,
    ) -> Result<T, Error> {
        match table.get(key) {
            None | Some(serde_json::Value::Null) => Ok(T::default()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|source| Error::Json {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn set_in<T: Serialize + ?Sized>(
        &self,
        table: &mut Table,
        key: &str,
        value: &T,
    ) -> Result<(), Error> {
        table.insert(key.to_string(), self.to_value(value)?);
        Ok(())
    }

    pub fn to_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<serde_json::Value, Error> {
        serde_json::to_value(value).map_err(|source| Error::Json {
            path: self.path.clone(),
            source,
        })
    }
}

/// Environment variable overriding the directory of the [LocalConfig].
pub const CONFIG_DIR_ENV: &str = "CHERN_CONFIG_DIR";

/// Per-user registry of known projects and the current one,
/// stored in `$HOME/.chern/config.json`.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    file: ConfigFile,
}

impl LocalConfig {
    /// Opens the registry in `$CHERN_CONFIG_DIR`, or `$HOME/.chern`.
    pub fn open_default() -> Result<Self, Error> {
        let dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or_else(|| Error::InvalidTarget("unable to determine home directory".into()))?
                .join(crate::fsutil::CHERN_DIR),
        };
        Ok(Self::at(dir))
    }

    pub fn at(dir: impl AsRef<Path>) -> Self {
        Self {
            file: ConfigFile::new(dir.as_ref().join(crate::fsutil::CONFIG_FILE)),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn projects(&self) -> Result<BTreeMap<String, PathBuf>, Error> {
        self.file.read_or_default("projects_path")
    }

    pub fn project_path(&self, name: &str) -> Result<Option<PathBuf>, Error> {
        Ok(self.projects()?.remove(name))
    }

    pub fn register_project(&self, name: &str, path: &Path) -> Result<(), Error> {
        let mut projects = self.projects()?;
        projects.insert(name.to_string(), path.to_path_buf());
        self.file.write_variable("projects_path", &projects)
    }

    /// Forgets a project. Clears the current project if it was this one.
    pub fn unregister_project(&self, name: &str) -> Result<(), Error> {
        let mut projects = self.projects()?;
        if projects.remove(name).is_none() {
            return Err(Error::InvalidTarget(format!("no project named {}", name)));
        }
        let projects = self.file.to_value(&projects)?;
        let current = self.current_project()?;
        self.file.update(|table| {
            table.insert("projects_path".into(), projects);
            if current.as_deref() == Some(name) {
                table.insert("current_project".into(), serde_json::Value::String("".into()));
            }
            Ok(())
        })
    }

    pub fn current_project(&self) -> Result<Option<String>, Error> {
        Ok(self
            .file
            .read_variable::<String>("current_project")?
            .filter(|name| !name.is_empty()))
    }

    pub fn set_current_project(&self, name: &str) -> Result<(), Error> {
        if self.project_path(name)?.is_none() {
            return Err(Error::InvalidTarget(format!("no project named {}", name)));
        }
        self.file.write_variable("current_project", name)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_reads_empty() {
        let tmpdir = TempDir::new().unwrap();
        let file = ConfigFile::new(tmpdir.path().join(".chern/config.json"));
        assert_eq!(None, file.read_variable::<String>("impression").unwrap());
        assert_eq!(
            Vec::<String>::new(),
            file.read_or_default::<Vec<String>>("predecessors").unwrap()
        );
    }

    #[test]
    fn json_round_trip_keeps_other_keys() {
        let tmpdir = TempDir::new().unwrap();
        let file = ConfigFile::new(tmpdir.path().join(".chern/config.json"));
        file.write_variable("object_type", "task").unwrap();
        file.write_variable("predecessors", &vec!["tasks/t0"]).unwrap();

        assert_eq!(
            Some("task".to_string()),
            file.read_variable("object_type").unwrap()
        );
        assert_eq!(
            Some(vec!["tasks/t0".to_string()]),
            file.read_variable("predecessors").unwrap()
        );
        let reread: Table =
            serde_json::from_slice(&std::fs::read(file.path()).unwrap()).unwrap();
        assert_eq!(file.read().unwrap(), reread);
    }

    #[test]
    fn yaml_write_preserves_user_keys() {
        let tmpdir = TempDir::new().unwrap();
        let path = tmpdir.path().join("chern.yaml");
        std::fs::write(&path, "environment: rawdata\nmy_note: keep me\n").unwrap();

        let file = YamlFile::new(&path);
        file.write_variable("kubernetes_memory_limit", "256Mi").unwrap();

        assert_eq!(
            Some("keep me".to_string()),
            file.read_variable("my_note").unwrap()
        );
        assert_eq!(
            Some("rawdata".to_string()),
            file.read_variable("environment").unwrap()
        );
    }

    #[test]
    fn yaml_comment_only_file_is_empty() {
        let tmpdir = TempDir::new().unwrap();
        let path = tmpdir.path().join("chern.yaml");
        std::fs::write(&path, "# nothing here\n").unwrap();
        assert!(YamlFile::new(&path).read().unwrap().is_empty());
    }

    #[test]
    fn malformed_json_is_reported() {
        let tmpdir = TempDir::new().unwrap();
        let path = tmpdir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ConfigFile::new(&path).read(),
            Err(Error::Json { .. })
        ));
    }

    #[test]
    fn local_config_projects() {
        let tmpdir = TempDir::new().unwrap();
        let config = LocalConfig::at(tmpdir.path());
        assert_eq!(None, config.current_project().unwrap());

        config
            .register_project("demo", Path::new("/data/demo"))
            .unwrap();
        config.set_current_project("demo").unwrap();
        assert_eq!(Some("demo".to_string()), config.current_project().unwrap());
        assert_eq!(
            Some(PathBuf::from("/data/demo")),
            config.project_path("demo").unwrap()
        );

        assert!(matches!(
            config.set_current_project("other"),
            Err(Error::InvalidTarget(_))
        ));

        config.unregister_project("demo").unwrap();
        assert_eq!(None, config.current_project().unwrap());
        assert!(config.projects().unwrap().is_empty());
    }
}
