//! Filesystem helpers shared by the object graph and the impression engine.
use std::ffi::OsStr;
use std::fs;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use data_encoding::HEXLOWER;
use md5::{Digest, Md5};
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::Error;

/// Name of the per-node metadata directory.
pub const CHERN_DIR: &str = ".chern";
/// Per-node config file, inside [CHERN_DIR].
pub const CONFIG_FILE: &str = "config.json";
/// Marker file identifying the project root, inside [CHERN_DIR].
pub const PROJECT_MARKER: &str = "project.json";
/// User-editable settings of a task or algorithm.
pub const SETTINGS_FILE: &str = "chern.yaml";
pub const README_FILE: &str = "README.md";

const UNDO_TREE_SUFFIX: &str = "~undo-tree~";

/// Walks up from `path` until a directory containing `.chern/project.json` is found.
pub fn project_root_of(path: &Path) -> Result<PathBuf, Error> {
    let mut current = Some(path);
    while let Some(dir) = current {
        if dir.join(CHERN_DIR).join(PROJECT_MARKER).is_file() {
            return Ok(dir.to_path_buf());
        }
        current = dir.parent();
    }
    Err(Error::NotInProject(path.to_path_buf()))
}

/// Names never captured by an impression.
fn is_excluded(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    name.starts_with('.') || name.ends_with(UNDO_TREE_SUFFIX)
}

/// One directory of a [tree_excluded] listing: its path relative to the walked
/// root (`"."` for the root itself), its subdirectories and its files.
/// Serializes as a three-element JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry(pub String, pub Vec<String>, pub Vec<String>);

impl TreeEntry {
    pub fn dirpath(&self) -> &str {
        &self.0
    }

    pub fn subdirs(&self) -> &[String] {
        &self.1
    }

    pub fn files(&self) -> &[String] {
        &self.2
    }

    /// Path of `name` relative to the walked root, `/`-separated.
    pub fn member(&self, name: &str) -> String {
        if self.0 == "." {
            name.to_string()
        } else {
            format!("{}/{}", self.0, name)
        }
    }
}

/// Lists `path` in pre-order with lexicographically sorted siblings, skipping
/// `.chern`, dotfiles and editor undo files.
pub fn tree_excluded(path: &Path) -> Result<Vec<TreeEntry>, Error> {
    let walker = WalkDir::new(path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_excluded(entry.file_name()));

    let mut tree = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let mut subdirs = Vec::new();
        let mut files = Vec::new();
        for child in fs::read_dir(entry.path()).map_err(Error::io(entry.path()))? {
            let child = child.map_err(Error::io(entry.path()))?;
            if is_excluded(&child.file_name()) {
                continue;
            }
            let name = child.file_name().to_string_lossy().into_owned();
            if child.file_type().map_err(Error::io(child.path()))?.is_dir() {
                subdirs.push(name);
            } else {
                files.push(name);
            }
        }
        subdirs.sort();
        files.sort();

        let relative = entry
            .path()
            .strip_prefix(path)
            .expect("Chern bug: failed to strip root path prefix");
        let dirpath = if relative.as_os_str().is_empty() {
            ".".to_string()
        } else {
            slash_path(relative)
        };
        tree.push(TreeEntry(dirpath, subdirs, files));
    }
    Ok(tree)
}

/// Joins the normal components of a relative path with `/`.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Latest modification time of anything below `path`, `.chern` and `.git` excluded.
pub fn dir_mtime(path: &Path) -> Result<SystemTime, Error> {
    let walker = WalkDir::new(path).into_iter().filter_entry(|entry| {
        entry.depth() == 0 || (entry.file_name() != CHERN_DIR && entry.file_name() != ".git")
    });

    let mut latest = SystemTime::UNIX_EPOCH;
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // files may vanish between listing and stat
            Err(e) if e.io_error().map(|e| e.kind()) == Some(std::io::ErrorKind::NotFound) => {
                continue
            }
            Err(e) => return Err(e.into()),
        };
        let mtime = entry
            .metadata()?
            .modified()
            .map_err(Error::io(entry.path()))?;
        latest = latest.max(mtime);
    }
    Ok(latest)
}

/// Lowercase hex MD5 of a file's contents.
pub fn md5sum(path: &Path) -> Result<String, Error> {
    let mut file = fs::File::open(path).map_err(Error::io(path))?;
    let mut hasher = Md5::new();
    std::io::copy(&mut file, &mut hasher).map_err(Error::io(path))?;
    Ok(HEXLOWER.encode(&hasher.finalize()))
}

/// MD5 over the concatenated, sorted MD5s of every regular file below `dir`.
pub fn dir_md5(dir: &Path) -> Result<String, Error> {
    let mut digests = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_file() {
            digests.push(md5sum(entry.path())?);
        }
    }
    digests.sort();

    let mut hasher = Md5::new();
    for digest in &digests {
        hasher.update(digest.as_bytes());
    }
    Ok(HEXLOWER.encode(&hasher.finalize()))
}

/// Compares two files byte by byte. A missing `right` compares unequal.
pub fn files_equal(left: &Path, right: &Path) -> Result<bool, Error> {
    let mut right_file = match fs::File::open(right) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::io(right)(e)),
    };
    let mut left_file = fs::File::open(left).map_err(Error::io(left))?;

    let left_len = left_file.metadata().map_err(Error::io(left))?.len();
    let right_len = right_file.metadata().map_err(Error::io(right))?.len();
    if left_len != right_len {
        return Ok(false);
    }

    let mut left_buf = [0u8; 8192];
    let mut right_buf = [0u8; 8192];
    loop {
        let n = left_file.read(&mut left_buf).map_err(Error::io(left))?;
        if n == 0 {
            return Ok(true);
        }
        right_file
            .read_exact(&mut right_buf[..n])
            .map_err(Error::io(right))?;
        if left_buf[..n] != right_buf[..n] {
            return Ok(false);
        }
    }
}

/// Replaces the file at `path` by writing a sibling temporary file and renaming it over.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), Error> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::InvalidTarget(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(dir).map_err(Error::io(dir))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(Error::io(dir))?;
    tmp.write_all(contents).map_err(Error::io(tmp.path()))?;
    tmp.as_file().sync_all().map_err(Error::io(tmp.path()))?;
    tmp.persist(path).map_err(|e| Error::io(path)(e.error))?;
    Ok(())
}

/// Recursively copies `src` to `dst`, which must not exist yet.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<(), Error> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .expect("Chern bug: failed to strip root path prefix");
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(Error::io(&target))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(Error::io(entry.path()))?;
            symlink(&link, &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(Error::io(&target))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(link: &Path, target: &Path) -> Result<(), Error> {
    std::os::unix::fs::symlink(link, target).map_err(Error::io(target))
}

#[cfg(not(unix))]
fn symlink(link: &Path, target: &Path) -> Result<(), Error> {
    fs::copy(link, target).map_err(Error::io(target))?;
    Ok(())
}

/// Resolves `relative` against `base` lexically, failing if the result leaves `base`.
pub fn normalize_within(base: &Path, relative: &str) -> Result<PathBuf, Error> {
    let joined = base.join(relative).clean();
    if !joined.starts_with(base) {
        return Err(Error::InvalidTarget(format!(
            "{} escapes {}",
            relative,
            base.display()
        )));
    }
    Ok(joined)
}

/// True for `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn tree_excluded_skips_hidden_and_undo_files() {
        let tmpdir = TempDir::new().unwrap();
        let root = tmpdir.path();
        fs::create_dir_all(root.join(".chern")).unwrap();
        fs::create_dir_all(root.join("b/inner")).unwrap();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("z.py"), "z").unwrap();
        fs::write(root.join("chern.yaml"), "").unwrap();
        fs::write(root.join(".hidden"), "").unwrap();
        fs::write(root.join("notes.txt~undo-tree~"), "").unwrap();
        fs::write(root.join("b/inner/data.csv"), "1,2").unwrap();
        fs::write(root.join("a/x"), "x").unwrap();

        assert_eq!(
            vec![
                TreeEntry(
                    ".".into(),
                    vec!["a".into(), "b".into()],
                    vec!["chern.yaml".into(), "z.py".into()]
                ),
                TreeEntry("a".into(), vec![], vec!["x".into()]),
                TreeEntry("b".into(), vec!["inner".into()], vec![]),
                TreeEntry("b/inner".into(), vec![], vec!["data.csv".into()]),
            ],
            tree_excluded(root).unwrap()
        );
    }

    #[test]
    fn tree_entry_serializes_as_array() {
        let entry = TreeEntry(".".into(), vec![], vec!["a.py".into(), "chern.yaml".into()]);
        assert_eq!(
            r#"[".",[],["a.py","chern.yaml"]]"#,
            serde_json::to_string(&entry).unwrap()
        );
    }

    #[test]
    fn dir_md5_ignores_file_placement() {
        let left = TempDir::new().unwrap();
        let right = TempDir::new().unwrap();
        fs::write(left.path().join("one"), "1").unwrap();
        fs::write(left.path().join("two"), "2").unwrap();
        fs::create_dir(right.path().join("nested")).unwrap();
        fs::write(right.path().join("nested/two"), "2").unwrap();
        fs::write(right.path().join("one"), "1").unwrap();

        let digest = dir_md5(left.path()).unwrap();
        assert_eq!(digest, dir_md5(right.path()).unwrap());
        assert_eq!(digest, dir_md5(left.path()).unwrap());
        assert_eq!(32, digest.len());

        fs::write(right.path().join("one"), "one").unwrap();
        assert_ne!(digest, dir_md5(right.path()).unwrap());
    }

    #[test]
    fn md5sum_of_known_content() {
        let tmpdir = TempDir::new().unwrap();
        let file = tmpdir.path().join("x");
        fs::write(&file, "x").unwrap();
        assert_eq!("9dd4e461268c8034f5c8564e155c67a6", md5sum(&file).unwrap());
    }

    #[test]
    fn dir_mtime_ignores_chern_dir() {
        let tmpdir = TempDir::new().unwrap();
        let root = tmpdir.path();
        fs::create_dir(root.join(".chern")).unwrap();
        fs::write(root.join("a"), "a").unwrap();
        let before = dir_mtime(root).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(root.join(".chern/config.json"), "{}").unwrap();
        assert_eq!(before, dir_mtime(root).unwrap());

        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(root.join("a"), "b").unwrap();
        assert!(dir_mtime(root).unwrap() > before);
    }

    #[test]
    fn project_root_is_found_from_below() {
        let tmpdir = TempDir::new().unwrap();
        let root = tmpdir.path();
        fs::create_dir_all(root.join(".chern")).unwrap();
        fs::write(root.join(".chern/project.json"), "{}").unwrap();
        fs::create_dir_all(root.join("tasks/t1")).unwrap();

        assert_eq!(root, project_root_of(&root.join("tasks/t1")).unwrap());
        assert!(matches!(
            project_root_of(&root.parent().unwrap().join("elsewhere")),
            Err(Error::NotInProject(_))
        ));
    }

    #[rstest]
    #[case::plain("tasks/t1", Some("tasks/t1"))]
    #[case::dots("tasks/../algorithms/./a", Some("algorithms/a"))]
    #[case::itself(".", Some(""))]
    #[case::escape("../outside", None)]
    #[case::sneaky_escape("tasks/../../outside", None)]
    #[case::absolute("/etc", None)]
    fn normalize(#[case] relative: &str, #[case] expected: Option<&str>) {
        let base = Path::new("/projects/demo");
        match expected {
            Some(expected) => assert_eq!(
                base.join(expected).clean(),
                normalize_within(base, relative).unwrap()
            ),
            None => assert!(matches!(
                normalize_within(base, relative),
                Err(Error::InvalidTarget(_))
            )),
        }
    }

    #[rstest]
    #[case::simple("data", true)]
    #[case::underscore("_x1", true)]
    #[case::digit_first("1x", false)]
    #[case::dash("a-b", false)]
    #[case::empty("", false)]
    fn identifiers(#[case] s: &str, #[case] valid: bool) {
        assert_eq!(valid, is_identifier(s));
    }
}
