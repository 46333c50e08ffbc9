//! Reproducible gzip tarballs of impression contents.
//!
//! Members are written in tree order with zeroed timestamps and owners, so the
//! same contents always produce the same bytes.
use std::path::Path;

use async_compression::tokio::bufread::GzipDecoder;
use async_compression::tokio::write::GzipEncoder;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_stream::StreamExt;
use tokio_tar::{Archive, Builder, EntryType, Header};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::fsutil::{slash_path, TreeEntry};

/// Prefix of the members holding the node's files.
pub const CONTENTS_PREFIX: &str = "contents";
/// Prefix of the members holding uploaded raw data.
pub const RAWDATA_PREFIX: &str = "rawdata";

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}

async fn append_file<W>(builder: &mut Builder<W>, source: &Path, member: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let file = File::open(source).await?;
    let metadata = file.metadata().await?;

    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(metadata.len());
    header.set_mode(if is_executable(&metadata) { 0o755 } else { 0o644 });
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);

    builder.append_data(&mut header, member, file).await
}

async fn append_dir<W>(builder: &mut Builder<W>, member: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);

    builder
        .append_data(&mut header, format!("{}/", member), tokio::io::empty())
        .await
}

async fn finish<W>(builder: Builder<GzipEncoder<W>>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut encoder = builder.into_inner().await?;
    encoder.shutdown().await
}

/// Packs every file listed in `tree` from `contents` into a gzip tarball at `dest`,
/// as `contents/<dirpath>/<name>`. Subdirectories get their own members so
/// empty ones survive an unpack.
#[instrument(skip(tree), err)]
pub async fn pack(contents: &Path, tree: &[TreeEntry], dest: &Path) -> std::io::Result<()> {
    let mut builder = Builder::new(GzipEncoder::new(File::create(dest).await?));
    for entry in tree {
        for name in entry.subdirs() {
            let member = format!("{}/{}", CONTENTS_PREFIX, entry.member(name));
            append_dir(&mut builder, &member).await?;
        }
        for name in entry.files() {
            let member = entry.member(name);
            append_file(
                &mut builder,
                &contents.join(&member),
                &format!("{}/{}", CONTENTS_PREFIX, member),
            )
            .await?;
        }
    }
    finish(builder).await
}

/// Writes a copy of the tarball at `original` to `dest`, with every regular
/// file below `data_dir` appended as `rawdata/<relative path>`.
#[instrument(err)]
pub async fn pack_with_rawdata(
    original: &Path,
    data_dir: &Path,
    dest: &Path,
) -> std::io::Result<()> {
    let mut builder = Builder::new(GzipEncoder::new(File::create(dest).await?));

    let mut archive = open_archive(original).await?;
    let mut entries = archive.entries()?;
    while let Some(mut entry) = entries.try_next().await? {
        let mut header = entry.header().clone();
        let path = entry.path()?.into_owned();
        builder.append_data(&mut header, path, &mut entry).await?;
    }

    let mut data_files = Vec::new();
    for entry in WalkDir::new(data_dir).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            data_files.push(entry.into_path());
        }
    }
    for file in data_files {
        let relative = file
            .strip_prefix(data_dir)
            .expect("Chern bug: failed to strip root path prefix");
        let member = format!("{}/{}", RAWDATA_PREFIX, slash_path(relative));
        debug!(member, "appending raw data");
        append_file(&mut builder, &file, &member).await?;
    }

    finish(builder).await
}

async fn open_archive(path: &Path) -> std::io::Result<Archive<impl AsyncRead + Unpin + Send>> {
    let file = File::open(path).await?;
    Ok(Archive::new(GzipDecoder::new(BufReader::new(file))))
}

/// Extracts the tarball at `archive` below `dest`.
#[instrument(err)]
pub async fn unpack(archive: &Path, dest: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dest).await?;
    open_archive(archive).await?.unpack(dest).await
}

/// Lists the file members of the tarball at `archive`, in archive order.
/// Directory members are skipped.
pub async fn members(archive: &Path) -> std::io::Result<Vec<String>> {
    let mut archive = open_archive(archive).await?;
    let mut entries = archive.entries()?;
    let mut names = Vec::new();
    while let Some(entry) = entries.try_next().await? {
        if entry.header().entry_type().is_dir() {
            continue;
        }
        names.push(entry.path()?.to_string_lossy().into_owned());
    }
    Ok(names)
}
