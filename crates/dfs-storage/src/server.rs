//! Storage server backed by a directory of the local file system.
//!
//! A distributed path `/a/b` is stored as `{root}/a/b`. Single-file
//! operations go through `tokio::fs`; whole-tree walks run inside
//! `tokio::task::spawn_blocking`.

use std::io::{ErrorKind, SeekFrom};
use std::path::PathBuf;

use async_trait::async_trait;
use dfs_api::{Command, Storage, StorageStub};
use dfs_proto::{FsError, FsResult, Path};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Largest block requested from a peer in one `read` while copying.
pub const COPY_CHUNK: u32 = 1024 * 1024;

pub struct StorageServer {
    root: PathBuf,
}

impl StorageServer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Local location of `path`. Paths stepping through `.` or `..` are
    /// refused, so no call reaches outside the root.
    fn local(&self, path: &Path) -> FsResult<PathBuf> {
        path.to_local(&self.root)
    }

    /// Metadata of a regular file; directories count as absent.
    async fn file_meta(&self, file: &Path) -> FsResult<std::fs::Metadata> {
        let meta = fs::metadata(self.local(file)?)
            .await
            .map_err(|e| not_found_or_io(e, file))?;
        if meta.is_dir() {
            return Err(FsError::not_found(format!("{file} is a directory")));
        }
        Ok(meta)
    }

    /// Fail with `NotFound` unless the root is an existing directory.
    pub async fn check_root(&self) -> FsResult<()> {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(FsError::not_found(format!(
                "{} is not a directory",
                self.root.display()
            ))),
            Err(e) => Err(FsError::not_found(format!("{}: {}", self.root.display(), e))),
        }
    }

    /// Every regular file below the root.
    pub async fn list_files(&self) -> FsResult<Vec<Path>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || -> FsResult<Vec<Path>> {
            let mut files = Vec::new();
            collect_files(&root, &Path::root(), &mut files)?;
            files.sort();
            Ok(files)
        })
        .await
        .map_err(|e| FsError::Io(e.to_string()))?
    }

    /// Remove every directory below the root that contains no file, at any
    /// depth. The root itself is kept.
    pub async fn prune_empty_dirs(&self) -> FsResult<usize> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || -> FsResult<usize> {
            let mut removed = 0;
            for entry in std::fs::read_dir(&root)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    prune(&entry.path(), &mut removed)?;
                }
            }
            Ok(removed)
        })
        .await
        .map_err(|e| FsError::Io(e.to_string()))?
    }
}

fn not_found_or_io(e: std::io::Error, path: &Path) -> FsError {
    match e.kind() {
        ErrorKind::NotFound => FsError::not_found(path),
        _ => FsError::Io(format!("{path}: {e}")),
    }
}

fn collect_files(dir: &std::path::Path, prefix: &Path, out: &mut Vec<Path>) -> FsResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            warn!("skipping non UTF-8 name in {}", dir.display());
            continue;
        };
        let path = match prefix.child(&name) {
            Ok(path) => path,
            Err(e) => {
                warn!("skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if entry.file_type()?.is_dir() {
            collect_files(&entry.path(), &path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Returns whether `dir` was empty of files and got removed.
fn prune(dir: &std::path::Path, removed: &mut usize) -> std::io::Result<bool> {
    let mut empty = true;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            empty &= prune(&entry.path(), removed)?;
        } else {
            empty = false;
        }
    }
    if empty {
        std::fs::remove_dir(dir)?;
        *removed += 1;
        debug!("pruned empty directory {}", dir.display());
    }
    Ok(empty)
}

#[async_trait]
impl Storage for StorageServer {
    async fn size(&self, file: Path) -> FsResult<u64> {
        Ok(self.file_meta(&file).await?.len())
    }

    async fn read(&self, file: Path, offset: u64, length: u32) -> FsResult<Vec<u8>> {
        let size = self.file_meta(&file).await?.len();
        let end = offset
            .checked_add(u64::from(length))
            .filter(|end| *end <= size)
            .ok_or_else(|| {
                FsError::IndexOutOfRange(format!(
                    "{file}: {length} bytes at {offset} past size {size}"
                ))
            })?;

        let mut f = fs::File::open(self.local(&file)?).await?;
        f.seek(SeekFrom::Start(offset)).await?;
        let mut data = vec![0u8; (end - offset) as usize];
        f.read_exact(&mut data).await?;
        Ok(data)
    }

    async fn write(&self, file: Path, offset: u64, data: Vec<u8>) -> FsResult<()> {
        self.file_meta(&file).await?;

        let mut f = OpenOptions::new().write(true).open(self.local(&file)?).await?;
        f.seek(SeekFrom::Start(offset)).await?;
        f.write_all(&data).await?;
        f.flush().await?;
        debug!("wrote {} bytes to {} at {}", data.len(), file, offset);
        Ok(())
    }
}

#[async_trait]
impl Command for StorageServer {
    async fn create(&self, file: Path) -> FsResult<bool> {
        if file.is_root() {
            return Ok(false);
        }
        let local = self.local(&file)?;
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&local).await {
            Ok(_) => {
                debug!("created {}", file);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: Path) -> FsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let local = self.local(&path)?;
        let meta = match fs::symlink_metadata(&local).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if meta.is_dir() {
            fs::remove_dir_all(&local).await?;
        } else {
            fs::remove_file(&local).await?;
        }
        debug!("deleted {}", path);
        Ok(true)
    }

    async fn copy(&self, file: Path, source: StorageStub) -> FsResult<bool> {
        self.local(&file)?;
        let size = source.size(file.clone()).await?;

        self.delete(file.clone()).await?;
        self.create(file.clone()).await?;

        let mut offset = 0u64;
        while offset < size {
            let length = (size - offset).min(u64::from(COPY_CHUNK)) as u32;
            let data = source.read(file.clone(), offset, length).await?;
            self.write(file.clone(), offset, data).await?;
            offset += u64::from(length);
        }
        info!("copied {} ({} bytes) from {}", file, size, source.address());
        Ok(true)
    }
}
