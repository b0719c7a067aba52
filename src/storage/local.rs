//! Local filesystem object storage.
//!
//! Layout mirrors drive paths: `/docs/a.txt` lives at `{root}/docs/a.txt`.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ObjectReader, ObjectSource, ObjectStore, StorageError, StorageResult};
use crate::range::ByteRange;

/// Object storage in a local directory.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create storage at `root`, creating the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a drive path to a file below the root.
    fn object_path(&self, path: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut out = self.root.clone();
        let mut depth = 0;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    out.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                _ => return Err(StorageError::InvalidPath(path.to_string())),
            }
        }
        if depth == 0 {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(out)
    }

    /// Remove empty directories from `dir` upwards, stopping below the root.
    ///
    /// A directory that is not empty when observed stops the walk, so a
    /// concurrent writer never loses its directory.
    async fn cleanup(&self, mut dir: PathBuf) {
        while dir.starts_with(&self.root) && dir != self.root {
            match fs::remove_dir(&dir).await {
                Ok(()) => debug!(dir = %dir.display(), "removed empty directory"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(_) => return,
            }
            if !dir.pop() {
                return;
            }
        }
    }

    async fn create_temp(&self, target: &Path) -> StorageResult<(PathBuf, fs::File)> {
        let parent = target
            .parent()
            .ok_or_else(|| StorageError::InvalidPath(target.display().to_string()))?;
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = parent.join(format!(".{name}.{}.part", Uuid::new_v4().simple()));

        // A concurrent cleanup may remove the freshly created parent; retry once.
        for attempt in 0..2 {
            fs::create_dir_all(parent).await?;
            match fs::File::create(&temp).await {
                Ok(file) => return Ok((temp, file)),
                Err(e) if e.kind() == ErrorKind::NotFound && attempt == 0 => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::Backend(format!(
            "could not create temporary file next to {}",
            target.display()
        )))
    }
}

fn not_found(path: &str, e: std::io::Error) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        e.into()
    }
}

#[async_trait]
impl ObjectStore for LocalStorage {
    async fn get_object(&self, path: &str, range: Option<ByteRange>) -> StorageResult<ObjectReader> {
        let object = self.object_path(path)?;
        let mut file = fs::File::open(&object).await.map_err(|e| not_found(path, e))?;

        let Some(range) = range else {
            return Ok(Box::pin(file));
        };

        let len = file.metadata().await?.len();
        if range.start >= len {
            return Err(StorageError::RangeNotSatisfiable(format!(
                "{} outside {path} of {len} bytes",
                range.content_range()
            )));
        }
        file.seek(SeekFrom::Start(range.start)).await?;
        Ok(Box::pin(file.take(range.len())))
    }

    async fn put_object(
        &self,
        path: &str,
        size: u64,
        mut reader: ObjectSource,
        _content_type: &str,
    ) -> StorageResult<()> {
        let object = self.object_path(path)?;
        let (temp, mut file) = self.create_temp(&object).await?;

        let written = async {
            let written = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(written)
        }
        .await;
        drop(file);

        let result = match written {
            Ok(actual) if actual != size => Err(StorageError::SizeMismatch {
                path: path.to_string(),
                expected: size,
                actual,
            }),
            Ok(_) => fs::rename(&temp, &object).await.map_err(StorageError::from),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = &result {
            warn!(path, error = %e, "discarding partial upload");
            if let Err(e) = fs::remove_file(&temp).await {
                debug!(temp = %temp.display(), error = %e, "could not remove partial upload");
            }
            if let Some(parent) = object.parent() {
                self.cleanup(parent.to_path_buf()).await;
            }
        } else {
            debug!(path, "object stored");
        }
        result
    }

    async fn move_object(&self, from: &str, to: &str) -> StorageResult<()> {
        let source = self.object_path(from)?;
        let target = self.object_path(to)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&source, &target)
            .await
            .map_err(|e| not_found(from, e))?;
        debug!(from, to, "object moved");

        if let Some(parent) = source.parent() {
            self.cleanup(parent.to_path_buf()).await;
        }
        Ok(())
    }

    async fn delete_object(&self, path: &str) -> StorageResult<()> {
        let object = self.object_path(path)?;
        fs::remove_file(&object)
            .await
            .map_err(|e| not_found(path, e))?;
        debug!(path, "object deleted");

        if let Some(parent) = object.parent() {
            self.cleanup(parent.to_path_buf()).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn storage() -> (TempDir, LocalStorage) {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().join("root")).await.unwrap();
        (dir, storage)
    }

    async fn put(storage: &LocalStorage, path: &str, data: &'static [u8]) {
        storage
            .put_object(path, data.len() as u64, Box::new(data), "application/octet-stream")
            .await
            .unwrap();
    }

    async fn read_all(mut reader: ObjectReader) -> Vec<u8> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_put_creates_parents_and_get_reads_back() {
        let (_dir, storage) = storage().await;
        put(&storage, "/a/b/c.txt", b"hello world").await;

        let data = read_all(storage.get_object("/a/b/c.txt", None).await.unwrap()).await;
        assert_eq!(data, b"hello world");
        assert!(storage.root().join("a/b/c.txt").is_file());
    }

    #[tokio::test]
    async fn test_ranged_get() {
        let (_dir, storage) = storage().await;
        put(&storage, "/f.bin", b"0123456789").await;

        let range = ByteRange { start: 2, end: 5, total: 10 };
        let data = read_all(storage.get_object("/f.bin", Some(range)).await.unwrap()).await;
        assert_eq!(data, b"2345");
    }

    #[tokio::test]
    async fn test_range_past_end() {
        let (_dir, storage) = storage().await;
        put(&storage, "/f.bin", b"0123").await;

        let range = ByteRange { start: 10, end: 12, total: 13 };
        assert!(matches!(
            storage.get_object("/f.bin", Some(range)).await,
            Err(StorageError::RangeNotSatisfiable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_object() {
        let (_dir, storage) = storage().await;
        assert!(matches!(
            storage.get_object("/nope", None).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.delete_object("/nope").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_size_mismatch_leaves_nothing() {
        let (_dir, storage) = storage().await;
        let result = storage
            .put_object("/d/short.txt", 100, Box::new(&b"abc"[..]), "text/plain")
            .await;
        assert!(matches!(result, Err(StorageError::SizeMismatch { actual: 3, .. })));
        assert!(!storage.root().join("d").exists());
    }

    #[tokio::test]
    async fn test_overwrite_is_last_writer_wins() {
        let (_dir, storage) = storage().await;
        put(&storage, "/f.txt", b"first").await;
        put(&storage, "/f.txt", b"second").await;
        let data = read_all(storage.get_object("/f.txt", None).await.unwrap()).await;
        assert_eq!(data, b"second");
    }

    #[tokio::test]
    async fn test_move_removes_empty_source_dirs() {
        let (_dir, storage) = storage().await;
        put(&storage, "/a/b/c.txt", b"x").await;

        storage.move_object("/a/b/c.txt", "/z/c.txt").await.unwrap();
        assert!(storage.root().join("z/c.txt").is_file());
        assert!(!storage.root().join("a").exists());
        assert!(storage.root().exists());
    }

    #[tokio::test]
    async fn test_delete_cleanup_stops_at_non_empty_dir() {
        let (_dir, storage) = storage().await;
        put(&storage, "/a/keep.txt", b"k").await;
        put(&storage, "/a/b/c/d.txt", b"d").await;

        storage.delete_object("/a/b/c/d.txt").await.unwrap();
        assert!(!storage.root().join("a/b").exists());
        assert!(storage.root().join("a/keep.txt").is_file());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let (_dir, storage) = storage().await;
        assert!(matches!(
            storage.get_object("/../etc/passwd", None).await,
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.delete_object("/").await,
            Err(StorageError::InvalidPath(_))
        ));
    }
}
