//! An on-disk repo: blocks under `<root>/blocks/<shard>/<cid>.data`, sharded by the last two
//! characters of the block's `Cid` string so no single directory ends up with millions of entries
//! (spec.md §4.1). The data store sits alongside it under `<root>/datastore/<column>/<key hex>`.
//!
//! A `repo.lock` file guards against two processes opening the same repo root concurrently,
//! mirroring go-ipfs's own lockfile convention.

use crate::config::{self, REPO_VERSION};
use crate::repo::{BlockStore, Column, DataStore};
use crate::{Block, Error};
use async_trait::async_trait;
use cid::Cid;
use futures::stream::{self, BoxStream, StreamExt};
use std::convert::TryFrom;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

fn shard_for(cid: &Cid) -> String {
    let s = cid.to_string();
    let len = s.len();
    s[len.saturating_sub(2)..].to_string()
}

fn block_path(root: &Path, cid: &Cid) -> PathBuf {
    root.join("blocks").join(shard_for(cid)).join(format!("{}.data", cid))
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

fn column_dir(root: &Path, col: Column) -> PathBuf {
    let name = match col {
        Column::Pin => "pin",
    };
    root.join("datastore").join(name)
}

#[derive(Debug)]
pub struct FsBlockStore {
    root: PathBuf,
}

#[async_trait]
impl BlockStore for FsBlockStore {
    fn new(path: PathBuf) -> Self {
        FsBlockStore { root: path }
    }

    async fn init(&self) -> Result<(), Error> {
        fs::create_dir_all(self.root.join("blocks")).await?;
        Ok(())
    }

    async fn open(&self) -> Result<(), Error> {
        if !self.root.join("blocks").is_dir() {
            return Err(Error::Uninitialized(self.root.clone()));
        }
        Ok(())
    }

    async fn contains(&self, cid: &Cid) -> Result<bool, Error> {
        Ok(fs::metadata(block_path(&self.root, cid)).await.is_ok())
    }

    async fn get(&self, cid: &Cid) -> Result<Option<Block>, Error> {
        match fs::read(block_path(&self.root, cid)).await {
            Ok(data) => Ok(Some(Block::new(data.into_boxed_slice(), cid.clone()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn put(&self, block: Block) -> Result<Cid, Error> {
        let path = block_path(&self.root, &block.cid);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // write-then-rename keeps a concurrent reader from ever observing a partial block.
        let tmp = path.with_extension("data.tmp");
        fs::write(&tmp, block.data()).await?;
        fs::rename(&tmp, &path).await?;
        Ok(block.cid)
    }

    async fn remove(&self, cid: &Cid) -> Result<(), Error> {
        match fs::remove_file(block_path(&self.root, cid)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn list(&self) -> BoxStream<'static, Cid> {
        let root = self.root.join("blocks");
        stream::once(async move { read_all_shards(root).await })
            .flat_map(stream::iter)
            .boxed()
    }
}

async fn read_all_shards(blocks_root: PathBuf) -> Vec<Cid> {
    let mut out = Vec::new();
    let mut shards = match fs::read_dir(&blocks_root).await {
        Ok(rd) => rd,
        Err(_) => return out,
    };

    while let Ok(Some(shard)) = shards.next_entry().await {
        let mut entries = match fs::read_dir(shard.path()).await {
            Ok(rd) => rd,
            Err(_) => continue,
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let stem = match path.file_stem().and_then(|s| s.to_str()) {
                Some(s) => s,
                None => continue,
            };
            if let Ok(cid) = Cid::try_from(stem) {
                out.push(cid);
            }
        }
    }

    out
}

#[derive(Debug)]
pub struct FsDataStore {
    root: PathBuf,
    /// Held for the lifetime of an opened repo; released (and `repo.lock` removed) on drop. Lives
    /// here rather than on `FsBlockStore` because `Repo::open` calls the block store first and the
    /// data store second, so acquiring it on the second call still catches a `FsBlockStore`-only
    /// race, while a single lock location keeps `Repo<T>` from needing type-specific lock plumbing.
    lock: Mutex<Option<RepoLock>>,
}

#[async_trait]
impl DataStore for FsDataStore {
    fn new(path: PathBuf) -> Self {
        FsDataStore {
            root: path,
            lock: Mutex::new(None),
        }
    }

    async fn init(&self) -> Result<(), Error> {
        fs::create_dir_all(self.root.join("datastore")).await?;
        let version_path = self.root.join("version");
        if fs::metadata(&version_path).await.is_err() {
            config::write_version(&version_path)?;
        }
        Ok(())
    }

    async fn open(&self) -> Result<(), Error> {
        let version_path = self.root.join("version");
        if fs::metadata(&version_path).await.is_err() {
            return Err(Error::Uninitialized(self.root.clone()));
        }
        config::check_version(&version_path)?;

        let guard = RepoLock::acquire(&self.root).await?;
        *self.lock.lock().await = Some(guard);
        Ok(())
    }

    async fn contains(&self, col: Column, key: &[u8]) -> Result<bool, Error> {
        let path = column_dir(&self.root, col).join(hex_encode(key));
        Ok(fs::metadata(path).await.is_ok())
    }

    async fn get(&self, col: Column, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let path = column_dir(&self.root, col).join(hex_encode(key));
        match fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn put(&self, col: Column, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let dir = column_dir(&self.root, col);
        fs::create_dir_all(&dir).await?;
        let path = dir.join(hex_encode(key));
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, col: Column, key: &[u8]) -> Result<(), Error> {
        let path = column_dir(&self.root, col).join(hex_encode(key));
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Takes an exclusive lock on `<root>/repo.lock` for the lifetime of the returned guard. Held by
/// `UninitializedIpfs::start` for as long as the node runs; dropped (and the file removed) on
/// clean shutdown.
#[derive(Debug)]
pub struct RepoLock {
    path: PathBuf,
}

impl RepoLock {
    pub async fn acquire(root: &Path) -> Result<Self, Error> {
        let path = root.join("repo.lock");
        match fs::OpenOptions::new().create_new(true).write(true).open(&path).await {
            Ok(_) => Ok(RepoLock { path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::RepoLocked(root.to_path_buf())),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multihash::Multihash;

    fn fixture_block() -> Block {
        let data: Box<[u8]> = vec![1, 2, 3, 4].into_boxed_slice();
        let hash = Multihash::from(multihash::Sha2_256::digest(&data));
        let cid = Cid::new_v0(hash).unwrap();
        Block::new(data, cid)
    }

    #[tokio::test]
    async fn put_get_remove_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlockStore::new(dir.path().to_path_buf());
        store.init().await.unwrap();
        store.open().await.unwrap();

        let block = fixture_block();
        assert!(!store.contains(&block.cid).await.unwrap());

        store.put(block.clone()).await.unwrap();
        assert!(store.contains(&block.cid).await.unwrap());
        assert_eq!(store.get(&block.cid).await.unwrap().unwrap().data(), block.data());

        store.remove(&block.cid).await.unwrap();
        assert!(!store.contains(&block.cid).await.unwrap());
    }

    #[tokio::test]
    async fn open_before_init_is_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlockStore::new(dir.path().to_path_buf());
        assert!(matches!(store.open().await, Err(Error::Uninitialized(_))));
    }

    #[tokio::test]
    async fn version_mismatch_is_rejected_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let data_store = FsDataStore::new(dir.path().to_path_buf());
        data_store.init().await.unwrap();
        fs::write(dir.path().join("version"), "999").await.unwrap();

        let err = data_store.open().await.unwrap_err();
        assert!(matches!(
            err,
            Error::RepoVersionMismatch {
                on_disk: 999,
                expected: REPO_VERSION
            }
        ));
    }

    #[tokio::test]
    async fn second_open_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let data_store = FsDataStore::new(dir.path().to_path_buf());
        data_store.init().await.unwrap();
        data_store.open().await.unwrap();

        let second = FsDataStore::new(dir.path().to_path_buf());
        assert!(matches!(second.open().await, Err(Error::RepoLocked(_))));
    }
}
