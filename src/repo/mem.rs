//! In-memory repo backing, used by tests and by [`crate::IpfsOptions::inmemory_with_generated_keys`]
//! for throwaway nodes that never touch disk.

use crate::repo::{BlockStore, Column, DataStore};
use crate::{Block, Error};
use async_trait::async_trait;
use cid::Cid;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct MemBlockStore {
    blocks: Mutex<HashMap<Cid, Block>>,
}

#[async_trait]
impl BlockStore for MemBlockStore {
    fn new(_path: PathBuf) -> Self {
        MemBlockStore {
            blocks: Mutex::new(HashMap::new()),
        }
    }

    async fn init(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn open(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn contains(&self, cid: &Cid) -> Result<bool, Error> {
        Ok(self.blocks.lock().await.contains_key(cid))
    }

    async fn get(&self, cid: &Cid) -> Result<Option<Block>, Error> {
        Ok(self.blocks.lock().await.get(cid).cloned())
    }

    async fn put(&self, block: Block) -> Result<Cid, Error> {
        let cid = block.cid.clone();
        self.blocks.lock().await.insert(cid.clone(), block);
        Ok(cid)
    }

    async fn remove(&self, cid: &Cid) -> Result<(), Error> {
        self.blocks.lock().await.remove(cid);
        Ok(())
    }

    fn list(&self) -> BoxStream<'static, Cid> {
        // Snapshotting under the lock keeps this independent of anything mutating the map while
        // the caller (GC) is still draining the stream.
        let blocks = self.blocks.try_lock();
        let keys: Vec<Cid> = match blocks {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        stream::iter(keys).boxed()
    }
}

#[derive(Debug)]
pub struct MemDataStore {
    values: Mutex<HashMap<(Column, Vec<u8>), Vec<u8>>>,
}

#[async_trait]
impl DataStore for MemDataStore {
    fn new(_path: PathBuf) -> Self {
        MemDataStore {
            values: Mutex::new(HashMap::new()),
        }
    }

    async fn init(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn open(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn contains(&self, col: Column, key: &[u8]) -> Result<bool, Error> {
        Ok(self.values.lock().await.contains_key(&(col, key.to_vec())))
    }

    async fn get(&self, col: Column, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.values.lock().await.get(&(col, key.to_vec())).cloned())
    }

    async fn put(&self, col: Column, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.values.lock().await.insert((col, key.to_vec()), value.to_vec());
        Ok(())
    }

    async fn remove(&self, col: Column, key: &[u8]) -> Result<(), Error> {
        self.values.lock().await.remove(&(col, key.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_remove_roundtrip() {
        use multihash::Multihash;

        let store = MemBlockStore::new(PathBuf::new());
        let data: Box<[u8]> = vec![1, 2, 3].into_boxed_slice();
        let hash = Multihash::from(multihash::Sha2_256::digest(&data));
        let cid = Cid::new_v0(hash).unwrap();
        let block = Block::new(data, cid.clone());

        store.put(block.clone()).await.unwrap();
        assert!(store.contains(&cid).await.unwrap());
        assert_eq!(store.get(&cid).await.unwrap().unwrap().data(), block.data());

        store.remove(&cid).await.unwrap();
        assert!(!store.contains(&cid).await.unwrap());
    }
}
