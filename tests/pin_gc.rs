use ipfs::{Block, IpfsOptions, TestTypes, UninitializedIpfs};
use multihash::Sha2_256;

fn raw_block(data: &[u8]) -> Block {
    let cid = cid::Cid::new_v1(cid::Codec::Raw, Sha2_256::digest(data));
    Block::new(data.to_vec().into_boxed_slice(), cid)
}

/// Scenario 4 (spec.md §8): pinning `A` recursively keeps its whole closure alive through GC,
/// while every block exclusive to the unpinned `B` is swept away.
#[tokio::test]
async fn gc_respects_pins() {
    let (ipfs, task) = UninitializedIpfs::<TestTypes>::new(IpfsOptions::inmemory_with_generated_keys())
        .start()
        .await
        .unwrap();
    tokio::spawn(task);

    // DAG A: two leaves linked from a parent node, built and pinned recursively.
    let leaf_a1 = raw_block(b"A leaf one");
    let leaf_a2 = raw_block(b"A leaf two");
    ipfs.put_block(leaf_a1.clone()).await.unwrap();
    ipfs.put_block(leaf_a2.clone()).await.unwrap();

    let dag = ipfs.dag();
    let parent_a = ipfs::dag::Node::new(
        Vec::new(),
        vec![
            ipfs::dag::Link {
                name: "one".into(),
                size: leaf_a1.data().len() as u64,
                cid: leaf_a1.cid.clone(),
            },
            ipfs::dag::Link {
                name: "two".into(),
                size: leaf_a2.data().len() as u64,
                cid: leaf_a2.cid.clone(),
            },
        ],
    );
    let root_a = dag.put(&parent_a).await.unwrap();
    ipfs.pin(root_a.clone(), true).await.unwrap();

    // DAG B: an unrelated, unpinned block.
    let leaf_b = raw_block(b"B leaf, no relation to A");
    ipfs.put_block(leaf_b.clone()).await.unwrap();

    let removed = ipfs.gc().await.unwrap();

    assert!(removed.contains(&leaf_b.cid), "B's exclusive block must be collected");
    assert!(!removed.contains(&root_a), "A's root must survive GC");
    assert!(!removed.contains(&leaf_a1.cid), "A's first leaf must survive GC");
    assert!(!removed.contains(&leaf_a2.cid), "A's second leaf must survive GC");

    assert!(ipfs.get_block_local(&root_a).await.is_ok());
    assert!(ipfs.get_block_local(&leaf_a1.cid).await.is_ok());
    assert!(ipfs.get_block_local(&leaf_a2.cid).await.is_ok());
    assert!(ipfs.get_block_local(&leaf_b.cid).await.is_err());

    assert!(ipfs.is_pinned(&root_a).await.unwrap());
    assert!(ipfs.is_pinned(&leaf_a1.cid).await.unwrap(), "indirect pin via recursive closure");
}
