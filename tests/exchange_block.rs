use cid::Cid;
use ipfs::{Block, IpfsOptions, TestTypes, UninitializedIpfs};
use multihash::Sha2_256;
use std::time::Duration;

/// Two in-memory nodes, `a` connects to `b`; `a` puts a block, `b` fetches it over bitswap.
#[tokio::test]
async fn exchange_block() {
    let data = b"hello block\n".to_vec().into_boxed_slice();
    let cid = Cid::new_v1(cid::Codec::Raw, Sha2_256::digest(&data));

    let (a, a_task) = UninitializedIpfs::<TestTypes>::new(IpfsOptions::inmemory_with_generated_keys())
        .start()
        .await
        .unwrap();
    tokio::spawn(a_task);

    let (b, b_task) = UninitializedIpfs::<TestTypes>::new(IpfsOptions::inmemory_with_generated_keys())
        .start()
        .await
        .unwrap();
    tokio::spawn(b_task);

    let (_, mut b_addrs) = b.identity().await.unwrap();
    let mut b_addr = b_addrs.pop().expect("b must have a listening address");
    let b_peer_id = b.peer_id().clone();
    b_addr.push(libp2p::multiaddr::Protocol::P2p(b_peer_id.into()));
    a.connect(b_addr).await.unwrap();

    a.put_block(Block::new(data.clone(), cid.clone())).await.unwrap();

    let fetched = tokio::time::timeout(Duration::from_secs(10), b.get_block(&cid))
        .await
        .expect("get_block did not complete in time")
        .unwrap();

    assert_eq!(fetched.data(), &data[..]);
}
