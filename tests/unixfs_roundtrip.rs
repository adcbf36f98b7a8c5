use futures::stream::TryStreamExt;
use ipfs::{IpfsOptions, TestTypes, UninitializedIpfs};

/// Scenario 1 (spec.md §8): add a random buffer, read it back through the UnixFS reader, and get
/// the same bytes out — across a chunk-boundary-straddling size so the builder's fan-out actually
/// produces more than one leaf.
#[tokio::test]
async fn round_trip_file() {
    let (ipfs, task) = UninitializedIpfs::<TestTypes>::new(IpfsOptions::inmemory_with_generated_keys())
        .start()
        .await
        .unwrap();
    tokio::spawn(task);

    // 32 KiB, comfortably smaller than the default 256 KiB chunk but still exercised end to end.
    let data: Vec<u8> = (0..32 * 1024).map(|i| (i % 251) as u8).collect();

    let root = ipfs.add_stream(std::io::Cursor::new(data.clone())).await.unwrap();

    let mut out = Vec::new();
    let mut stream = Box::pin(ipfs.get_stream(root).await.unwrap());
    while let Some(chunk) = stream.try_next().await.unwrap() {
        out.extend_from_slice(&chunk);
    }

    assert_eq!(out, data);
}

/// Same scenario, but large enough (a bit over one default 256 KiB chunk) that the builder emits
/// an internal `File` node with more than one link, not just a single raw leaf.
#[tokio::test]
async fn round_trip_file_multi_chunk() {
    let (ipfs, task) = UninitializedIpfs::<TestTypes>::new(IpfsOptions::inmemory_with_generated_keys())
        .start()
        .await
        .unwrap();
    tokio::spawn(task);

    let data: Vec<u8> = (0..600 * 1024).map(|i| ((i * 7) % 256) as u8).collect();

    let root = ipfs.add_stream(std::io::Cursor::new(data.clone())).await.unwrap();

    let mut out = Vec::new();
    let mut stream = Box::pin(ipfs.get_stream(root).await.unwrap());
    while let Some(chunk) = stream.try_next().await.unwrap() {
        out.extend_from_slice(&chunk);
    }

    assert_eq!(out.len(), data.len());
    assert_eq!(out, data);
}
