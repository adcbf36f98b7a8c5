//! Adds a small file to an in-memory node, pins it recursively, and reads it back out.
//!
//! Not part of the workspace build (kept here as a runnable sketch of the public API, the way
//! `koivunej-rust-ipfs` keeps standalone usage demos alongside its library crate); wire it up as a
//! `[[bin]]` or `cargo script` target if you want to actually run it.

use futures::stream::TryStreamExt;
use ipfs::{IpfsOptions, TestTypes, UninitializedIpfs};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let options = IpfsOptions::<TestTypes>::inmemory_with_generated_keys();
    let (ipfs, task) = UninitializedIpfs::new(options).start().await?;
    tokio::spawn(task);

    let (pubkey, addrs) = ipfs.identity().await?;
    tracing::info!(peer_id = %pubkey.into_peer_id(), ?addrs, "node started");

    let root = ipfs.add_stream(std::io::Cursor::new(b"hello from the demo\n".to_vec())).await?;
    tracing::info!(%root, "added file");

    ipfs.pin(root.clone(), true).await?;
    assert!(ipfs.is_pinned(&root).await?);

    let mut out = Vec::new();
    let mut stream = Box::pin(ipfs.get_stream(root.clone()).await?);
    while let Some(chunk) = stream.try_next().await? {
        out.extend_from_slice(&chunk);
    }
    assert_eq!(out, b"hello from the demo\n");

    println!("round-tripped {} bytes through {}", out.len(), root);
    Ok(())
}
