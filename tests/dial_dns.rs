use ipfs::{IpfsOptions, TestTypes, UninitializedIpfs};
use libp2p::multiaddr::Protocol;
use std::borrow::Cow;
use std::time::Duration;
use tokio::time::timeout;

/// `connect` accepts dns4/dns6/dns/dnsaddr multiaddrs (not just dialable `ip4`/`ip6`) — it just
/// won't resolve `localhost` to anything `b` is actually listening on, so every dial times out
/// rather than failing to parse.
#[tokio::test(max_threads = 1)]
async fn dial_dns() {
    let (node_a, task_a) = UninitializedIpfs::<TestTypes>::new(IpfsOptions::inmemory_with_generated_keys())
        .start()
        .await
        .unwrap();
    tokio::spawn(task_a);

    let (node_b, task_b) = UninitializedIpfs::<TestTypes>::new(IpfsOptions::inmemory_with_generated_keys())
        .start()
        .await
        .unwrap();
    tokio::spawn(task_b);

    let (_, addrs) = node_b.identity().await.unwrap();
    let b_peer_id = node_b.peer_id().clone();

    let port = addrs
        .iter()
        .flat_map(|m| m.iter())
        .find_map(|p| match p {
            Protocol::Tcp(port) => Some(port),
            _ => None,
        })
        .expect("b must be listening on a tcp port");

    for addr in [
        libp2p::build_multiaddr!(Dns4(Cow::Borrowed("localhost")), Tcp(port), P2p(b_peer_id.clone().into())),
        libp2p::build_multiaddr!(Dns6(Cow::Borrowed("localhost")), Tcp(port), P2p(b_peer_id.clone().into())),
        libp2p::build_multiaddr!(Dns(Cow::Borrowed("localhost")), Tcp(port), P2p(b_peer_id.clone().into())),
        libp2p::build_multiaddr!(Dnsaddr(Cow::Borrowed("localhost")), Tcp(port), P2p(b_peer_id.clone().into())),
    ] {
        let res = timeout(Duration::from_secs(1), node_a.connect(addr)).await;
        assert!(res.is_err(), "dial to localhost should not resolve within the timeout");
    }
}
