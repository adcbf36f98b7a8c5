//! Builds the authenticated, multiplexed transport every connection in this node rides on: TCP (or
//! DNS-resolved TCP) secured with Noise, multiplexed with Yamux, falling back to Mplex.

use libp2p::core::muxing::StreamMuxerBox;
use libp2p::core::transport::Boxed;
use libp2p::core::upgrade::{SelectUpgrade, Version};
use libp2p::identity::Keypair;
use libp2p::mplex::MplexConfig;
use libp2p::noise::{self, NoiseConfig, X25519Spec};
use libp2p::yamux::YamuxConfig;
use libp2p::{dns, tcp, PeerId, Transport};

pub type TTransport = Boxed<(PeerId, StreamMuxerBox)>;

pub fn build_transport(keypair: Keypair) -> TTransport {
    let noise_keys = noise::Keypair::<X25519Spec>::new()
        .into_authentic(&keypair)
        .expect("can create noise keys from a valid libp2p keypair");

    let tcp = tcp::TokioTcpConfig::new().nodelay(true);
    let transport = dns::TokioDnsConfig::system(tcp).expect("system dns resolver available");

    transport
        .upgrade(Version::V1)
        .authenticate(NoiseConfig::xx(noise_keys).into_authenticated())
        .multiplex(SelectUpgrade::new(YamuxConfig::default(), MplexConfig::new()))
        .map(|(peer_id, muxer), _| (peer_id, StreamMuxerBox::new(muxer)))
        .timeout(std::time::Duration::from_secs(20))
        .boxed()
}
