//! The `/ipfs/bitswap/1.0.0` substream upgrade: a single length-prefixed protobuf message in each
//! direction.
//!
//! Inbound and outbound upgrades are asymmetric on purpose: `BitswapConfig` is the inbound
//! negotiation (it only knows the protocol name, then reads whatever the peer sends), while
//! [`BitswapMessage`] itself is the outbound upgrade — once a substream is negotiated for sending,
//! the message being sent is the only thing left to do with it, so the message writes itself
//! (mirrors the real bitswap crate's own `OutboundUpgrade` impl for its message type).

use crate::message::{pb, BitswapMessage, MessageDecodeError};
use futures::future::BoxFuture;
use futures::prelude::*;
use libp2p_core::upgrade::{read_one, write_one, InboundUpgrade, OutboundUpgrade, UpgradeInfo};
use prost::Message as _;
use std::convert::TryFrom;
use std::{io, iter};

/// Largest single framed message we'll read.
const MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct BitswapConfig;

impl UpgradeInfo for BitswapConfig {
    type Info = &'static [u8];
    type InfoIter = iter::Once<Self::Info>;

    fn protocol_info(&self) -> Self::InfoIter {
        iter::once(b"/ipfs/bitswap/1.0.0")
    }
}

impl<TSocket> InboundUpgrade<TSocket> for BitswapConfig
where
    TSocket: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Output = BitswapMessage;
    type Error = BitswapProtocolError;
    type Future = BoxFuture<'static, Result<Self::Output, Self::Error>>;

    fn upgrade_inbound(self, mut socket: TSocket, _info: Self::Info) -> Self::Future {
        Box::pin(async move {
            let bytes = read_one(&mut socket, MAX_MESSAGE_SIZE)
                .await
                .map_err(BitswapProtocolError::Io)?;
            let raw = pb::Message::decode(bytes.as_slice()).map_err(MessageDecodeError::Protobuf)?;
            BitswapMessage::try_from(raw).map_err(BitswapProtocolError::Decode)
        })
    }
}

impl UpgradeInfo for BitswapMessage {
    type Info = &'static [u8];
    type InfoIter = iter::Once<Self::Info>;

    fn protocol_info(&self) -> Self::InfoIter {
        iter::once(b"/ipfs/bitswap/1.0.0")
    }
}

impl<TSocket> OutboundUpgrade<TSocket> for BitswapMessage
where
    TSocket: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Output = ();
    type Error = BitswapProtocolError;
    type Future = BoxFuture<'static, Result<Self::Output, Self::Error>>;

    fn upgrade_outbound(self, mut socket: TSocket, _info: Self::Info) -> Self::Future {
        Box::pin(async move {
            let raw = pb::Message::from(self);
            let mut buf = Vec::with_capacity(raw.encoded_len());
            raw.encode(&mut buf).expect("Vec<u8> grows, never OOMs here");
            write_one(&mut socket, buf).await.map_err(BitswapProtocolError::Io)
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BitswapProtocolError {
    #[error("i/o error on bitswap substream: {0}")]
    Io(io::Error),
    #[error("failed to decode bitswap message: {0}")]
    Decode(MessageDecodeError),
}
