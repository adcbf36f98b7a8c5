//! The `/ipfs/kad/1.0.0` substream upgrade: a single length-prefixed protobuf message in each
//! direction, request then response.
//!
//! Inbound and outbound upgrades are asymmetric on purpose: `KadConfig` is the inbound negotiation
//! (it only knows the protocol name, then reads whatever the peer sends), while [`KadMessage`]
//! itself is the outbound upgrade — once a substream is negotiated for sending, the message being
//! sent is the only thing left to do with it, so the message writes itself.

use crate::message::{pb, KadMessage, MessageDecodeError};
use futures::future::BoxFuture;
use futures::prelude::*;
use libp2p_core::upgrade::{read_one, write_one, InboundUpgrade, OutboundUpgrade, UpgradeInfo};
use prost::Message as _;
use std::convert::TryFrom;
use std::{io, iter};

const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct KadConfig;

impl UpgradeInfo for KadConfig {
    type Info = &'static [u8];
    type InfoIter = iter::Once<Self::Info>;

    fn protocol_info(&self) -> Self::InfoIter {
        iter::once(b"/ipfs/kad/1.0.0")
    }
}

impl<TSocket> InboundUpgrade<TSocket> for KadConfig
where
    TSocket: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Output = KadMessage;
    type Error = KadProtocolError;
    type Future = BoxFuture<'static, Result<Self::Output, Self::Error>>;

    fn upgrade_inbound(self, mut socket: TSocket, _info: Self::Info) -> Self::Future {
        Box::pin(async move {
            let bytes = read_one(&mut socket, MAX_MESSAGE_SIZE)
                .await
                .map_err(KadProtocolError::Io)?;
            let raw = pb::Message::decode(bytes.as_slice()).map_err(MessageDecodeError::Protobuf)?;
            KadMessage::try_from(raw).map_err(KadProtocolError::Decode)
        })
    }
}

impl UpgradeInfo for KadMessage {
    type Info = &'static [u8];
    type InfoIter = iter::Once<Self::Info>;

    fn protocol_info(&self) -> Self::InfoIter {
        iter::once(b"/ipfs/kad/1.0.0")
    }
}

impl<TSocket> OutboundUpgrade<TSocket> for KadMessage
where
    TSocket: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Output = ();
    type Error = KadProtocolError;
    type Future = BoxFuture<'static, Result<Self::Output, Self::Error>>;

    fn upgrade_outbound(self, mut socket: TSocket, _info: Self::Info) -> Self::Future {
        Box::pin(async move {
            let raw = pb::Message::from(self);
            let mut buf = Vec::with_capacity(raw.encoded_len());
            raw.encode(&mut buf).expect("Vec<u8> grows, never OOMs here");
            write_one(&mut socket, buf).await.map_err(KadProtocolError::Io)
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KadProtocolError {
    #[error("i/o error on kad substream: {0}")]
    Io(io::Error),
    #[error("failed to decode kad message: {0}")]
    Decode(MessageDecodeError),
}
