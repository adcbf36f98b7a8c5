//! The `/ipfs/kad/1.0.0` wire message and its in-memory representation.

use cid::Cid;
use libp2p_core::{Multiaddr, PeerId};
use std::convert::TryFrom;

/// Generated from `proto/kad.proto` by `prost-build`.
pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/kad.pb.rs"));
}

/// A peer plus however many addresses the sender currently knows for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

/// A signed value record, as exchanged by `GET_VALUE`/`PUT_VALUE`. Only the naming layer produces
/// and verifies these; routing itself treats `value`/`signature` as opaque bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KadMessage {
    Ping,
    FindNode {
        target: PeerId,
        closer_peers: Vec<PeerInfo>,
    },
    GetProviders {
        key: Cid,
        providers: Vec<PeerInfo>,
        closer_peers: Vec<PeerInfo>,
    },
    AddProvider {
        key: Cid,
        provider: PeerInfo,
    },
    GetValue {
        key: Vec<u8>,
        record: Option<SignedRecord>,
        closer_peers: Vec<PeerInfo>,
    },
    PutValue {
        key: Vec<u8>,
        record: SignedRecord,
    },
}

impl KadMessage {
    /// Whether this message should be answered by the peer that receives it (all requests except
    /// already-final replies). Kept so the protocol handler can pick the inbound/outbound framing
    /// without a second enum.
    pub fn is_request(&self) -> bool {
        true
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessageDecodeError {
    #[error("malformed protobuf kad message: {0}")]
    Protobuf(#[from] prost::DecodeError),
    #[error("invalid cid in kad message")]
    InvalidCid(#[from] cid::Error),
    #[error("invalid peer id in kad message")]
    InvalidPeerId,
    #[error("invalid multiaddr in kad message")]
    InvalidMultiaddr,
    #[error("message carried no recognizable payload for its declared type")]
    MissingPayload,
}

fn peer_to_pb(p: &PeerInfo) -> pb::message::Peer {
    pb::message::Peer {
        id: p.id.as_bytes().to_vec(),
        addrs: p.addrs.iter().map(|a| a.to_vec()).collect(),
        connection: 0,
    }
}

fn peer_from_pb(p: pb::message::Peer) -> Result<PeerInfo, MessageDecodeError> {
    let id = PeerId::from_bytes(p.id).map_err(|_| MessageDecodeError::InvalidPeerId)?;
    let mut addrs = Vec::with_capacity(p.addrs.len());
    for a in p.addrs {
        addrs.push(Multiaddr::try_from(a).map_err(|_| MessageDecodeError::InvalidMultiaddr)?);
    }
    Ok(PeerInfo { id, addrs })
}

fn record_to_pb(r: &SignedRecord) -> pb::message::Record {
    pb::message::Record {
        key: r.key.clone(),
        value: r.value.clone(),
        signature: r.signature.clone(),
    }
}

fn record_from_pb(r: pb::message::Record) -> SignedRecord {
    SignedRecord {
        key: r.key,
        value: r.value,
        signature: r.signature,
    }
}

impl From<KadMessage> for pb::Message {
    fn from(msg: KadMessage) -> pb::Message {
        use pb::message::MessageType;

        match msg {
            KadMessage::Ping => pb::Message {
                r#type: MessageType::Ping as i32,
                ..Default::default()
            },
            KadMessage::FindNode { target, closer_peers } => pb::Message {
                r#type: MessageType::FindNode as i32,
                key: target.as_bytes().to_vec(),
                closer_peers: closer_peers.iter().map(peer_to_pb).collect(),
                ..Default::default()
            },
            KadMessage::GetProviders {
                key,
                providers,
                closer_peers,
            } => pb::Message {
                r#type: MessageType::GetProviders as i32,
                key: key.to_bytes(),
                provider_peers: providers.iter().map(peer_to_pb).collect(),
                closer_peers: closer_peers.iter().map(peer_to_pb).collect(),
                ..Default::default()
            },
            KadMessage::AddProvider { key, provider } => pb::Message {
                r#type: MessageType::AddProvider as i32,
                key: key.to_bytes(),
                provider_peers: vec![peer_to_pb(&provider)],
                ..Default::default()
            },
            KadMessage::GetValue {
                key,
                record,
                closer_peers,
            } => pb::Message {
                r#type: MessageType::GetValue as i32,
                key,
                record: record.as_ref().map(record_to_pb),
                closer_peers: closer_peers.iter().map(peer_to_pb).collect(),
                ..Default::default()
            },
            KadMessage::PutValue { key, record } => pb::Message {
                r#type: MessageType::PutValue as i32,
                key,
                record: Some(record_to_pb(&record)),
                ..Default::default()
            },
        }
    }
}

impl TryFrom<pb::Message> for KadMessage {
    type Error = MessageDecodeError;

    fn try_from(raw: pb::Message) -> Result<Self, Self::Error> {
        use pb::message::MessageType;

        let ty = MessageType::from_i32(raw.r#type).ok_or(MessageDecodeError::MissingPayload)?;

        let closer_peers = || -> Result<Vec<PeerInfo>, MessageDecodeError> {
            raw.closer_peers.clone().into_iter().map(peer_from_pb).collect()
        };

        Ok(match ty {
            MessageType::Ping => KadMessage::Ping,
            MessageType::FindNode => KadMessage::FindNode {
                target: PeerId::from_bytes(raw.key).map_err(|_| MessageDecodeError::InvalidPeerId)?,
                closer_peers: closer_peers()?,
            },
            MessageType::GetProviders => KadMessage::GetProviders {
                key: Cid::try_from(raw.key)?,
                providers: raw
                    .provider_peers
                    .into_iter()
                    .map(peer_from_pb)
                    .collect::<Result<_, _>>()?,
                closer_peers: closer_peers()?,
            },
            MessageType::AddProvider => {
                let provider = raw
                    .provider_peers
                    .into_iter()
                    .next()
                    .ok_or(MessageDecodeError::MissingPayload)
                    .and_then(peer_from_pb)?;
                KadMessage::AddProvider {
                    key: Cid::try_from(raw.key)?,
                    provider,
                }
            }
            MessageType::GetValue => KadMessage::GetValue {
                key: raw.key,
                record: raw.record.map(record_from_pb),
                closer_peers: closer_peers()?,
            },
            MessageType::PutValue => KadMessage::PutValue {
                key: raw.key,
                record: raw.record.map(record_from_pb).ok_or(MessageDecodeError::MissingPayload)?,
            },
        })
    }
}
