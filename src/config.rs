//! The on-disk `config` record (spec.md §6, supplemented in SPEC_FULL.md §6): `identity`,
//! `addresses`, `bootstrap` and `datastore`, `serde_json`-encoded, mirroring go-ipfs's
//! `repo/config` shape closely enough that the file stays self-describing without this crate
//! needing to parse the surrounding CLI that writes it (out of scope per spec.md §1).

use libp2p::identity::Keypair;
use libp2p::{Multiaddr, PeerId};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::path::Path;

use crate::Error;

/// Current on-disk repo layout version. Bumped whenever the blockstore sharding scheme, the pin
/// index encoding, or the config shape changes in an incompatible way.
pub const REPO_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub identity: IdentityConfig,
    pub addresses: AddressesConfig,
    #[serde(default)]
    pub bootstrap: Vec<String>,
    #[serde(default)]
    pub datastore: DatastoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Base58-encoded peer id, kept redundantly alongside the keystore for quick inspection
    /// without touching the protected key material.
    pub peer_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressesConfig {
    pub swarm: Vec<String>,
    /// Preserved even though the core never binds it (API/gateway are external collaborators per
    /// spec.md §1); round-tripping it keeps the file self-describing for those outer layers.
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub gateway: Option<String>,
}

impl Default for AddressesConfig {
    fn default() -> Self {
        AddressesConfig {
            swarm: vec!["/ip4/0.0.0.0/tcp/4001".into()],
            api: None,
            gateway: None,
        }
    }
}

/// GC low/high water marks, matching the tuning knobs go-ipfs exposes under `Datastore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreConfig {
    pub storage_max: u64,
    pub gc_low_water_percent: u8,
    pub gc_high_water_percent: u8,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        DatastoreConfig {
            storage_max: 10 * 1024 * 1024 * 1024,
            gc_low_water_percent: 80,
            gc_high_water_percent: 90,
        }
    }
}

impl Config {
    pub fn new(keypair: &Keypair, bootstrap: &[(Multiaddr, PeerId)]) -> Self {
        let peer_id = keypair.public().into_peer_id();
        Config {
            identity: IdentityConfig {
                peer_id: peer_id.to_base58(),
            },
            addresses: AddressesConfig::default(),
            bootstrap: bootstrap
                .iter()
                .map(|(addr, peer)| format!("{}/p2p/{}", addr, peer))
                .collect(),
            datastore: DatastoreConfig::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| Error::invalid(format!("malformed config: {}", e)))
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(self).expect("Config serializes infallibly");
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Parses the `bootstrap` strings back into dialable `(Multiaddr, PeerId)` pairs, skipping
    /// (and logging) any entry that doesn't carry a trailing `/p2p/<peer id>` component.
    pub fn bootstrap_peers(&self) -> Vec<(Multiaddr, PeerId)> {
        self.bootstrap
            .iter()
            .filter_map(|s| {
                let mut addr: Multiaddr = s.parse().ok()?;
                let peer = match addr.pop()? {
                    libp2p::multiaddr::Protocol::P2p(hash) => PeerId::try_from(hash).ok()?,
                    _ => {
                        tracing::warn!(entry = %s, "bootstrap entry missing /p2p/<peer id>, skipping");
                        return None;
                    }
                };
                Some((addr, peer))
            })
            .collect()
    }
}

/// Reads the `version` file at the repo root and checks it against [`REPO_VERSION`]. Per spec.md
/// §7, a mismatch is fatal to the node: it is surfaced unchanged rather than silently migrated.
pub fn check_version(path: &Path) -> Result<(), Error> {
    let raw = std::fs::read_to_string(path)?;
    let on_disk: u32 = raw
        .trim()
        .parse()
        .map_err(|_| Error::invalid(format!("malformed version file at {}", path.display())))?;

    if on_disk != REPO_VERSION {
        return Err(Error::RepoVersionMismatch {
            on_disk,
            expected: REPO_VERSION,
        });
    }

    Ok(())
}

pub fn write_version(path: &Path) -> Result<(), Error> {
    std::fs::write(path, REPO_VERSION.to_string())?;
    Ok(())
}
