//! The error taxonomy shared by every layer of the node: blockstore, DAG, pinning, routing and
//! exchange all eventually funnel into [`Error`] so callers at the `Ipfs` boundary get one
//! consistent set of variants to match on, per the propagation rules of the error design.

use cid::Cid;
use libp2p::PeerId;
use std::fmt;

/// The crate-wide error type. Transient and permanent failures are kept distinct so a caller can
/// tell a retryable network hiccup from a corrupted repository without inspecting a message
/// string.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The key was absent locally and, for exchange-backed calls, could not be retrieved before
    /// the caller's deadline.
    #[error("block not found: {0}")]
    NotFound(Cid),

    /// A decode failure, a malformed multihash, a hash mismatch, or an unparsable address.
    #[error("invalid: {0}")]
    Invalid(String),

    /// A signed record failed verification.
    #[error("unauthorized")]
    Unauthorized,

    /// The caller's cancellation token tripped before the operation completed.
    #[error("operation canceled")]
    Canceled,

    /// The operation's deadline elapsed without resolving.
    #[error("timed out")]
    Timeout,

    /// A peer or transport error; the caller may retry against a different peer or address.
    #[error("transient failure: {0}")]
    Transient(String),

    /// A corrupted repository, an internal invariant violation, or a bug. Never retryable.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Not currently pinned (for `unpin` of a key that isn't in the requested pin set).
    #[error("not pinned: {0}")]
    NotPinned(Cid),

    /// Already pinned directly and recursively cannot be removed without specifying the matching
    /// kind.
    #[error("pin kind mismatch for {0}: {1}")]
    PinKindMismatch(Cid, String),

    /// A dial to every known address of a peer failed.
    #[error("failed to dial {0}: all addresses exhausted")]
    DialFailure(PeerId),

    /// The repository's on-disk `version` file doesn't match this build's `REPO_VERSION`.
    #[error("repo version mismatch: on-disk {on_disk}, expected {expected}")]
    RepoVersionMismatch { on_disk: u32, expected: u32 },

    /// The repo root exists but has not been initialized (no `config`/`version` present).
    #[error("repo at {0} is not initialized")]
    Uninitialized(std::path::PathBuf),

    /// Another process (or another `Repo` handle in this process) already holds the repo lock.
    #[error("repo at {0} is locked by another process")]
    RepoLocked(std::path::PathBuf),

    /// Wraps any lower-level `std::io::Error` encountered doing blockstore or config I/O.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else bubbling up from the boundary (CLI-ish callers, tests). Kept last and
    /// deliberately generic: library code should prefer a specific variant above.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn invalid(reason: impl fmt::Display) -> Self {
        Error::Invalid(reason.to_string())
    }

    pub fn transient(cause: impl fmt::Display) -> Self {
        Error::Transient(cause.to_string())
    }

    pub fn permanent(cause: impl fmt::Display) -> Self {
        Error::Permanent(cause.to_string())
    }

    /// Transient errors are the ones a higher layer is expected to retry (a different address, a
    /// different peer); everything else is terminal for the current attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::Timeout)
    }
}
