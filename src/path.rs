//! `IpfsPath`: a root [`Cid`] plus the `/`-separated named-link segments still to be resolved
//! against it (SPEC_FULL.md §4.2's supplement to the Merkle DAG service).

use cid::Cid;
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IpfsPath {
    root: Cid,
    path: Vec<String>,
}

impl IpfsPath {
    pub fn new(root: Cid) -> Self {
        IpfsPath {
            root,
            path: Vec::new(),
        }
    }

    pub fn root(&self) -> &Cid {
        &self.root
    }

    /// The segments still to be resolved, in order.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.path.push(segment.into());
    }
}

impl From<Cid> for IpfsPath {
    fn from(root: Cid) -> Self {
        IpfsPath::new(root)
    }
}

impl fmt::Display for IpfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/ipfs/{}", self.root)?;
        for segment in &self.path {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("invalid cid in path: {0}")]
    InvalidCid(#[from] cid::Error),
}

impl FromStr for IpfsPath {
    type Err = PathError;

    /// Accepts `<cid>`, `/ipfs/<cid>` or `/ipfs/<cid>/a/b/c`; a leading `/ipfs/` is optional and
    /// stripped if present so a bare `Cid::to_string()` round-trips.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_start_matches('/');
        let mut segments = trimmed.split('/').filter(|s| !s.is_empty());

        let first = segments.next().ok_or(PathError::Empty)?;
        let first = if first == "ipfs" {
            segments.next().ok_or(PathError::Empty)?
        } else {
            first
        };

        let root = Cid::try_from(first)?;
        let path = segments.map(String::from).collect();

        Ok(IpfsPath { root, path })
    }
}
