//! `refs`: lists the outgoing links of one or more DAG nodes, by content address, optionally
//! walking the whole reachable graph (go-ipfs `core/commands/refs.go`). [`crate::unixfs::cat::cat`]
//! drives this with `unique = true` purely for its fetch-ahead side effect: walking the graph
//! through [`Ipfs::get_block`] pulls every linked block into the local blockstore even though that
//! caller only counts the edges produced, it never inspects them.

use crate::{Error, Ipfs, IpfsPath, IpfsTypes};
use async_stream::try_stream;
use cid::Cid;
use futures::stream::Stream;
use futures::TryStreamExt;
use std::collections::HashSet;

/// One traversed link: `source` names the block that carried it, `destination` the block it
/// points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    pub source: Cid,
    pub destination: Cid,
    pub name: String,
}

/// Resolves every path from `paths` and walks each one's DAG closure depth-first, yielding an
/// [`Edge`] per link followed. `max_depth` bounds how many hops past the root are walked (`None`
/// is unbounded); `unique` skips the subtree of an already-visited key, the same dedup
/// [`crate::dag::enumerate_children`] performs.
pub fn refs<Types, Paths>(
    ipfs: Ipfs<Types>,
    paths: Paths,
    max_depth: Option<u64>,
    unique: bool,
) -> impl Stream<Item = Result<Edge, Error>>
where
    Types: IpfsTypes,
    Paths: Stream<Item = Result<IpfsPath, Error>> + Send + 'static,
{
    try_stream! {
        let mut visited: HashSet<Cid> = HashSet::new();
        futures::pin_mut!(paths);

        while let Some(path) = paths.try_next().await? {
            let dag = ipfs.dag();
            let (resolved, _) = dag
                .resolve(path, false)
                .await
                .map_err(|e| Error::invalid(e.to_string()))?;

            let mut stack = vec![(resolved.cid.clone(), 0u64)];

            while let Some((cid, depth)) = stack.pop() {
                if unique && !visited.insert(cid.clone()) {
                    continue;
                }
                if let Some(max) = max_depth {
                    if depth >= max {
                        continue;
                    }
                }

                let node = dag.get(&cid).await?;
                for link in node.links {
                    yield Edge {
                        source: cid.clone(),
                        destination: link.cid.clone(),
                        name: link.name.clone(),
                    };
                    stack.push((link.cid, depth + 1));
                }
            }
        }
    }
}
