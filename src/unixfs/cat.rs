//! Streaming `cat`: walks a UnixFS file tree block by block, yielding content bytes as soon as
//! each leaf arrives rather than buffering the whole file (spec.md §4.3). Background prefetching
//! piggybacks on [`crate::refs::refs`] so later leaves are already in flight in the local
//! blockstore by the time the sequential walk reaches them.

use crate::{
    dag::{ResolveError, UnexpectedResolved},
    Error, Ipfs, IpfsTypes,
};
use async_stream::stream;
use bitswap::Block;
use cid::Cid;
use futures::stream::Stream;
use ipfs_unixfs::file::{
    visit::{IdleFileVisit, Visitation},
    FileReadFailed,
};
use std::borrow::Borrow;
use std::ops::Range;

/// How many links beyond the one needed next get handed to the background prefetcher per step.
/// Kept small: prefetching too eagerly on a huge file would turn `cat` into a full-file `get`.
const PREFETCH_FANOUT: usize = 8;

/// Returns a stream of the bytes making up the file at `starting_point`, optionally restricted to
/// `range`. Generic over how the caller holds onto its `Ipfs` handle (owned or borrowed) so the
/// returned stream can be made `'static` when needed.
pub async fn cat<'a, Types, MaybeOwned>(
    ipfs: MaybeOwned,
    starting_point: impl Into<StartingPoint>,
    range: Option<Range<u64>>,
) -> Result<impl Stream<Item = Result<Vec<u8>, TraversalFailed>> + Send + 'a, TraversalFailed>
where
    Types: IpfsTypes,
    MaybeOwned: Borrow<Ipfs<Types>> + Send + 'a,
{
    let mut visit = IdleFileVisit::default();
    if let Some(range) = range {
        visit = visit.with_target_range(range);
    }

    // the root block has to be resolved up front so we know whether this is even a file.
    let Block { cid, data } = match starting_point.into() {
        StartingPoint::Left(path) => {
            let dag = ipfs.borrow().dag();
            let (resolved, _) = dag
                .resolve(path, true)
                .await
                .map_err(TraversalFailed::Resolving)?;
            resolved
                .into_unixfs_block()
                .map_err(TraversalFailed::Path)?
        }
        StartingPoint::Right(block) => block,
    };

    let (first_bytes, visitation) = match visit.start(&data) {
        Ok((bytes, visitation)) => {
            let bytes = if !bytes.is_empty() {
                Some(bytes.to_vec())
            } else {
                None
            };
            (bytes, visitation)
        }
        Err(e) => return Err(TraversalFailed::Walking(cid, e)),
    };

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Cid>();

    let prefetch_task = tokio::spawn({
        use crate::IpfsPath;
        use futures::stream::StreamExt;
        use futures::TryStreamExt;

        let ipfs = ipfs.borrow().clone();
        async move {
            rx.for_each_concurrent(2, |cid| {
                let ipfs = ipfs.clone();
                async move {
                    let prefetched = crate::refs::refs(
                        ipfs,
                        futures::stream::once(futures::future::ready(Ok::<_, Error>(
                            IpfsPath::from(cid),
                        ))),
                        None,
                        true,
                    )
                    .try_fold(0usize, |count, _| futures::future::ready(Ok(count + 1)))
                    .await;

                    if let Err(e) = prefetched {
                        tracing::debug!("prefetch stopped early: {}", e);
                    }
                }
            })
            .await;
        }
    });

    let ipfs = ipfs.borrow().clone();

    Ok(stream! {
        if let Some(bytes) = first_bytes {
            yield Ok(bytes);
        }

        let mut visit = match visitation {
            Visitation::Completed(_) => None,
            Visitation::Continues(fv) => Some(fv),
        };

        while let Some(current) = visit {
            let next = match current.pending_links().next() {
                Some(cid) => cid.clone(),
                None => break,
            };

            let prefetch: Vec<Cid> = current
                .pending_links()
                .skip(1)
                .take(PREFETCH_FANOUT)
                .cloned()
                .collect();
            for cid in prefetch {
                let _ = tx.send(cid);
            }

            let block = match ipfs.get_block(&next).await {
                Ok(block) => block,
                Err(e) => {
                    yield Err(TraversalFailed::Loading(next, e));
                    break;
                }
            };

            match current.continue_walk(&block.data) {
                Ok((bytes, visitation)) => {
                    if !bytes.is_empty() {
                        yield Ok(bytes.to_vec());
                    }

                    visit = match visitation {
                        Visitation::Completed(_) => None,
                        Visitation::Continues(fv) => Some(fv),
                    };
                }
                Err(e) => {
                    yield Err(TraversalFailed::Walking(next, e));
                    break;
                }
            }
        }

        drop(tx);
        let _ = prefetch_task.await;
    })
}

/// The starting point for a unixfs walk: a path to resolve, or an already-fetched root block.
pub enum StartingPoint {
    Left(crate::IpfsPath),
    Right(Block),
}

impl<T: Into<crate::IpfsPath>> From<T> for StartingPoint {
    fn from(a: T) -> Self {
        Self::Left(a.into())
    }
}

impl From<Block> for StartingPoint {
    fn from(b: Block) -> Self {
        Self::Right(b)
    }
}

/// Failure modes of a `cat` walk.
#[derive(Debug, thiserror::Error)]
pub enum TraversalFailed {
    /// Failure to resolve the given path; does not happen when given a block.
    #[error("path resolving failed")]
    Resolving(#[source] ResolveError),

    /// The given path was resolved to a non dag-pb block, does not happen when starting the walk
    /// from a block.
    #[error("path resolved to unexpected")]
    Path(#[source] UnexpectedResolved),

    /// Loading of a block during the walk failed.
    #[error("loading of {} failed", .0)]
    Loading(Cid, #[source] Error),

    /// Processing of the block failed.
    #[error("walk failed on {}", .0)]
    Walking(Cid, #[source] FileReadFailed),
}
