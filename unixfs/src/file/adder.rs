//! Streaming ingestion of a byte stream into a UnixFS file tree: a [`Chunker`] splits the input
//! into leaves, [`FileAdder`] assembles leaves (and, once there are enough of them, internal nodes)
//! bottom-up into a single balanced tree, capping fan-out at `max_links` per node.

use crate::hash::cid_for_dag_pb;
use crate::pb::{FlatUnixFs, PBLink, UnixFs, UnixFsType};
use cid::Cid;
use quick_protobuf::{MessageWrite, Writer};
use std::borrow::Cow;
use std::collections::VecDeque;

/// Default leaf size for the fixed-size chunker: 256 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Default fan-out cap for internal nodes, matching go-ipfs's balanced layout.
pub const DEFAULT_MAX_LINKS: usize = 174;

/// Splits an incoming byte stream into leaf-sized chunks.
pub enum Chunker {
    /// Every leaf (except possibly the last) is exactly this many bytes.
    Size(usize),
    /// Content-defined splitting: a leaf boundary falls wherever a rolling hash over the last
    /// `window` bytes matches `mask`, bounded to `[min_size, max_size]`. Two inputs differing only
    /// in a prepended or removed byte still produce mostly-identical chunk boundaries past the
    /// edit, unlike the fixed-size chunker.
    Rabin(RabinChunker),
}

impl Default for Chunker {
    fn default() -> Self {
        Chunker::Size(DEFAULT_CHUNK_SIZE)
    }
}

impl Chunker {
    /// Feeds as much of `input` as fits before the next chunk boundary (or all of it, if no
    /// boundary is reached). `buffered_len` is how many bytes are already waiting in the caller's
    /// block buffer ahead of this call. Returns the accepted prefix of `input` and whether a
    /// boundary was reached (the caller should flush its buffer as a leaf when `true`).
    fn accept<'a>(&mut self, input: &'a [u8], buffered_len: usize) -> (&'a [u8], bool) {
        match self {
            Chunker::Size(target) => {
                let remaining = target.saturating_sub(buffered_len);
                let take = input.len().min(remaining);
                let ready = buffered_len + take >= *target;
                (&input[..take], ready)
            }
            Chunker::Rabin(r) => r.accept(input, buffered_len),
        }
    }
}

/// A rolling-hash content-defined chunker.
pub struct RabinChunker {
    min_size: usize,
    max_size: usize,
    window: usize,
    mask: u64,
    ring: VecDeque<u8>,
    hash: u64,
}

impl RabinChunker {
    pub fn new(min_size: usize, avg_size: usize, max_size: usize) -> Self {
        let bits = (avg_size.max(2) as f64).log2().round() as u32;
        let mask = (1u64 << bits.min(63)) - 1;
        RabinChunker {
            min_size,
            max_size,
            window: 48,
            mask,
            ring: VecDeque::with_capacity(48),
            hash: 0,
        }
    }

    fn push_byte(&mut self, byte: u8) {
        self.ring.push_back(byte);
        self.hash = self.hash.wrapping_add(byte as u64);
        if self.ring.len() > self.window {
            if let Some(old) = self.ring.pop_front() {
                self.hash = self.hash.wrapping_sub(old as u64);
            }
        }
    }

    fn accept<'a>(&mut self, input: &'a [u8], buffered_len: usize) -> (&'a [u8], bool) {
        let mut consumed = 0usize;
        let mut total = buffered_len;

        for &byte in input {
            consumed += 1;
            total += 1;
            self.push_byte(byte);

            if total >= self.max_size {
                self.ring.clear();
                self.hash = 0;
                return (&input[..consumed], true);
            }

            if total >= self.min_size && self.ring.len() >= self.window && (self.hash & self.mask) == 0 {
                self.ring.clear();
                self.hash = 0;
                return (&input[..consumed], true);
            }
        }

        (&input[..consumed], false)
    }
}

impl Default for RabinChunker {
    fn default() -> Self {
        RabinChunker::new(64 * 1024, DEFAULT_CHUNK_SIZE, 1024 * 1024)
    }
}

/// Assembles a UnixFS file (or raw-leaf) tree from a stream of pushed byte slices.
///
/// Every leaf emitted by `push` is a finished, content-addressed block the caller must store;
/// `finish` then folds the collected leaves into as many layers of internal nodes as needed to
/// bring the link count at each layer under `max_links`, returning those internal blocks plus the
/// root's [`Cid`].
pub struct FileAdder {
    chunker: Chunker,
    max_links: usize,
    block_buffer: Vec<u8>,
    leaves: Vec<(Cid, u64)>,
    had_any_bytes: bool,
}

impl Default for FileAdder {
    fn default() -> Self {
        FileAdder::new()
    }
}

impl FileAdder {
    pub fn new() -> Self {
        FileAdder::with_chunker(Chunker::default())
    }

    pub fn with_chunker(chunker: Chunker) -> Self {
        FileAdder {
            chunker,
            max_links: DEFAULT_MAX_LINKS,
            block_buffer: Vec::new(),
            leaves: Vec::new(),
            had_any_bytes: false,
        }
    }

    /// Feeds more input bytes. Returns any leaf blocks that became ready as a result, plus how many
    /// bytes of `input` were consumed (always all of it; the return value exists so a caller
    /// reading from a `Read` can assert full consumption without a separate check).
    pub fn push(&mut self, mut input: &[u8]) -> Result<(Vec<(Cid, Vec<u8>)>, usize), quick_protobuf::Error> {
        let mut emitted = Vec::new();
        let mut total_consumed = 0;

        while !input.is_empty() {
            let (accepted, ready) = self.chunker.accept(input, self.block_buffer.len());
            let n = accepted.len();

            if n == 0 && !ready {
                // Chunker has nothing more to say about this input right now (shouldn't normally
                // happen for the built-in chunkers, but avoids looping forever on a pathological
                // implementation).
                break;
            }

            self.block_buffer.extend_from_slice(accepted);
            input = &input[n..];
            total_consumed += n;
            self.had_any_bytes = self.had_any_bytes || n > 0;

            if ready {
                let (cid, bytes, size) = encode_leaf(&self.block_buffer)?;
                self.leaves.push((cid.clone(), size));
                emitted.push((cid, bytes));
                self.block_buffer.clear();
            }
        }

        Ok((emitted, total_consumed))
    }

    /// Finalizes the tree. Returns every block produced during finalization (the trailing partial
    /// leaf, if any, followed by however many layers of internal nodes were needed) and the `Cid`
    /// of the root. For a file that fit entirely in one chunk, that root is the single leaf block
    /// (which may have already been returned by an earlier `push`, or may be the sole entry
    /// returned here).
    pub fn finish(mut self) -> Result<(Vec<(Cid, Vec<u8>)>, Cid), quick_protobuf::Error> {
        let mut emitted = Vec::new();

        if !self.block_buffer.is_empty() || (!self.had_any_bytes && self.leaves.is_empty()) {
            let (cid, bytes, size) = encode_leaf(&self.block_buffer)?;
            self.leaves.push((cid.clone(), size));
            emitted.push((cid, bytes));
        }

        if self.leaves.len() == 1 {
            let (root, _) = self.leaves.remove(0);
            return Ok((emitted, root));
        }

        let mut level = self.leaves;
        loop {
            let mut next_level = Vec::with_capacity((level.len() + self.max_links - 1) / self.max_links);
            for chunk in level.chunks(self.max_links) {
                let (cid, bytes, size) = encode_internal(chunk)?;
                emitted.push((cid.clone(), bytes));
                next_level.push((cid, size));
            }
            if next_level.len() == 1 {
                return Ok((emitted, next_level.remove(0).0));
            }
            level = next_level;
        }
    }
}

fn encode_leaf(data: &[u8]) -> Result<(Cid, Vec<u8>, u64), quick_protobuf::Error> {
    let node = FlatUnixFs {
        links: Vec::new(),
        data: UnixFs {
            Type: UnixFsType::File,
            Data: if data.is_empty() {
                None
            } else {
                Some(Cow::Borrowed(data))
            },
            filesize: Some(data.len() as u64),
            blocksizes: Vec::new(),
            hashType: None,
            fanout: None,
            mode: None,
            mtime: None,
        },
    };

    encode_node(node, data.len() as u64)
}

fn encode_internal(children: &[(Cid, u64)]) -> Result<(Cid, Vec<u8>, u64), quick_protobuf::Error> {
    let total: u64 = children.iter().map(|(_, size)| *size).sum();

    let links = children
        .iter()
        .map(|(cid, size)| PBLink {
            Hash: Some(Cow::Owned(cid.to_bytes())),
            Name: Some(Cow::Borrowed("")),
            Tsize: Some(*size),
        })
        .collect();

    let blocksizes = children.iter().map(|(_, size)| *size).collect();

    let node = FlatUnixFs {
        links,
        data: UnixFs {
            Type: UnixFsType::File,
            Data: None,
            filesize: Some(total),
            blocksizes,
            hashType: None,
            fanout: None,
            mode: None,
            mtime: None,
        },
    };

    encode_node(node, total)
}

fn encode_node(node: FlatUnixFs<'_>, total_size: u64) -> Result<(Cid, Vec<u8>, u64), quick_protobuf::Error> {
    let mut bytes = Vec::with_capacity(node.get_size());
    {
        let mut writer = Writer::new(&mut bytes);
        node.write_message(&mut writer)?;
    }

    let cid = cid_for_dag_pb(&bytes);
    Ok((cid, bytes, total_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn favourite_single_block_file() {
        let content = b"foobar\n";

        let mut adder = FileAdder::new();
        let (blocks, consumed) = adder.push(content).unwrap();
        assert!(blocks.is_empty());
        assert_eq!(consumed, content.len());

        let (mut blocks, root) = adder.finish().unwrap();
        assert_eq!(blocks.len(), 1);
        let (cid, bytes) = blocks.pop().unwrap();
        assert_eq!(cid, root);

        let expected: &[u8] = &[
            0x0a, 0x0d, 0x08, 0x02, 0x12, 0x07, b'f', b'o', b'o', b'b', b'a', b'r', b'\n', 0x18, 0x07,
        ];
        assert_eq!(bytes, expected);
        assert_eq!(cid.to_string(), "QmRgutAxd8t7oGkSm4wmeuByG6M51wcTso6cubDdQtuEfL");
    }

    #[test]
    fn empty_file_has_single_empty_root() {
        let adder = FileAdder::new();
        let (blocks, root) = adder.finish().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].0, root);
        assert_eq!(blocks[0].1, &[0x0a, 0x04, 0x08, 0x02, 0x18, 0x00][..]);
    }

    #[test]
    fn multi_chunk_file_builds_one_internal_layer() {
        let mut adder = FileAdder::with_chunker(Chunker::Size(2));
        let mut emitted = Vec::new();
        let (blocks, _) = adder.push(b"foobar\n").unwrap();
        emitted.extend(blocks);
        let (blocks, root) = adder.finish().unwrap();
        emitted.extend(blocks);

        // 4 leaves ("fo", "ob", "ar", "\n") + 1 internal root
        assert_eq!(emitted.len(), 5);
        assert_eq!(emitted.last().unwrap().0, root);
    }

    #[test]
    fn max_links_forces_multiple_layers() {
        let mut adder = FileAdder::with_chunker(Chunker::Size(1));
        adder.max_links = 2;

        let input = b"abcde";
        let (mut emitted, _) = adder.push(input).unwrap();
        let (more, root) = adder.finish().unwrap();
        emitted.extend(more);

        // 5 leaves, fanout 2: layer1 has ceil(5/2)=3 nodes, layer2 has ceil(3/2)=2, layer3 has 1
        // root => 5 leaves + 3 + 2 + 1 = 11 blocks total.
        assert_eq!(emitted.len(), 11);
        assert_eq!(emitted.last().unwrap().0, root);
    }
}
