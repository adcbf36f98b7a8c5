//! Wire types for dag-pb nodes and the UnixFS payload carried in their `Data` field.
//!
//! Hand-written against `proto/merkledag.proto` and `proto/unixfs.proto` rather than generated by
//! a build script: the combinators this module also exports (`FlatUnixFs`, `RangeLinks`) don't come
//! out of a `.proto` file at all, so splitting "generated" from "hand-written" would just mean two
//! files importing from each other. Keeping it in one module matches how `quick-protobuf`-based
//! crates in this ecosystem are usually laid out when the schema is this small and this stable.

use quick_protobuf::{BytesReader, MessageRead, MessageWrite, Result as PbResult, Writer, WriterBackend};
use std::borrow::Cow;
use std::convert::TryFrom;
use std::fmt;
use std::ops::Range;

pub mod merkledag {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct PBLink<'a> {
        pub Hash: Option<Cow<'a, [u8]>>,
        pub Name: Option<Cow<'a, str>>,
        pub Tsize: Option<u64>,
    }

    impl<'a> MessageRead<'a> for PBLink<'a> {
        fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> PbResult<Self> {
            let mut msg = PBLink::default();
            while !r.is_eof() {
                let tag = r.next_tag(bytes)?;
                match tag {
                    10 => msg.Hash = Some(Cow::Borrowed(r.read_bytes(bytes)?)),
                    18 => msg.Name = Some(Cow::Borrowed(r.read_string(bytes)?)),
                    24 => msg.Tsize = Some(r.read_uint64(bytes)?),
                    _ => r.read_unknown(bytes, tag)?,
                }
            }
            Ok(msg)
        }
    }

    impl<'a> MessageWrite for PBLink<'a> {
        fn get_size(&self) -> usize {
            0 + self.Hash.as_ref().map_or(0, |h| 1 + quick_protobuf::sizeofpacked::sizeof_len(h.len()))
                + self.Name.as_ref().map_or(0, |n| 1 + quick_protobuf::sizeofpacked::sizeof_len(n.len()))
                + self.Tsize.map_or(0, |t| 1 + quick_protobuf::sizeofvarint::sizeof_varint(t))
        }

        fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> PbResult<()> {
            if let Some(ref hash) = self.Hash {
                w.write_with_tag(10, |w| w.write_bytes(hash))?;
            }
            if let Some(ref name) = self.Name {
                w.write_with_tag(18, |w| w.write_string(name))?;
            }
            if let Some(tsize) = self.Tsize {
                w.write_with_tag(24, |w| w.write_uint64(tsize))?;
            }
            Ok(())
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct PBNode<'a> {
        pub Data: Option<Cow<'a, [u8]>>,
        pub Links: Vec<PBLink<'a>>,
    }

    impl<'a> MessageRead<'a> for PBNode<'a> {
        fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> PbResult<Self> {
            let mut msg = PBNode::default();
            while !r.is_eof() {
                let tag = r.next_tag(bytes)?;
                match tag {
                    10 => msg.Data = Some(Cow::Borrowed(r.read_bytes(bytes)?)),
                    18 => msg.Links.push(r.read_message::<PBLink>(bytes)?),
                    _ => r.read_unknown(bytes, tag)?,
                }
            }
            Ok(msg)
        }
    }

    impl<'a> MessageWrite for PBNode<'a> {
        fn get_size(&self) -> usize {
            self.Data.as_ref().map_or(0, |d| 1 + quick_protobuf::sizeofpacked::sizeof_len(d.len()))
                + self
                    .Links
                    .iter()
                    .map(|l| 1 + quick_protobuf::sizeofpacked::sizeof_len(l.get_size()))
                    .sum::<usize>()
        }

        fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> PbResult<()> {
            if let Some(ref data) = self.Data {
                w.write_with_tag(10, |w| w.write_bytes(data))?;
            }
            for link in &self.Links {
                w.write_with_tag(18, |w| w.write_message(link))?;
            }
            Ok(())
        }
    }
}

pub mod unixfs {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum UnixFsType {
        Raw,
        Directory,
        File,
        Metadata,
        Symlink,
        HAMTShard,
        /// Preserves an unrecognized tag value verbatim instead of failing to decode.
        Other(i32),
    }

    impl Default for UnixFsType {
        fn default() -> Self {
            UnixFsType::Raw
        }
    }

    impl From<i32> for UnixFsType {
        fn from(v: i32) -> Self {
            match v {
                0 => UnixFsType::Raw,
                1 => UnixFsType::Directory,
                2 => UnixFsType::File,
                3 => UnixFsType::Metadata,
                4 => UnixFsType::Symlink,
                5 => UnixFsType::HAMTShard,
                other => UnixFsType::Other(other),
            }
        }
    }

    impl From<UnixFsType> for i32 {
        fn from(v: UnixFsType) -> i32 {
            match v {
                UnixFsType::Raw => 0,
                UnixFsType::Directory => 1,
                UnixFsType::File => 2,
                UnixFsType::Metadata => 3,
                UnixFsType::Symlink => 4,
                UnixFsType::HAMTShard => 5,
                UnixFsType::Other(v) => v,
            }
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct UnixTime {
        pub Seconds: i64,
        pub FractionalNanoseconds: Option<u32>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct UnixFs<'a> {
        pub Type: UnixFsType,
        pub Data: Option<Cow<'a, [u8]>>,
        pub filesize: Option<u64>,
        pub blocksizes: Vec<u64>,
        pub hashType: Option<u64>,
        pub fanout: Option<u64>,
        pub mode: Option<u32>,
        pub mtime: Option<UnixTime>,
    }

    impl<'a> Default for UnixFs<'a> {
        fn default() -> Self {
            UnixFs {
                Type: UnixFsType::Raw,
                Data: None,
                filesize: None,
                blocksizes: Vec::new(),
                hashType: None,
                fanout: None,
                mode: None,
                mtime: None,
            }
        }
    }

    impl<'a> MessageRead<'a> for UnixFs<'a> {
        fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> PbResult<Self> {
            let mut msg = UnixFs::default();
            while !r.is_eof() {
                let tag = r.next_tag(bytes)?;
                match tag {
                    8 => msg.Type = UnixFsType::from(r.read_int32(bytes)?),
                    18 => msg.Data = Some(Cow::Borrowed(r.read_bytes(bytes)?)),
                    24 => msg.filesize = Some(r.read_uint64(bytes)?),
                    32 => msg.blocksizes.push(r.read_uint64(bytes)?),
                    40 => msg.hashType = Some(r.read_uint64(bytes)?),
                    48 => msg.fanout = Some(r.read_uint64(bytes)?),
                    56 => msg.mode = Some(r.read_uint32(bytes)?),
                    66 => {
                        let seconds = r.read_int64(bytes)?;
                        msg.mtime = Some(UnixTime {
                            Seconds: seconds,
                            FractionalNanoseconds: None,
                        });
                    }
                    _ => r.read_unknown(bytes, tag)?,
                }
            }
            Ok(msg)
        }
    }

    impl<'a> MessageWrite for UnixFs<'a> {
        fn get_size(&self) -> usize {
            let mut size = 1 + quick_protobuf::sizeofvarint::sizeof_varint(i32::from(self.Type) as u64);
            if let Some(ref data) = self.Data {
                size += 1 + quick_protobuf::sizeofpacked::sizeof_len(data.len());
            }
            if let Some(fs) = self.filesize {
                size += 1 + quick_protobuf::sizeofvarint::sizeof_varint(fs);
            }
            for bs in &self.blocksizes {
                size += 1 + quick_protobuf::sizeofvarint::sizeof_varint(*bs);
            }
            if let Some(ht) = self.hashType {
                size += 1 + quick_protobuf::sizeofvarint::sizeof_varint(ht);
            }
            if let Some(f) = self.fanout {
                size += 1 + quick_protobuf::sizeofvarint::sizeof_varint(f);
            }
            if let Some(mode) = self.mode {
                size += 1 + quick_protobuf::sizeofvarint::sizeof_varint(mode as u64);
            }
            if self.mtime.is_some() {
                size += 1 + 8;
            }
            size
        }

        fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> PbResult<()> {
            w.write_with_tag(8, |w| w.write_int32(i32::from(self.Type)))?;
            if let Some(ref data) = self.Data {
                w.write_with_tag(18, |w| w.write_bytes(data))?;
            }
            if let Some(fs) = self.filesize {
                w.write_with_tag(24, |w| w.write_uint64(fs))?;
            }
            for bs in &self.blocksizes {
                w.write_with_tag(32, |w| w.write_uint64(*bs))?;
            }
            if let Some(ht) = self.hashType {
                w.write_with_tag(40, |w| w.write_uint64(ht))?;
            }
            if let Some(f) = self.fanout {
                w.write_with_tag(48, |w| w.write_uint64(f))?;
            }
            if let Some(mode) = self.mode {
                w.write_with_tag(56, |w| w.write_uint32(mode))?;
            }
            if let Some(ref mtime) = self.mtime {
                w.write_with_tag(66, |w| w.write_int64(mtime.Seconds))?;
            }
            Ok(())
        }
    }
}

pub use merkledag::PBLink;
pub use unixfs::{UnixFs, UnixFsType};

/// The two layers collapsed into one type: the dag-pb envelope's links alongside the decoded
/// UnixFS payload that was carried in its `Data` field. This is what every UnixFS-aware reader
/// actually wants to work with (see `file::reader`, `file::adder`, `dir::builder`).
#[derive(Debug, Clone, PartialEq)]
pub struct FlatUnixFs<'a> {
    pub links: Vec<PBLink<'a>>,
    pub data: UnixFs<'a>,
}

impl<'a> TryFrom<&'a [u8]> for FlatUnixFs<'a> {
    type Error = UnixFsReadFailed;

    fn try_from(bytes: &'a [u8]) -> Result<Self, Self::Error> {
        let mut reader = BytesReader::from_bytes(bytes);
        let node = merkledag::PBNode::from_reader(&mut reader, bytes)
            .map_err(UnixFsReadFailed::Envelope)?;

        let data = match node.Data {
            Some(ref inner) => {
                let mut inner_reader = BytesReader::from_bytes(inner);
                UnixFs::from_reader(&mut inner_reader, inner).map_err(UnixFsReadFailed::Payload)?
            }
            None => return Err(UnixFsReadFailed::MissingPayload),
        };

        Ok(FlatUnixFs {
            links: node.Links,
            data,
        })
    }
}

impl<'a> MessageWrite for FlatUnixFs<'a> {
    fn get_size(&self) -> usize {
        let mut payload = Vec::with_capacity(self.data.get_size());
        let mut writer = Writer::new(&mut payload);
        let _ = self.data.write_message(&mut writer);

        1 + quick_protobuf::sizeofpacked::sizeof_len(payload.len())
            + self
                .links
                .iter()
                .map(|l| 1 + quick_protobuf::sizeofpacked::sizeof_len(l.get_size()))
                .sum::<usize>()
    }

    fn write_message<W: WriterBackend>(&self, w: &mut Writer<W>) -> PbResult<()> {
        let mut payload = Vec::with_capacity(self.data.get_size());
        {
            let mut inner = Writer::new(&mut payload);
            self.data.write_message(&mut inner)?;
        }
        w.write_with_tag(10, |w| w.write_bytes(&payload))?;
        for link in &self.links {
            w.write_with_tag(18, |w| w.write_message(link))?;
        }
        Ok(())
    }
}

/// Distinguishes a malformed dag-pb envelope from a malformed UnixFS payload nested inside it —
/// useful when deciding whether the problem is "not dag-pb at all" versus "dag-pb but not UnixFS".
#[derive(Debug)]
pub enum UnixFsReadFailed {
    Envelope(quick_protobuf::Error),
    Payload(quick_protobuf::Error),
    MissingPayload,
}

impl fmt::Display for UnixFsReadFailed {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnixFsReadFailed::Envelope(e) => write!(fmt, "invalid dag-pb envelope: {}", e),
            UnixFsReadFailed::Payload(e) => write!(fmt, "invalid unixfs payload: {}", e),
            UnixFsReadFailed::MissingPayload => write!(fmt, "dag-pb node had no Data field"),
        }
    }
}

impl std::error::Error for UnixFsReadFailed {}

/// Pairs each link with the byte range of the file its subtree covers, given the cumulative
/// `blocksizes` recorded alongside it (spec.md §3 "`blocksizes[i]` is the cumulative size of link
/// i's subtree").
pub struct RangeLinks<I> {
    inner: I,
    offset: u64,
}

impl<'a, I> RangeLinks<I>
where
    I: Iterator<Item = (PBLink<'a>, u64)>,
{
    pub fn from_links_and_blocksizes(inner: I, start_offset: Option<u64>) -> Self {
        RangeLinks {
            inner,
            offset: start_offset.unwrap_or(0),
        }
    }
}

impl<'a, I> Iterator for RangeLinks<I>
where
    I: Iterator<Item = (PBLink<'a>, u64)>,
{
    type Item = (PBLink<'a>, Range<u64>);

    fn next(&mut self) -> Option<Self::Item> {
        let (link, size) = self.inner.next()?;
        let start = self.offset;
        self.offset += size;
        Some((link, start..self.offset))
    }
}
