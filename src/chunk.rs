// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling the flat chunk containers used by AIFF and RIFF WAVE
//!
//! Both formats share the same layout,
//! differing only in their magic numbers and endianness:
//!
//! | Bytes | Field |
//! |------:|-------|
//! | 4 | container magic (`FORM` or `RIFF`) |
//! | 4 | container size, which counts the form type and all chunks |
//! | 4 | form type (`AIFF`, `AIFC` or `WAVE`) |
//! | … | chunks |
//!
//! and each chunk is:
//!
//! | Bytes | Field |
//! |------:|-------|
//! | 4 | chunk ID, printable ASCII |
//! | 4 | body size, not counting header or padding |
//! | size | body |
//! | size % 2 | padding byte |

use crate::{Error, Options};
use bitstream_io::{
    BigEndian, ByteRead, ByteReader, ByteWrite, ByteWriter, Endianness, FromByteStream,
    LittleEndian, ToByteStream,
};
use std::borrow::Cow;
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

/// A 4 byte chunk identifier made of printable ASCII
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ChunkId([u8; 4]);

impl ChunkId {
    /// AIFF container magic
    pub const FORM: Self = Self(*b"FORM");
    /// RIFF container magic
    pub const RIFF: Self = Self(*b"RIFF");
    /// AIFF form type
    pub const AIFF: Self = Self(*b"AIFF");
    /// AIFF-C form type
    pub const AIFC: Self = Self(*b"AIFC");
    /// WAVE form type
    pub const WAVE: Self = Self(*b"WAVE");
    /// AIFF common chunk
    pub const COMM: Self = Self(*b"COMM");
    /// AIFF sound data chunk
    pub const SSND: Self = Self(*b"SSND");
    /// WAVE format chunk
    pub const FMT: Self = Self(*b"fmt ");
    /// WAVE data chunk
    pub const DATA: Self = Self(*b"data");
    /// ID3v2 tag chunk, as used by AIFF
    pub const ID3: Self = Self(*b"ID3 ");
    /// ID3v2 tag chunk, as used by WAVE
    pub const ID3_WAVE: Self = Self(*b"id3 ");

    /// Builds ID from bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidChunkId`] if any byte
    /// is outside the printable ASCII range.
    ///
    /// ```
    /// use audio_containers::chunk::ChunkId;
    ///
    /// assert_eq!(ChunkId::new(*b"COMM").unwrap(), ChunkId::COMM);
    /// assert!(ChunkId::new([b'C', 0, b'M', b'M']).is_err());
    /// ```
    pub fn new(id: [u8; 4]) -> Result<Self, Error> {
        if id.iter().all(|b| (0x20..=0x7E).contains(b)) {
            Ok(Self(id))
        } else {
            Err(Error::InvalidChunkId(id))
        }
    }

    /// Returns our raw bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // all bytes are printable ASCII
        self.0
            .iter()
            .try_for_each(|b| write!(f, "{}", char::from(*b)))
    }
}

impl PartialEq<[u8; 4]> for ChunkId {
    fn eq(&self, other: &[u8; 4]) -> bool {
        self.0 == *other
    }
}

impl FromByteStream for ChunkId {
    type Error = Error;

    fn from_reader<R: ByteRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        Self::new(r.read()?)
    }
}

impl ToByteStream for ChunkId {
    type Error = std::io::Error;

    fn to_writer<W: ByteWrite + ?Sized>(&self, w: &mut W) -> std::io::Result<()> {
        w.write(self.0)
    }
}

/// A chunk's 8 byte header
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChunkHeader {
    /// The chunk's ID
    pub id: ChunkId,
    /// The chunk's body size, in bytes
    pub size: u32,
}

impl FromByteStream for ChunkHeader {
    type Error = Error;

    fn from_reader<R: ByteRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.parse()?,
            size: r.read()?,
        })
    }
}

impl ToByteStream for ChunkHeader {
    type Error = std::io::Error;

    fn to_writer<W: ByteWrite + ?Sized>(&self, w: &mut W) -> std::io::Result<()> {
        w.build(&self.id)?;
        w.write(self.size)
    }
}

/// A flavor of flat chunk container
pub trait Container {
    /// The byte order of all the container's fields
    type Endianness: Endianness;

    /// The container's leading magic number
    const MAGIC: ChunkId;

    /// Acceptable form types following the container size
    const FORM_TYPES: &'static [ChunkId];

    /// The chunk holding the container's audio data,
    /// which is never loaded into memory
    const AUDIO: ChunkId;

    /// Error for streams whose magic number does not match
    fn not_container() -> Error;

    /// Error for streams whose magic number matches
    /// but whose structure is invalid
    fn invalid() -> Error;
}

/// The big-endian `FORM` container used by AIFF
#[derive(Copy, Clone, Debug)]
pub struct Form;

impl Container for Form {
    type Endianness = BigEndian;
    const MAGIC: ChunkId = ChunkId::FORM;
    const FORM_TYPES: &'static [ChunkId] = &[ChunkId::AIFF, ChunkId::AIFC];
    const AUDIO: ChunkId = ChunkId::SSND;

    fn not_container() -> Error {
        Error::InvalidAiff("not an AIFF file")
    }

    fn invalid() -> Error {
        Error::InvalidAiff("invalid AIFF file")
    }
}

/// The little-endian `RIFF` container used by WAVE
#[derive(Copy, Clone, Debug)]
pub struct Riff;

impl Container for Riff {
    type Endianness = LittleEndian;
    const MAGIC: ChunkId = ChunkId::RIFF;
    const FORM_TYPES: &'static [ChunkId] = &[ChunkId::WAVE];
    const AUDIO: ChunkId = ChunkId::DATA;

    fn not_container() -> Error {
        Error::InvalidWave("not a RIFF WAVE file")
    }

    fn invalid() -> Error {
        Error::InvalidWave("invalid RIFF WAVE file")
    }
}

/// A container's 12 byte header
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ContainerHeader {
    /// Size of the form type and all chunks, in bytes
    pub size: u32,
    /// The container's form type
    pub form_type: ChunkId,
}

impl ContainerHeader {
    /// Reads and validates header for the given container
    ///
    /// # Errors
    ///
    /// Returns the container's "not a container" error
    /// if the magic number is missing or the stream is too short,
    /// or its "invalid" error if the form type is wrong.
    pub fn read<C: Container, R: Read>(reader: R) -> Result<Self, Error> {
        let mut header = [0; 12];
        ByteReader::<_, C::Endianness>::new(reader)
            .read_bytes(&mut header)
            .map_err(|_| C::not_container())?;

        let mut r = ByteReader::<_, C::Endianness>::new(header.as_slice());
        if C::MAGIC != r.read::<[u8; 4]>()? {
            return Err(C::not_container());
        }
        let size = r.read::<u32>()?;
        let form_type = r.read::<[u8; 4]>()?;

        C::FORM_TYPES
            .iter()
            .find(|t| **t == form_type)
            .map(|form_type| Self {
                size,
                form_type: *form_type,
            })
            .ok_or_else(C::invalid)
    }

    /// Writes header for the given container
    pub fn write<C: Container, W: Write>(&self, writer: W) -> Result<(), Error> {
        let mut w = ByteWriter::<_, C::Endianness>::new(writer);
        w.build(&C::MAGIC)?;
        w.write(self.size)?;
        w.build(&self.form_type)?;
        Ok(())
    }
}

/// Where a chunk's body may be found
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChunkData {
    /// A body loaded into memory
    Memory(Vec<u8>),
    /// A body left in a file, to be reopened as needed
    File {
        /// The file's path
        path: Arc<Path>,
        /// Absolute offset of the body within the file
        offset: u64,
    },
    /// A body left in a stream with no path
    ///
    /// Only the stream it was enumerated from
    /// can provide its contents.
    Stream {
        /// Absolute offset of the body within the stream
        offset: u64,
    },
}

impl ChunkData {
    /// Offset of body in its file or stream, if not in memory
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::Memory(_) => None,
            Self::File { offset, .. } | Self::Stream { offset } => Some(*offset),
        }
    }
}

/// A single chunk
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Chunk {
    /// The chunk's ID
    pub id: ChunkId,
    /// The chunk's body size, in bytes
    pub size: u32,
    /// The chunk's body
    pub data: ChunkData,
}

impl Chunk {
    /// Builds an in-memory chunk from its ID and body
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChunkSizeMismatch`] if the body
    /// is too large to fit in a chunk.
    pub fn new(id: ChunkId, body: Vec<u8>) -> Result<Self, Error> {
        Ok(Self {
            id,
            size: body
                .len()
                .try_into()
                .map_err(|_| Error::ChunkSizeMismatch)?,
            data: ChunkData::Memory(body),
        })
    }

    /// Our header
    #[inline]
    pub fn header(&self) -> ChunkHeader {
        ChunkHeader {
            id: self.id,
            size: self.size,
        }
    }

    /// Whether a padding byte follows the body
    #[inline]
    pub fn is_padded(&self) -> bool {
        self.size % 2 == 1
    }

    /// Total space taken by chunk in its container,
    /// including header and padding
    ///
    /// ```
    /// use audio_containers::chunk::{Chunk, ChunkId};
    ///
    /// let chunk = Chunk::new(ChunkId::new(*b"NAME").unwrap(), b"odd".to_vec()).unwrap();
    /// assert_eq!(chunk.total_size(), 8 + 3 + 1);
    /// ```
    #[inline]
    pub fn total_size(&self) -> u64 {
        8 + u64::from(self.size) + u64::from(self.size % 2)
    }

    /// Returns the chunk's body
    ///
    /// File-bound bodies are read from their file.
    ///
    /// # Errors
    ///
    /// Returns an error if the body's file can't be read,
    /// or if the body is bound to an anonymous stream.
    pub fn data(&self) -> Result<Cow<'_, [u8]>, Error> {
        match &self.data {
            ChunkData::Memory(data) => Ok(Cow::Borrowed(data)),
            ChunkData::File { .. } | ChunkData::Stream { .. } => {
                let mut data = Vec::with_capacity(self.size as usize);
                self.copy_body(&mut data)?;
                Ok(Cow::Owned(data))
            }
        }
    }

    /// Copies the chunk's body, without padding, to the given writer
    pub fn copy_body<W: Write + ?Sized>(&self, w: &mut W) -> Result<(), Error> {
        match &self.data {
            ChunkData::Memory(data) => w.write_all(data).map_err(Error::Io),
            ChunkData::File { path, offset } => {
                let mut f = std::fs::File::open(path)?;
                f.seek(SeekFrom::Start(*offset))?;
                crate::swap::copy_exact(f, w, self.size.into())
            }
            ChunkData::Stream { .. } => Err(Error::Encoding(format!(
                "{} chunk body is not available",
                self.id
            ))),
        }
    }

    /// Copies the chunk's body from the stream it was enumerated from
    pub fn copy_body_from<R, W>(&self, r: &mut R, w: &mut W) -> Result<(), Error>
    where
        R: Read + Seek,
        W: Write + ?Sized,
    {
        match &self.data {
            ChunkData::Stream { offset } => {
                r.seek(SeekFrom::Start(*offset))?;
                crate::swap::copy_exact(r, w, self.size.into())
            }
            _ => self.copy_body(w),
        }
    }

    /// Writes whole chunk, including header and padding
    pub fn write<E: Endianness, W: Write>(&self, w: &mut W) -> Result<(), Error> {
        let mut w = ByteWriter::<_, E>::new(w);
        w.build(&self.header())?;
        self.copy_body(w.writer())?;
        if self.is_padded() {
            w.write::<u8>(0)?;
        }
        Ok(())
    }
}

/// Total container size of the given chunks,
/// including the 4 byte form type
///
/// This is the value stored in the container's header.
pub fn total_size<'c, I: IntoIterator<Item = &'c Chunk>>(chunks: I) -> u64 {
    4 + chunks.into_iter().map(|c| c.total_size()).sum::<u64>()
}

/// An iterator over a container's chunks
///
/// Chunks are yielded in file order.
/// Small chunks are loaded into memory while
/// the audio chunk and any large chunks are left in place.
/// Once an error is returned, no more chunks are yielded.
pub struct Chunks<R, C> {
    reader: R,
    header: ContainerHeader,
    path: Option<Arc<Path>>,
    in_memory_limit: u32,
    // bytes remaining according to the container header
    remaining: u32,
    // actual end of the underlying stream
    stream_end: u64,
    failed: bool,
    container: PhantomData<C>,
}

impl<C: Container> Chunks<std::io::BufReader<std::fs::File>, C> {
    /// Opens file and reads its container header
    ///
    /// Large chunks are bound to the file by path.
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self, Error> {
        let path = path.as_ref();
        std::fs::File::open(path)
            .map_err(Error::Io)
            .and_then(|f| Self::new(std::io::BufReader::new(f), options))
            .map(|chunks| Self {
                path: Some(Arc::from(path)),
                ..chunks
            })
    }
}

impl<R: Read + Seek, C: Container> Chunks<R, C> {
    /// Reads container header from the start of the stream
    pub fn new(mut reader: R, options: Options) -> Result<Self, Error> {
        let stream_end = reader.seek(SeekFrom::End(0))?;
        reader.rewind()?;

        let header = ContainerHeader::read::<C, _>(reader.by_ref())?;

        let remaining = header.size.checked_sub(4).ok_or_else(C::invalid)?;

        if stream_end > u64::from(header.size) + 8 {
            log::warn!(
                "{} bytes follow the declared end of {} container",
                stream_end - (u64::from(header.size) + 8),
                C::MAGIC,
            );
        }

        Ok(Self {
            reader,
            header,
            path: None,
            in_memory_limit: options.get_in_memory_limit(),
            remaining,
            stream_end,
            failed: false,
            container: PhantomData,
        })
    }

    /// The container's header
    #[inline]
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Returns the underlying stream
    pub fn into_reader(self) -> R {
        self.reader
    }

    fn read_chunk(&mut self) -> Result<Chunk, Error> {
        let header = self
            .remaining
            .checked_sub(8)
            .ok_or(Error::ChunkSizeMismatch)
            .and_then(|remaining| {
                self.remaining = remaining;
                ByteReader::<_, C::Endianness>::new(self.reader.by_ref()).parse::<ChunkHeader>()
            })?;

        self.remaining = self
            .remaining
            .checked_sub(header.size)
            .ok_or(Error::ChunkSizeMismatch)?;

        let data = if header.id != C::AUDIO && header.size <= self.in_memory_limit {
            let mut data = vec![0; header.size as usize];
            self.reader.read_exact(&mut data)?;
            ChunkData::Memory(data)
        } else {
            // the audio chunk could potentially be very large,
            // so seek over it instead of reading it
            let offset = self.reader.stream_position()?;
            if offset + u64::from(header.size) > self.stream_end {
                return Err(Error::Truncated);
            }
            self.reader.seek(SeekFrom::Current(header.size.into()))?;
            match &self.path {
                Some(path) => ChunkData::File {
                    path: path.clone(),
                    offset,
                },
                None => ChunkData::Stream { offset },
            }
        };

        if header.size % 2 == 1 {
            match self.remaining.checked_sub(1) {
                Some(remaining) => {
                    let mut pad = [0; 1];
                    self.reader.read_exact(&mut pad)?;
                    self.remaining = remaining;
                }
                None => log::warn!("{} chunk is missing its padding byte", header.id),
            }
        }

        log::trace!("{} chunk of {} bytes", header.id, header.size);

        Ok(Chunk {
            id: header.id,
            size: header.size,
            data,
        })
    }
}

impl<R: Read + Seek, C: Container> Iterator for Chunks<R, C> {
    type Item = Result<Chunk, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }

        let result = self.read_chunk();
        self.failed = result.is_err();
        Some(result)
    }
}

/// Writes a complete container from the given chunks
///
/// A placeholder header is written first
/// and patched with the actual container size
/// once all chunks are written.
/// Returns the container size stored in the header.
pub fn write_chunks<'c, C, W, I>(mut w: W, form_type: ChunkId, chunks: I) -> Result<u32, Error>
where
    C: Container,
    W: Write + Seek,
    I: IntoIterator<Item = &'c Chunk>,
{
    let start = w.stream_position()?;

    ContainerHeader {
        size: 0,
        form_type,
    }
    .write::<C, _>(w.by_ref())?;

    let mut size = 4u64;
    for chunk in chunks {
        chunk.write::<C::Endianness, _>(&mut w)?;
        size += chunk.total_size();
    }

    let size = u32::try_from(size)
        .map_err(|_| Error::Encoding(format!("chunks too large for {} container", C::MAGIC)))?;

    let end = w.stream_position()?;
    w.seek(SeekFrom::Start(start))?;
    ContainerHeader { size, form_type }.write::<C, _>(w.by_ref())?;
    w.seek(SeekFrom::Start(end))?;

    Ok(size)
}

/// Rebuilds file at the given path from a sequence of chunks
///
/// The chunks may be bound to the file being rebuilt,
/// since the new file is written to a temporary file
/// and only renamed over the original on success.
pub fn rebuild<'c, C, P, I>(path: P, form_type: ChunkId, chunks: I) -> Result<(), Error>
where
    C: Container,
    P: AsRef<Path>,
    I: IntoIterator<Item = &'c Chunk>,
{
    crate::swap::replace_file(path, |f| {
        let mut w = std::io::BufWriter::new(f);
        write_chunks::<C, _, _>(&mut w, form_type, chunks)?;
        w.flush().map_err(Error::Io)
    })
}

/// Replaces the chunk with the given ID in the file at `path`
///
/// The replacement takes the place of the first chunk
/// with a matching ID and any other matches are dropped.
/// If there are no matches, the replacement is appended.
/// A `None` replacement removes all matching chunks.
pub fn update_chunk<C, P>(
    path: P,
    id: ChunkId,
    replacement: Option<Chunk>,
    options: Options,
) -> Result<(), Error>
where
    C: Container,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut chunks = Chunks::<_, C>::open(path, options)?;
    let form_type = chunks.header().form_type;

    let mut replacement = replacement;
    let mut rebuilt = Vec::new();
    for chunk in chunks.by_ref() {
        let chunk = chunk?;
        if chunk.id != id {
            rebuilt.push(chunk);
        } else if let Some(new) = replacement.take() {
            rebuilt.push(new);
        }
    }
    rebuilt.extend(replacement);
    drop(chunks);

    log::debug!("rebuilding {} with updated {id} chunk", path.display());

    rebuild::<C, _, _>(path, form_type, &rebuilt)
}

/// Verifies that every declared size in the container
/// is backed by actual bytes
///
/// # Errors
///
/// Returns [`Error::Truncated`] if the stream ends early,
/// or [`Error::ChunkSizeMismatch`] if chunk sizes
/// do not sum to the container's size.
pub fn verify<C: Container, R: Read + Seek>(reader: R) -> Result<(), Error> {
    let mut chunks = Chunks::<R, C>::new(reader, Options::default().in_memory_limit(0))?;
    let declared = u64::from(chunks.header().size);

    let mut total = 4;
    for chunk in chunks.by_ref() {
        total += chunk?.total_size();
    }

    if total == declared {
        Ok(())
    } else {
        Err(Error::ChunkSizeMismatch)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn chunk(id: &[u8; 4], body: &[u8]) -> Chunk {
        Chunk::new(ChunkId::new(*id).unwrap(), body.to_vec()).unwrap()
    }

    fn build<C: Container>(form_type: ChunkId, chunks: &[Chunk]) -> Vec<u8> {
        let mut w = Cursor::new(vec![]);
        write_chunks::<C, _, _>(&mut w, form_type, chunks).unwrap();
        w.into_inner()
    }

    #[test]
    fn test_chunk_round_trip() {
        let chunks = [
            chunk(b"COMM", &[1; 18]),
            chunk(b"NAME", b"odd"),
            chunk(b"SSND", &[0; 12]),
        ];

        let file = build::<Form>(ChunkId::AIFF, &chunks);
        assert_eq!(file.len() as u64, 8 + total_size(&chunks));
        assert_eq!(&file[0..4], b"FORM");
        assert_eq!(
            u32::from_be_bytes(file[4..8].try_into().unwrap()),
            4 + (8 + 18) + (8 + 3 + 1) + (8 + 12)
        );

        // padding byte follows odd chunk only
        assert_eq!(&file[12 + 26..12 + 26 + 12], b"NAME\x00\x00\x00\x03odd\x00");

        let read = Chunks::<_, Form>::new(Cursor::new(file.clone()), Options::default())
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(read.len(), 3);
        assert_eq!(read[0], chunks[0]);
        assert_eq!(read[1], chunks[1]);
        assert_eq!(read[2].id, ChunkId::SSND);
        assert_eq!(read[2].data, ChunkData::Stream { offset: 12 + 26 + 12 + 8 });

        assert!(verify::<Form, _>(Cursor::new(file)).is_ok());
    }

    #[test]
    fn test_riff_little_endian() {
        let file = build::<Riff>(ChunkId::WAVE, &[chunk(b"fmt ", &[0; 16])]);
        assert_eq!(&file[0..12], b"RIFF\x1C\x00\x00\x00WAVE");
        assert_eq!(&file[12..20], b"fmt \x10\x00\x00\x00");
    }

    #[test]
    fn test_bad_headers() {
        assert!(matches!(
            Chunks::<_, Form>::new(Cursor::new(b"RIFF\x04\x00\x00\x00WAVE".to_vec()), Options::default()),
            Err(Error::InvalidAiff("not an AIFF file"))
        ));
        assert!(matches!(
            Chunks::<_, Form>::new(Cursor::new(b"FORM\x00\x00\x00\x04WAVE".to_vec()), Options::default()),
            Err(Error::InvalidAiff("invalid AIFF file"))
        ));
        assert!(matches!(
            Chunks::<_, Form>::new(Cursor::new(b"FOR".to_vec()), Options::default()),
            Err(Error::InvalidAiff("not an AIFF file"))
        ));
    }

    #[test]
    fn test_bad_chunks() {
        // chunk ID with non-printable bytes
        let mut file = build::<Form>(ChunkId::AIFF, &[chunk(b"COMM", &[0; 4])]);
        file[13] = 0x01;
        let mut chunks = Chunks::<_, Form>::new(Cursor::new(file), Options::default()).unwrap();
        assert!(matches!(chunks.next(), Some(Err(Error::InvalidChunkId(_)))));
        assert!(chunks.next().is_none());

        // chunk size runs past container size
        let mut file = build::<Form>(ChunkId::AIFF, &[chunk(b"COMM", &[0; 4])]);
        file[19] = 0x05;
        let mut chunks = Chunks::<_, Form>::new(Cursor::new(file), Options::default()).unwrap();
        assert!(matches!(chunks.next(), Some(Err(Error::ChunkSizeMismatch))));

        // container size runs past end of stream
        let mut file = build::<Form>(ChunkId::AIFF, &[chunk(b"COMM", &[0; 4])]);
        file.truncate(file.len() - 1);
        assert!(matches!(
            verify::<Form, _>(Cursor::new(file)),
            Err(Error::Truncated)
        ));
    }
}
