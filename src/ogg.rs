// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling Ogg streams and the comments of their codecs
//!
//! An Ogg stream is a series of pages, each with a header
//! (all fields little-endian):
//!
//! | Bytes | Field |
//! |------:|-------|
//! | 4 | `OggS` |
//! | 1 | version, always 0 |
//! | 1 | header type flags (continuation, beginning, end of stream) |
//! | 8 | granule position |
//! | 4 | bitstream serial number |
//! | 4 | page sequence number |
//! | 4 | CRC-32 of the whole page, with this field as 0 |
//! | 1 | segment count |
//! | count | lacing values, one per segment |
//!
//! followed by the segments themselves.
//! Packets are split into segments of 255 bytes,
//! with the final segment of each packet shorter than 255 bytes.
//! A packet whose length is a multiple of 255
//! ends with an empty segment.

use crate::audio::{ChannelMask, Descriptor};
use crate::crc::{Checksum, CrcReader, OggCrc};
use crate::vorbiscomment::VorbisComment;
use crate::{Error, Options};
use arrayvec::ArrayVec;
use bitstream_io::{ByteRead, ByteReader, ByteWrite, ByteWriter, LittleEndian};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::path::Path;

const PAGE_MAGIC: &[u8; 4] = b"OggS";

const CONTINUED: u8 = 0x01;
const BEGINNING_OF_STREAM: u8 = 0x02;
const END_OF_STREAM: u8 = 0x04;

/// An Ogg page header
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PageHeader {
    /// Page begins with the continuation of a packet
    pub continued: bool,
    /// First page of its logical stream
    pub beginning_of_stream: bool,
    /// Last page of its logical stream
    pub end_of_stream: bool,
    /// Codec-specific position of the last packet completed on this page,
    /// or -1 if none completes
    pub granule_position: i64,
    /// Logical stream's serial number
    pub serial: u32,
    /// Page's sequence number within its logical stream
    pub sequence: u32,
    /// Page's CRC, as read from disk
    pub checksum: u32,
    /// Size of each segment in the page
    pub lacing: ArrayVec<u8, 255>,
}

impl PageHeader {
    /// Size of header on disk, in bytes
    pub fn size(&self) -> usize {
        27 + self.lacing.len()
    }

    /// Size of page body, in bytes
    pub fn body_size(&self) -> usize {
        self.lacing.iter().map(|l| usize::from(*l)).sum()
    }

    fn flags(&self) -> u8 {
        (if self.continued { CONTINUED } else { 0 })
            | (if self.beginning_of_stream { BEGINNING_OF_STREAM } else { 0 })
            | (if self.end_of_stream { END_OF_STREAM } else { 0 })
    }
}

/// A single Ogg page
///
/// # Example
///
/// ```
/// use audio_containers::ogg::Page;
///
/// let mut page = Page::default();
/// page.push_segment(b"hello").unwrap();
///
/// let bytes = page.to_bytes().unwrap();
/// assert_eq!(&bytes[0..4], b"OggS");
///
/// let read = Page::read(bytes.as_slice(), true).unwrap().unwrap();
/// assert_eq!(read.body, b"hello");
/// assert_eq!(read.segments().collect::<Vec<_>>(), [b"hello"]);
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Page {
    /// The page's header
    pub header: PageHeader,
    /// All the page's segments, concatenated
    pub body: Vec<u8>,
}

impl Page {
    /// Reads page from the stream
    ///
    /// Returns `None` if the stream is already exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChecksumMismatch`] if `verify` is set
    /// and the page's CRC does not match its contents.
    pub fn read<R: Read>(reader: R, verify: bool) -> Result<Option<Self>, Error> {
        let mut r = CrcReader::<_, OggCrc>::new(reader);

        let mut magic = [0; 4];
        if r.read(&mut magic[0..1])? == 0 {
            return Ok(None);
        }
        r.read_exact(&mut magic[1..])?;
        if &magic != PAGE_MAGIC {
            return Err(Error::InvalidOgg("invalid page magic"));
        }

        let mut header = {
            let mut r = ByteReader::endian(r.by_ref(), LittleEndian);
            if r.read::<u8>()? != 0 {
                return Err(Error::InvalidOgg("unsupported Ogg version"));
            }
            let flags = r.read::<u8>()?;
            PageHeader {
                continued: flags & CONTINUED != 0,
                beginning_of_stream: flags & BEGINNING_OF_STREAM != 0,
                end_of_stream: flags & END_OF_STREAM != 0,
                granule_position: r.read()?,
                serial: r.read()?,
                sequence: r.read()?,
                ..PageHeader::default()
            }
        };

        // the CRC field counts as zeroes
        let mut checksum = [0; 4];
        r.bypass().read_exact(&mut checksum)?;
        r.substitute(&[0; 4]);
        header.checksum = u32::from_le_bytes(checksum);

        let mut segments = [0; 1];
        r.read_exact(&mut segments)?;
        let mut lacing = [0; 255];
        let lacing = &mut lacing[0..usize::from(segments[0])];
        r.read_exact(lacing)?;
        header.lacing = lacing.iter().copied().collect();

        let mut body = vec![0; header.body_size()];
        r.read_exact(&mut body)?;

        if verify && r.checksum().checksum() != header.checksum {
            return Err(Error::ChecksumMismatch);
        }

        log::trace!(
            "page {} of stream {:08X} with {} segments",
            header.sequence,
            header.serial,
            header.lacing.len(),
        );

        Ok(Some(Self { header, body }))
    }

    /// Adds a segment of up to 255 bytes to the page
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOgg`] if the segment is too large
    /// or the page already holds 255 segments.
    pub fn push_segment(&mut self, segment: &[u8]) -> Result<(), Error> {
        let len = u8::try_from(segment.len()).map_err(|_| Error::InvalidOgg("segment too large"))?;
        self.header
            .lacing
            .try_push(len)
            .map_err(|_| Error::InvalidOgg("too many segments in page"))?;
        self.body.extend_from_slice(segment);
        Ok(())
    }

    /// Iterates over the page's segments
    pub fn segments(&self) -> impl Iterator<Item = &[u8]> {
        self.header
            .lacing
            .iter()
            .scan(0, |offset, len| {
                let start = *offset;
                *offset += usize::from(*len);
                Some(start..*offset)
            })
            .filter_map(|range| self.body.get(range))
    }

    /// Returns page as bytes, with its CRC calculated
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut w = ByteWriter::endian(
            Vec::with_capacity(self.header.size() + self.body.len()),
            LittleEndian,
        );
        w.write_bytes(PAGE_MAGIC)?;
        w.write::<u8>(0)?;
        w.write(self.header.flags())?;
        w.write(self.header.granule_position)?;
        w.write(self.header.serial)?;
        w.write(self.header.sequence)?;
        w.write::<u32>(0)?;
        w.write::<u8>(self.header.lacing.len() as u8)?;
        w.write_bytes(&self.header.lacing)?;
        w.write_bytes(&self.body)?;
        let mut bytes = w.into_writer();

        let mut crc = OggCrc::default();
        crc.update(&bytes);
        bytes[22..26].copy_from_slice(&crc.checksum().to_le_bytes());
        Ok(bytes)
    }
}

/// An iterator over the pages of an Ogg stream
pub struct PageReader<R> {
    reader: R,
    verify: bool,
    failed: bool,
}

impl<R: Read> PageReader<R> {
    /// Reads pages from the stream,
    /// verifying each page's checksum if `verify` is set
    pub fn new(reader: R, verify: bool) -> Self {
        Self {
            reader,
            verify,
            failed: false,
        }
    }

    /// Returns the underlying stream
    pub fn into_reader(self) -> R {
        self.reader
    }
}

impl<R: Read> Iterator for PageReader<R> {
    type Item = Result<Page, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = Page::read(self.reader.by_ref(), self.verify).transpose();
        self.failed = matches!(result, Some(Err(_)));
        result
    }
}

/// An iterator over the packets of a single logical Ogg stream
///
/// Packets are reassembled across page boundaries.
/// Pages belonging to other logical streams are skipped.
pub struct PacketReader<R> {
    pages: PageReader<R>,
    serial: Option<u32>,
    partial: Vec<u8>,
    ready: VecDeque<Vec<u8>>,
    granule_position: i64,
}

impl<R: Read> PacketReader<R> {
    /// Reads packets from the stream
    pub fn new(reader: R, verify: bool) -> Self {
        Self {
            pages: PageReader::new(reader, verify),
            serial: None,
            partial: Vec::new(),
            ready: VecDeque::new(),
            granule_position: -1,
        }
    }

    /// Serial number of the stream being read, once known
    #[inline]
    pub fn serial(&self) -> Option<u32> {
        self.serial
    }

    /// Granule position of the most recent page
    /// on which a packet was completed
    #[inline]
    pub fn granule_position(&self) -> i64 {
        self.granule_position
    }

    /// Returns the remaining pages
    ///
    /// Any packets already assembled are discarded.
    pub fn into_pages(self) -> PageReader<R> {
        self.pages
    }

    fn push_page(&mut self, page: &Page) {
        if page.header.continued != !self.partial.is_empty() {
            log::warn!("page {} has unexpected continuation", page.header.sequence);
            self.partial.clear();
        }

        for segment in page.segments() {
            self.partial.extend_from_slice(segment);
            if segment.len() < 255 {
                self.ready.push_back(std::mem::take(&mut self.partial));
            }
        }

        if page.header.granule_position != -1 {
            self.granule_position = page.header.granule_position;
        }
    }
}

impl<R: Read> Iterator for PacketReader<R> {
    type Item = Result<Vec<u8>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(packet) = self.ready.pop_front() {
                return Some(Ok(packet));
            }

            match self.pages.next() {
                Some(Ok(page)) => match self.serial {
                    None => {
                        self.serial = Some(page.header.serial);
                        self.push_page(&page);
                    }
                    Some(serial) if serial == page.header.serial => self.push_page(&page),
                    Some(_) => continue,
                },
                Some(Err(err)) => return Some(Err(err)),
                None if self.partial.is_empty() => return None,
                None => {
                    // stream ended mid-packet
                    self.partial.clear();
                    return Some(Err(Error::Truncated));
                }
            }
        }
    }
}

/// A writer of Ogg pages
pub struct PageWriter<W> {
    writer: W,
    pages: u64,
}

impl<W: Write> PageWriter<W> {
    /// Writes pages to the given stream
    pub fn new(writer: W) -> Self {
        Self { writer, pages: 0 }
    }

    /// Writes page, calculating its checksum
    pub fn write(&mut self, page: &Page) -> Result<(), Error> {
        self.writer.write_all(&page.to_bytes()?)?;
        self.pages += 1;
        Ok(())
    }

    /// Number of pages written so far
    pub fn pages(&self) -> u64 {
        self.pages
    }

    /// Flushes and returns the underlying stream
    pub fn into_writer(mut self) -> Result<W, Error> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Splits packets into pages of up to 255 segments
///
/// Pages are numbered consecutively from `first_sequence`.
/// Each page on which a packet completes gets `granule_position`,
/// while pages completing no packet get -1.
///
/// ```
/// use audio_containers::ogg::paginate;
///
/// let pages = paginate([vec![1; 600], vec![2; 10]], 0x1234, 1, 0);
/// assert_eq!(pages.len(), 1);
/// assert_eq!(pages[0].header.lacing.as_slice(), &[255, 255, 90, 10]);
/// assert_eq!(pages[0].header.sequence, 1);
/// ```
pub fn paginate<I, P>(packets: I, serial: u32, first_sequence: u32, granule_position: i64) -> Vec<Page>
where
    I: IntoIterator<Item = P>,
    P: AsRef<[u8]>,
{
    let new_page = |sequence: u32, continued: bool| Page {
        header: PageHeader {
            continued,
            granule_position: -1,
            serial,
            sequence,
            ..PageHeader::default()
        },
        body: Vec::new(),
    };

    let mut pages = Vec::new();
    let mut page = new_page(first_sequence, false);

    for packet in packets {
        let packet = packet.as_ref();
        let mut chunks = packet.chunks(255).peekable();
        let mut segments = Vec::with_capacity(packet.len() / 255 + 1);
        while let Some(chunk) = chunks.next() {
            segments.push(chunk);
            if chunks.peek().is_none() && chunk.len() == 255 {
                segments.push(&[]);
            }
        }
        if segments.is_empty() {
            segments.push(&[]);
        }

        let last = segments.len() - 1;
        for (i, segment) in segments.into_iter().enumerate() {
            if page.header.lacing.is_full() {
                let sequence = page.header.sequence.wrapping_add(1);
                pages.push(std::mem::replace(&mut page, new_page(sequence, i > 0)));
            }
            // segments are never longer than 255 bytes
            let _ = page.push_segment(segment);
            if i == last {
                page.header.granule_position = granule_position;
            }
        }
    }

    if !page.header.lacing.is_empty() {
        pages.push(page);
    }

    pages
}

/// A codec carried in an Ogg stream
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Codec {
    /// Ogg Vorbis
    Vorbis,
    /// Ogg Opus, with the number of samples
    /// to discard from the start of decoded output
    Opus {
        /// Samples to skip at 48 kHz
        pre_skip: u16,
    },
    /// Ogg Speex
    Speex,
}

impl Codec {
    /// Number of header packets which precede audio packets
    pub fn header_packets(&self) -> usize {
        match self {
            Self::Vorbis => 3,
            Self::Opus { .. } | Self::Speex => 2,
        }
    }

    /// Identifies codec from a stream's first packet
    /// and returns its sample rate and channel count
    pub fn identify(packet: &[u8]) -> Result<(Self, u32, u16), Error> {
        const INVALID: Error = Error::InvalidOgg("invalid identification packet");

        if let Some(rest) = packet.strip_prefix(b"\x01vorbis") {
            let mut r = ByteReader::endian(rest, LittleEndian);
            let (channels, sample_rate) = (|| {
                r.skip(4)?; // version
                Ok::<_, std::io::Error>((r.read::<u8>()?, r.read::<u32>()?))
            })()
            .map_err(|_| INVALID)?;
            Ok((Self::Vorbis, sample_rate, channels.into()))
        } else if let Some(rest) = packet.strip_prefix(b"OpusHead") {
            let mut r = ByteReader::endian(rest, LittleEndian);
            let (channels, pre_skip) = (|| {
                r.skip(1)?; // version
                Ok::<_, std::io::Error>((r.read::<u8>()?, r.read::<u16>()?))
            })()
            .map_err(|_| INVALID)?;
            // Opus always decodes at 48 kHz
            Ok((Self::Opus { pre_skip }, 48000, channels.into()))
        } else if packet.starts_with(b"Speex   ") {
            match (packet.get(36..40), packet.get(48..52)) {
                (Some(rate), Some(channels)) => Ok((
                    Self::Speex,
                    u32::from_le_bytes([rate[0], rate[1], rate[2], rate[3]]),
                    u16::from_le_bytes([channels[0], channels[1]]),
                )),
                _ => Err(INVALID),
            }
        } else {
            Err(Error::InvalidOgg("unsupported Ogg codec"))
        }
    }

    /// Parses codec's comment packet
    pub fn parse_comment(&self, packet: &[u8]) -> Result<VorbisComment, Error> {
        const INVALID: Error = Error::InvalidOgg("invalid comment packet");

        match self {
            Self::Vorbis => packet
                .strip_prefix(b"\x03vorbis")
                .ok_or(INVALID)
                .and_then(VorbisComment::parse),
            Self::Opus { .. } => packet
                .strip_prefix(b"OpusTags")
                .ok_or(INVALID)
                .and_then(VorbisComment::parse),
            Self::Speex => VorbisComment::parse(packet),
        }
    }

    /// Builds codec's comment packet
    pub fn build_comment(&self, comment: &VorbisComment) -> Result<Vec<u8>, Error> {
        let comment = comment.to_bytes()?;
        Ok(match self {
            Self::Vorbis => [b"\x03vorbis".as_slice(), comment.as_slice(), &[1]].concat(),
            Self::Opus { .. } => [b"OpusTags".as_slice(), comment.as_slice()].concat(),
            Self::Speex => comment,
        })
    }
}

/// An Ogg file's codec, stream parameters and comment
#[derive(Clone, Debug)]
pub struct OggFile {
    codec: Codec,
    serial: u32,
    descriptor: Descriptor,
    comment: VorbisComment,
}

impl OggFile {
    /// Opens Ogg file from the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::open_with(path, Options::default())
    }

    /// Opens Ogg file with the given options
    pub fn open_with<P: AsRef<Path>>(path: P, options: Options) -> Result<Self, Error> {
        std::fs::File::open(path)
            .map_err(Error::Io)
            .and_then(|f| Self::new_with(std::io::BufReader::new(f), options))
    }

    /// Reads Ogg file from the given stream
    pub fn new<R: Read>(reader: R) -> Result<Self, Error> {
        Self::new_with(reader, Options::default())
    }

    /// Reads Ogg file from the given stream with the given options
    ///
    /// The whole stream is read to find its final granule position.
    pub fn new_with<R: Read>(reader: R, options: Options) -> Result<Self, Error> {
        let mut packets = PacketReader::new(reader, options.get_verify_checksums());

        let (codec, sample_rate, channels) = match packets.next() {
            Some(packet) => Codec::identify(&packet?)?,
            None => return Err(Error::InvalidOgg("no Ogg pages found")),
        };

        let comment = match packets.next() {
            Some(packet) => codec.parse_comment(&packet?)?,
            None => return Err(Error::Truncated),
        };

        let serial = packets.serial().ok_or(Error::Truncated)?;
        let mut granule_position = packets.granule_position();
        for page in packets.into_pages() {
            let page = page?;
            if page.header.serial == serial && page.header.granule_position != -1 {
                granule_position = page.header.granule_position;
            }
        }

        let total_frames = u64::try_from(granule_position).unwrap_or(0);
        let total_frames = match codec {
            Codec::Opus { pre_skip } => total_frames.saturating_sub(pre_skip.into()),
            _ => total_frames,
        };

        log::debug!("{codec:?} stream {serial:08X} with {channels} channels, {sample_rate} Hz");

        Ok(Self {
            codec,
            serial,
            descriptor: Descriptor::new(
                sample_rate,
                channels,
                ChannelMask::from_channels(channels),
                16,
                total_frames,
            )?,
            comment,
        })
    }

    /// The stream's codec
    #[inline]
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// The logical stream's serial number
    #[inline]
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// The stream's parameters
    ///
    /// Ogg codecs are lossy, so bits per sample
    /// is always reported as 16.
    #[inline]
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// The stream's comment
    #[inline]
    pub fn comment(&self) -> &VorbisComment {
        &self.comment
    }
}

/// Replaces the comment of the Ogg file at the given path
///
/// The comment and any following header packets are repaginated,
/// and all subsequent pages of the stream are renumbered
/// with their checksums recalculated.
/// The file is rebuilt in a temporary file
/// which replaces the original.
///
/// # Errors
///
/// Returns [`Error::InvalidOgg`] if the file's header packets
/// share pages with audio data.
pub fn update_comment<P: AsRef<Path>>(
    path: P,
    comment: &VorbisComment,
    options: Options,
) -> Result<(), Error> {
    const SHARED: Error = Error::InvalidOgg("header packets share pages with audio data");

    let path = path.as_ref();
    let mut pages = PageReader::new(
        std::io::BufReader::new(std::fs::File::open(path)?),
        options.get_verify_checksums(),
    );

    let first = pages
        .next()
        .ok_or(Error::InvalidOgg("no Ogg pages found"))??;
    let serial = first.header.serial;
    let codec = match first.segments().collect::<Vec<_>>().as_slice() {
        [.., last] if last.len() < 255 => Codec::identify(&first.body)?.0,
        _ => return Err(Error::InvalidOgg("identification packet spans pages")),
    };

    // gather remaining header packets
    let mut header_pages = 0;
    let mut packets: Vec<Vec<u8>> = Vec::new();
    let mut partial = Vec::new();
    while packets.len() < codec.header_packets() - 1 || !partial.is_empty() {
        let page = pages.next().ok_or(Error::Truncated)??;
        if page.header.serial != serial {
            return Err(Error::InvalidOgg("multiplexed Ogg streams not supported"));
        }
        header_pages += 1;
        for segment in page.segments() {
            if packets.len() == codec.header_packets() - 1 {
                return Err(SHARED);
            }
            partial.extend_from_slice(segment);
            if segment.len() < 255 {
                packets.push(std::mem::take(&mut partial));
            }
        }
    }

    packets[0] = codec.build_comment(comment)?;
    let new_pages = paginate(&packets, serial, first.header.sequence.wrapping_add(1), 0);

    log::debug!(
        "replacing {header_pages} comment pages with {} pages",
        new_pages.len()
    );

    crate::swap::replace_file(path, |file| {
        let mut w = PageWriter::new(std::io::BufWriter::new(file));
        w.write(&first)?;
        new_pages.iter().try_for_each(|page| w.write(page))?;
        for page in pages {
            let mut page = page?;
            if page.header.serial == serial {
                page.header.sequence = page
                    .header
                    .sequence
                    .wrapping_add(new_pages.len() as u32)
                    .wrapping_sub(header_pages);
            }
            w.write(&page)?;
        }
        w.into_writer().map(|_| ())
    })
}
