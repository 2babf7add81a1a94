// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling ID3v2 tags
//!
//! Tags of versions 2.2, 2.3 and 2.4 are read,
//! but tags are always written as version 2.4
//! with UTF-8 text.
//!
//! | Bytes | Field |
//! |------:|-------|
//! | 3 | `ID3` |
//! | 1 | major version |
//! | 1 | revision |
//! | 1 | flags |
//! | 4 | synchsafe tag size, not counting header or footer |
//! | … | optional extended header |
//! | … | frames |
//! | … | zero padding |
//! | 10 | optional footer, version 2.4 only |

use crate::{Error, UpdateStrategy};
use bitstream_io::{BigEndian, ByteRead, ByteReader};
use std::borrow::Cow;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

const HEADER_SIZE: u64 = 10;

const UNSYNCHRONISATION: u8 = 0x80;
const EXTENDED_HEADER: u8 = 0x40;
const FOOTER: u8 = 0x10;

// version 2.4 frame format flags
const FRAME_GROUPING: u16 = 0x0040;
const FRAME_COMPRESSION: u16 = 0x0008;
const FRAME_ENCRYPTION: u16 = 0x0004;
const FRAME_UNSYNCHRONISATION: u16 = 0x0002;
const FRAME_DATA_LENGTH: u16 = 0x0001;

/// Encodes value as a 28-bit synchsafe integer
///
/// Each byte holds 7 bits of the value
/// so that no byte has its high bit set.
///
/// ```
/// use audio_containers::id3v2::{synchsafe_decode, synchsafe_encode};
///
/// assert_eq!(synchsafe_encode(257).unwrap(), [0x00, 0x00, 0x02, 0x01]);
/// assert_eq!(synchsafe_decode([0x00, 0x00, 0x02, 0x01]).unwrap(), 257);
/// assert!(synchsafe_encode(1 << 28).is_err());
/// assert!(synchsafe_decode([0x00, 0x00, 0x00, 0x80]).is_err());
/// ```
pub fn synchsafe_encode(value: u32) -> Result<[u8; 4], Error> {
    if value < 1 << 28 {
        Ok([
            (value >> 21) as u8 & 0x7F,
            (value >> 14) as u8 & 0x7F,
            (value >> 7) as u8 & 0x7F,
            value as u8 & 0x7F,
        ])
    } else {
        Err(Error::ValueOverflow { bits: 28 })
    }
}

/// Decodes 28-bit synchsafe integer
///
/// # Errors
///
/// Returns an error if any byte has its high bit set.
pub fn synchsafe_decode(bytes: [u8; 4]) -> Result<u32, Error> {
    if bytes.iter().all(|b| b & 0x80 == 0) {
        Ok(bytes
            .iter()
            .fold(0, |acc, b| (acc << 7) | u32::from(*b)))
    } else {
        Err(Error::InvalidId3v2("invalid synchsafe integer"))
    }
}

/// Reverses unsynchronisation by removing
/// the 0x00 bytes inserted after each 0xFF byte
fn resynchronise(data: &[u8]) -> Vec<u8> {
    let mut resynced = Vec::with_capacity(data.len());
    let mut previous = 0;
    for b in data {
        if !(previous == 0xFF && *b == 0x00) {
            resynced.push(*b);
        }
        previous = *b;
    }
    resynced
}

/// A parsed tag header
#[derive(Copy, Clone, Debug)]
struct Id3v2Header {
    major: u8,
    flags: u8,
    size: u32,
}

impl Id3v2Header {
    // total footprint, including header and footer
    fn total_size(&self) -> u64 {
        HEADER_SIZE
            + u64::from(self.size)
            + if self.major == 4 && self.flags & FOOTER != 0 { HEADER_SIZE } else { 0 }
    }

    // reads header, or returns None if the stream does not start with one
    fn read<R: Read>(reader: R) -> Result<Option<Self>, Error> {
        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        reader.take(HEADER_SIZE).read_to_end(&mut header)?;

        let mut r = ByteReader::endian(header.as_slice(), BigEndian);
        match r.read::<[u8; 3]>() {
            Ok(magic) if &magic == b"ID3" => {}
            _ => return Ok(None),
        }

        let major = r.read::<u8>()?;
        let _revision = r.read::<u8>()?;
        let flags = r.read::<u8>()?;
        let size = synchsafe_decode(r.read()?)?;

        match major {
            2..=4 => Ok(Some(Self { major, flags, size })),
            _ => Err(Error::InvalidId3v2("unsupported ID3v2 version")),
        }
    }
}

/// A single ID3v2 frame
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Id3v2Frame {
    /// A text information frame
    Text {
        /// The frame's ID, such as `TIT2`
        id: String,
        /// The frame's text
        text: String,
    },
    /// A `COMM` frame
    Comment {
        /// ISO-639-2 language code
        language: [u8; 3],
        /// Short content description
        description: String,
        /// The comment's text
        text: String,
    },
    /// Any other frame, kept as raw bytes
    Raw {
        /// The frame's ID
        id: String,
        /// The frame's version 2.4 format flags
        flags: u16,
        /// The frame's data
        data: Vec<u8>,
    },
}

impl Id3v2Frame {
    /// The frame's ID
    pub fn id(&self) -> &str {
        match self {
            Self::Text { id, .. } | Self::Raw { id, .. } => id,
            Self::Comment { .. } => "COMM",
        }
    }

    fn parse(major: u8, id: String, flags: u16, data: &[u8]) -> Result<Self, Error> {
        // normalize format flags to their version 2.4 positions
        let (flags, data) = match major {
            2 => (0, Cow::Borrowed(data)),
            3 => (
                if flags & 0x0080 != 0 {
                    FRAME_COMPRESSION | FRAME_DATA_LENGTH
                } else {
                    0
                } | if flags & 0x0040 != 0 { FRAME_ENCRYPTION } else { 0 }
                    | if flags & 0x0020 != 0 { FRAME_GROUPING } else { 0 },
                Cow::Borrowed(data),
            ),
            _ if flags & FRAME_UNSYNCHRONISATION != 0 => (
                flags & 0x004F & !FRAME_UNSYNCHRONISATION,
                Cow::Owned(resynchronise(data)),
            ),
            _ => (flags & 0x004F, Cow::Borrowed(data)),
        };

        let raw = |id, data: Cow<[u8]>| Self::Raw {
            id,
            flags,
            data: data.into_owned(),
        };

        if flags & (FRAME_GROUPING | FRAME_COMPRESSION | FRAME_ENCRYPTION) != 0 {
            return Ok(raw(id, data));
        }

        let content: &[u8] = if flags & FRAME_DATA_LENGTH != 0 {
            data.get(4..).ok_or(Error::InvalidId3v2("invalid frame size"))?
        } else {
            &data
        };

        let is_text = id.starts_with('T') && id != "TXXX";
        let is_comment = id == "COMM";

        match content {
            [encoding, text @ ..] if is_text => Ok(Self::Text {
                text: decode_text(*encoding, text)?,
                id,
            }),
            [encoding, l0, l1, l2, rest @ ..] if is_comment => {
                let (description, text) = split_terminated(*encoding, rest);
                Ok(Self::Comment {
                    language: [*l0, *l1, *l2],
                    description: decode_text(*encoding, description)?,
                    text: decode_text(*encoding, text)?,
                })
            }
            _ => Ok(raw(id, data)),
        }
    }

    // appends version 2.4 frame to buffer
    fn write(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        let (id, flags, data) = match self {
            Self::Text { id, text } => {
                let mut data = vec![3];
                data.extend(text.as_bytes());
                (id.as_str(), 0, Cow::Owned(data))
            }
            Self::Comment {
                language,
                description,
                text,
            } => {
                let mut data = vec![3];
                data.extend(language);
                data.extend(description.as_bytes());
                data.push(0);
                data.extend(text.as_bytes());
                ("COMM", 0, Cow::Owned(data))
            }
            Self::Raw { id, flags, data } => (id.as_str(), *flags, Cow::Borrowed(data.as_slice())),
        };

        if !valid_frame_id(id.as_bytes()) || id.len() != 4 {
            log::warn!("skipping {id} frame which has no version 2.4 equivalent");
            return Ok(());
        }

        buf.extend(id.as_bytes());
        buf.extend(synchsafe_encode(
            u32::try_from(data.len()).map_err(|_| Error::ValueOverflow { bits: 28 })?,
        )?);
        buf.extend(flags.to_be_bytes());
        buf.extend(data.as_ref());
        Ok(())
    }
}

fn valid_frame_id(id: &[u8]) -> bool {
    id.iter().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

// version 2.2 frame IDs with version 2.4 equivalents
fn upgrade_frame_id(id: &str) -> &str {
    match id {
        "TT1" => "TIT1",
        "TT2" => "TIT2",
        "TT3" => "TIT3",
        "TP1" => "TPE1",
        "TP2" => "TPE2",
        "TP3" => "TPE3",
        "TP4" => "TPE4",
        "TCM" => "TCOM",
        "TAL" => "TALB",
        "TRK" => "TRCK",
        "TPA" => "TPOS",
        "TYE" => "TYER",
        "TCO" => "TCON",
        "TCR" => "TCOP",
        "TPB" => "TPUB",
        "TRC" => "TSRC",
        "TEN" => "TENC",
        "TMT" => "TMED",
        "COM" => "COMM",
        other => other,
    }
}

fn decode_text(encoding: u8, bytes: &[u8]) -> Result<String, Error> {
    fn utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String, Error> {
        String::from_utf16(
            &bytes
                .chunks_exact(2)
                .map(|c| unit([c[0], c[1]]))
                .collect::<Vec<_>>(),
        )
        .map_err(|_| Error::InvalidId3v2("invalid UTF-16 text"))
    }

    let text = match encoding {
        0 => bytes.iter().map(|b| char::from(*b)).collect(),
        1 => match bytes {
            [0xFE, 0xFF, rest @ ..] => utf16(rest, u16::from_be_bytes)?,
            [0xFF, 0xFE, rest @ ..] => utf16(rest, u16::from_le_bytes)?,
            rest => utf16(rest, u16::from_le_bytes)?,
        },
        2 => utf16(bytes, u16::from_be_bytes)?,
        3 => String::from_utf8(bytes.to_vec())?,
        _ => return Err(Error::InvalidId3v2("invalid text encoding")),
    };

    Ok(text.trim_end_matches('\0').replace('\u{FEFF}', ""))
}

// splits text at its encoding's NUL terminator
fn split_terminated(encoding: u8, bytes: &[u8]) -> (&[u8], &[u8]) {
    let terminator = match encoding {
        1 | 2 => bytes
            .chunks_exact(2)
            .position(|c| c == [0, 0])
            .map(|i| (i * 2, 2)),
        _ => bytes.iter().position(|b| *b == 0).map(|i| (i, 1)),
    };

    match terminator {
        Some((end, len)) => (&bytes[..end], &bytes[end + len..]),
        None => (bytes, &[]),
    }
}

/// An ID3v2 tag
///
/// # Example
///
/// ```
/// use audio_containers::id3v2::Id3v2Tag;
///
/// let mut tag = Id3v2Tag::default();
/// tag.set_text("TIT2", "Title");
/// tag.set_comment("Comment");
///
/// let bytes = tag.to_bytes(16).unwrap();
/// assert_eq!(&bytes[0..5], b"ID3\x04\x00");
///
/// let read = Id3v2Tag::read(bytes.as_slice()).unwrap().unwrap();
/// assert_eq!(read.get_text("TIT2"), Some("Title"));
/// assert_eq!(read.comment(), Some("Comment"));
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Id3v2Tag {
    /// Major version the tag was read from
    pub version: u8,
    frames: Vec<Id3v2Frame>,
}

impl Default for Id3v2Tag {
    fn default() -> Self {
        Self {
            version: 4,
            frames: vec![],
        }
    }
}

impl Id3v2Tag {
    /// Reads tag from the start of the stream
    ///
    /// Returns `None` if the stream does not start with a tag.
    pub fn read<R: Read>(mut reader: R) -> Result<Option<Self>, Error> {
        let Some(header) = Id3v2Header::read(reader.by_ref())? else {
            return Ok(None);
        };

        let mut body = vec![0; header.size as usize];
        reader.read_exact(&mut body)?;

        // versions 2.2 and 2.3 unsynchronise the whole tag
        let body = if header.flags & UNSYNCHRONISATION != 0 && header.major < 4 {
            resynchronise(&body)
        } else {
            body
        };

        let frames_start = match header.major {
            3 if header.flags & EXTENDED_HEADER != 0 => body
                .get(0..4)
                .map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]]) as usize + 4),
            4 if header.flags & EXTENDED_HEADER != 0 => body
                .get(0..4)
                .map(|s| synchsafe_decode([s[0], s[1], s[2], s[3]]))
                .transpose()?
                .map(|size| size as usize),
            _ => Some(0),
        }
        .filter(|start| *start <= body.len())
        .ok_or(Error::InvalidId3v2("invalid extended header"))?;

        let frames = parse_frames(header.major, &body[frames_start..])?;

        log::debug!(
            "read ID3v2.{} tag with {} frames",
            header.major,
            frames.len()
        );

        Ok(Some(Self {
            version: header.major,
            frames,
        }))
    }

    /// Iterates over all frames in order
    pub fn frames(&self) -> impl Iterator<Item = &Id3v2Frame> {
        self.frames.iter()
    }

    /// Adds frame to end of tag
    pub fn push(&mut self, frame: Id3v2Frame) {
        self.frames.push(frame)
    }

    /// Returns text of first text frame with the given ID
    pub fn get_text(&self, id: &str) -> Option<&str> {
        self.frames.iter().find_map(|f| match f {
            Id3v2Frame::Text { id: i, text } if i == id => Some(text.as_str()),
            _ => None,
        })
    }

    /// Replaces text frames with the given ID with a single frame
    ///
    /// The new frame takes the place of the first replaced frame,
    /// or is appended if there were none.
    pub fn set_text<S: Into<String>>(&mut self, id: &str, text: S) {
        self.replace(
            id,
            Id3v2Frame::Text {
                id: id.to_owned(),
                text: text.into(),
            },
        )
    }

    /// Returns text of first comment frame
    ///
    /// Comments with an empty description are preferred.
    pub fn comment(&self) -> Option<&str> {
        let mut comments = self.frames.iter().filter_map(|f| match f {
            Id3v2Frame::Comment {
                description, text, ..
            } => Some((description, text)),
            _ => None,
        });

        let first = comments.next()?;
        std::iter::once(first)
            .chain(comments)
            .find(|(d, _)| d.is_empty())
            .or(Some(first))
            .map(|(_, text)| text.as_str())
    }

    /// Replaces all comment frames with a single comment
    pub fn set_comment<S: Into<String>>(&mut self, text: S) {
        self.replace(
            "COMM",
            Id3v2Frame::Comment {
                language: *b"eng",
                description: String::new(),
                text: text.into(),
            },
        )
    }

    fn replace(&mut self, id: &str, frame: Id3v2Frame) {
        let position = self
            .frames
            .iter()
            .position(|f| f.id() == id)
            .unwrap_or(self.frames.len());
        self.remove(id);
        let position = position.min(self.frames.len());
        self.frames.insert(position, frame);
    }

    /// Removes all frames with the given ID
    pub fn remove(&mut self, id: &str) {
        self.frames.retain(|f| f.id() != id)
    }

    fn frame_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut buf = vec![];
        for frame in &self.frames {
            frame.write(&mut buf)?;
        }
        Ok(buf)
    }

    fn build(frames: &[u8], padding: u32) -> Result<Vec<u8>, Error> {
        let size = u32::try_from(frames.len())
            .ok()
            .and_then(|len| len.checked_add(padding))
            .ok_or(Error::ValueOverflow { bits: 28 })?;

        let mut tag = Vec::with_capacity(HEADER_SIZE as usize + size as usize);
        tag.extend(b"ID3\x04\x00\x00");
        tag.extend(synchsafe_encode(size)?);
        tag.extend(frames);
        tag.resize(tag.len() + padding as usize, 0);
        Ok(tag)
    }

    /// Returns tag as version 2.4 bytes with the given amount of padding
    ///
    /// Frames with no version 2.4 equivalent are skipped.
    pub fn to_bytes(&self, padding: u32) -> Result<Vec<u8>, Error> {
        Self::build(&self.frame_bytes()?, padding)
    }
}

fn parse_frames(major: u8, mut body: &[u8]) -> Result<Vec<Id3v2Frame>, Error> {
    let header_size = if major == 2 { 6 } else { 10 };
    let mut frames = vec![];

    // padding starts with a zero byte
    while body.len() >= header_size && body[0] != 0 {
        let mut r = ByteReader::endian(body, BigEndian);
        let (id, size, flags) = match major {
            2 => {
                let id = r.read::<[u8; 3]>()?;
                let [s0, s1, s2] = r.read::<[u8; 3]>()?;
                (id.to_vec(), u32::from_be_bytes([0, s0, s1, s2]), 0)
            }
            3 => (r.read::<[u8; 4]>()?.to_vec(), r.read::<u32>()?, r.read::<u16>()?),
            _ => (
                r.read::<[u8; 4]>()?.to_vec(),
                synchsafe_decode(r.read()?)?,
                r.read::<u16>()?,
            ),
        };

        if !valid_frame_id(&id) {
            return Err(Error::InvalidId3v2("invalid frame ID"));
        }
        // valid IDs are all ASCII
        let id = upgrade_frame_id(&String::from_utf8(id)?).to_owned();

        let (data, rest) = body[header_size..]
            .split_at_checked(size as usize)
            .ok_or(Error::InvalidId3v2("frame size exceeds tag size"))?;
        body = rest;

        log::trace!("{id} frame of {size} bytes");
        frames.push(Id3v2Frame::parse(major, id, flags, data)?);
    }

    Ok(frames)
}

/// Positions reader after any ID3v2 tags at its current position
///
/// Returns the number of bytes skipped.
pub fn skip<R: Read + Seek>(mut reader: R) -> Result<u64, Error> {
    let mut skipped = 0;
    loop {
        let start = reader.stream_position()?;
        match Id3v2Header::read(reader.by_ref())? {
            Some(header) => {
                skipped += header.total_size();
                reader.seek(SeekFrom::Start(start + header.total_size()))?;
            }
            None => {
                reader.seek(SeekFrom::Start(start))?;
                break Ok(skipped);
            }
        }
    }
}

/// Writes tag to the start of the file at the given path
///
/// If the new tag fits in the space taken by the existing tag,
/// it is padded to that size and written in place.
/// Otherwise, the file is rebuilt in a temporary file
/// with the given padding and renamed over the original.
pub fn update<P: AsRef<Path>>(path: P, tag: &Id3v2Tag, padding: u32) -> Result<UpdateStrategy, Error> {
    let path = path.as_ref();
    let frames = tag.frame_bytes()?;

    let mut file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
    let existing = Id3v2Header::read(&mut file)?.map(|h| h.total_size());

    match existing {
        Some(existing) if frames.len() as u64 + HEADER_SIZE <= existing => {
            let padding = u32::try_from(existing - HEADER_SIZE - frames.len() as u64)
                .map_err(|_| Error::ValueOverflow { bits: 28 })?;
            log::debug!("writing ID3v2 tag in place with {padding} bytes padding");
            file.rewind()?;
            file.write_all(&Id3v2Tag::build(&frames, padding)?)?;
            file.flush()?;
            Ok(UpdateStrategy::InPlace)
        }
        existing => {
            log::debug!("rewriting {} with larger ID3v2 tag", path.display());
            let new_tag = Id3v2Tag::build(&frames, padding)?;
            file.seek(SeekFrom::Start(existing.unwrap_or(0)))?;
            crate::swap::replace_file(path, |f| {
                f.write_all(&new_tag)?;
                std::io::copy(&mut file, f)?;
                Ok(())
            })
            .map(|()| UpdateStrategy::Rewritten)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_synchsafe() {
        for value in [0, 1, 0x7F, 0x80, 0x3FFF, 0x4000, (1 << 28) - 1] {
            assert_eq!(synchsafe_decode(synchsafe_encode(value).unwrap()).unwrap(), value);
        }
        assert_eq!(synchsafe_encode((1 << 28) - 1).unwrap(), [0x7F; 4]);
        assert!(matches!(
            synchsafe_encode(u32::MAX),
            Err(Error::ValueOverflow { bits: 28 })
        ));
    }

    #[test]
    fn test_resynchronise() {
        assert_eq!(
            resynchronise(&[0xFF, 0x00, 0xE0, 0xFF, 0x00, 0x00, 0x01]),
            [0xFF, 0xE0, 0xFF, 0x00, 0x01]
        );
    }

    #[test]
    fn test_v23_frames() {
        fn frame(id: &[u8; 4], data: &[u8]) -> Vec<u8> {
            let mut frame = id.to_vec();
            frame.extend((data.len() as u32).to_be_bytes());
            frame.extend([0, 0]);
            frame.extend(data);
            frame
        }

        let mut body = vec![];
        // Latin-1 title
        body.extend(frame(b"TIT2", b"\x00Caf\xE9"));
        // UTF-16 artist with BOM
        body.extend(frame(b"TPE1", &[0x01, 0xFF, 0xFE, b'A', 0, b'B', 0, 0, 0]));
        // UTF-16BE comment
        body.extend(frame(
            b"COMM",
            &[0x02, b'e', b'n', b'g', 0, 0, 0, b'H', 0, b'i'],
        ));
        body.extend(frame(b"APIC", &[1, 2, 3]));
        body.extend([0; 16]);

        let mut tag = b"ID3\x03\x00\x00".to_vec();
        tag.extend(synchsafe_encode(body.len() as u32).unwrap());
        tag.extend(body);
        tag.extend(b"audio");

        let read = Id3v2Tag::read(tag.as_slice()).unwrap().unwrap();
        assert_eq!(read.version, 3);
        assert_eq!(read.get_text("TIT2"), Some("Café"));
        assert_eq!(read.get_text("TPE1"), Some("AB"));
        assert_eq!(read.comment(), Some("Hi"));
        assert_eq!(
            read.frames().last(),
            Some(&Id3v2Frame::Raw {
                id: "APIC".to_owned(),
                flags: 0,
                data: vec![1, 2, 3]
            })
        );

        let mut cursor = Cursor::new(tag);
        assert_eq!(skip(&mut cursor).unwrap(), cursor.get_ref().len() as u64 - 5);
        assert_eq!(cursor.position(), cursor.get_ref().len() as u64 - 5);
    }

    #[test]
    fn test_v22_frames() {
        let mut body = b"TT2\x00\x00\x06\x00Title".to_vec();
        body.extend(b"TYE\x00\x00\x05\x002001");
        body.extend(b"XYZ\x00\x00\x01\x00");

        let mut tag = b"ID3\x02\x00\x00".to_vec();
        tag.extend(synchsafe_encode(body.len() as u32).unwrap());
        tag.extend(body);

        let read = Id3v2Tag::read(tag.as_slice()).unwrap().unwrap();
        assert_eq!(read.get_text("TIT2"), Some("Title"));
        assert_eq!(read.get_text("TYER"), Some("2001"));

        let metadata = crate::metadata::Metadata::from(&read);
        assert_eq!(metadata.get(crate::metadata::MetaField::Year), Some("2001"));
        assert_eq!(metadata.get(crate::metadata::MetaField::Date), None);

        // 3 character frames are dropped when written as version 2.4
        let rebuilt = Id3v2Tag::read(read.to_bytes(0).unwrap().as_slice())
            .unwrap()
            .unwrap();
        assert_eq!(rebuilt.frames().count(), 2);
        assert_eq!(rebuilt.get_text("TIT2"), Some("Title"));
    }

    #[test]
    fn test_invalid_tags() {
        assert!(Id3v2Tag::read(b"not a tag".as_slice()).unwrap().is_none());
        assert!(Id3v2Tag::read(b"".as_slice()).unwrap().is_none());
        assert!(matches!(
            Id3v2Tag::read(b"ID3\x05\x00\x00\x00\x00\x00\x00".as_slice()),
            Err(Error::InvalidId3v2("unsupported ID3v2 version"))
        ));
        assert!(matches!(
            Id3v2Tag::read(b"ID3\x04\x00\x00\x00\x00\x00\x10TIT2".as_slice()),
            Err(Error::Truncated)
        ));

        let mut tag = b"ID3\x04\x00\x00\x00\x00\x00\x0B".to_vec();
        tag.extend(b"TIT2\x00\x00\x00\x10\x00\x00\x03");
        assert!(matches!(
            Id3v2Tag::read(tag.as_slice()),
            Err(Error::InvalidId3v2("frame size exceeds tag size"))
        ));
    }

    #[test]
    fn test_v24_unsynchronised_frame() {
        let data = [0x03, b'a', 0xFF, 0x00, b'b'];
        let mut body = b"TIT2".to_vec();
        body.extend(synchsafe_encode(data.len() as u32).unwrap());
        body.extend(FRAME_UNSYNCHRONISATION.to_be_bytes());
        body.extend(data);

        let mut tag = b"ID3\x04\x00\x00".to_vec();
        tag.extend(synchsafe_encode(body.len() as u32).unwrap());
        tag.extend(body);

        // 0xFF alone is not valid UTF-8
        assert!(matches!(
            Id3v2Tag::read(tag.as_slice()),
            Err(Error::Utf8(_))
        ));
    }
}
