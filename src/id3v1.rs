// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling ID3v1 and ID3v1.1 tags
//!
//! An ID3v1 tag is the final 128 bytes of a file:
//!
//! | Bytes | Field |
//! |------:|-------|
//! | 3 | `TAG` |
//! | 30 | title |
//! | 30 | artist |
//! | 30 | album |
//! | 4 | year |
//! | 30 | comment |
//! | 1 | genre |
//!
//! ID3v1.1 tags store a track number in the comment's final byte
//! when the byte before it is 0.

use crate::Error;
use bitstream_io::{ByteRead, ByteWrite, FromByteStream, ToByteStream};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Size of an ID3v1 tag, in bytes
pub const TAG_SIZE: u64 = 128;

/// An ID3v1 tag
///
/// Text fields are Latin-1 on disk.
/// Strings too long for their fields
/// are truncated at a character boundary when written.
///
/// # Example
///
/// ```
/// use audio_containers::id3v1::Id3v1Tag;
/// use std::io::Cursor;
///
/// let tag = Id3v1Tag {
///     title: "Title".to_string(),
///     track: Some(3),
///     ..Id3v1Tag::default()
/// };
///
/// let mut file = b"audio data".to_vec();
/// file.extend(tag.to_bytes().unwrap());
/// assert_eq!(file.len(), 10 + 128);
///
/// assert_eq!(Id3v1Tag::read(Cursor::new(file)).unwrap(), Some(tag));
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Id3v1Tag {
    /// Track title
    pub title: String,
    /// Track artist
    pub artist: String,
    /// Album name
    pub album: String,
    /// Release year
    pub year: String,
    /// Comment
    pub comment: String,
    /// Track number, for ID3v1.1 tags
    pub track: Option<u8>,
    /// Genre number
    pub genre: u8,
}

impl Id3v1Tag {
    /// Reads tag from the end of the stream, if any
    pub fn read<R: Read + Seek>(mut reader: R) -> Result<Option<Self>, Error> {
        match reader.seek(SeekFrom::End(0))?.checked_sub(TAG_SIZE) {
            Some(offset) => {
                reader.seek(SeekFrom::Start(offset))?;
                let mut tag = [0; TAG_SIZE as usize];
                reader.read_exact(&mut tag)?;
                if tag.starts_with(b"TAG") {
                    bitstream_io::ByteReader::endian(tag.as_slice(), bitstream_io::BigEndian)
                        .parse()
                        .map(Some)
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    /// Returns tag as bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut w = bitstream_io::ByteWriter::endian(
            Vec::with_capacity(TAG_SIZE as usize),
            bitstream_io::BigEndian,
        );
        w.build(self)?;
        Ok(w.into_writer())
    }
}

fn decode_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    bytes[..end]
        .iter()
        .map(|b| char::from(*b))
        .collect::<String>()
        .trim_end_matches(' ')
        .to_owned()
}

// Latin-1 encoding, with characters outside it replaced
// and truncated to fit the field
fn encode_text<const N: usize>(s: &str) -> [u8; N] {
    let mut field = [0; N];
    for (b, c) in field.iter_mut().zip(s.chars()) {
        *b = u8::try_from(u32::from(c)).unwrap_or(b'?');
    }
    field
}

impl FromByteStream for Id3v1Tag {
    type Error = Error;

    fn from_reader<R: ByteRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        if &r.read::<[u8; 3]>()? != b"TAG" {
            return Err(Error::InvalidId3v1("missing ID3v1 tag"));
        }

        let title = decode_text(&r.read::<[u8; 30]>()?);
        let artist = decode_text(&r.read::<[u8; 30]>()?);
        let album = decode_text(&r.read::<[u8; 30]>()?);
        let year = decode_text(&r.read::<[u8; 4]>()?);
        let comment = r.read::<[u8; 30]>()?;
        let genre = r.read()?;

        let (comment, track) = match comment {
            [comment @ .., 0, track] if track != 0 => (decode_text(&comment), Some(track)),
            comment => (decode_text(&comment), None),
        };

        Ok(Self {
            title,
            artist,
            album,
            year,
            comment,
            track,
            genre,
        })
    }
}

impl ToByteStream for Id3v1Tag {
    type Error = std::io::Error;

    fn to_writer<W: ByteWrite + ?Sized>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_bytes(b"TAG")?;
        w.write(encode_text::<30>(&self.title))?;
        w.write(encode_text::<30>(&self.artist))?;
        w.write(encode_text::<30>(&self.album))?;
        w.write(encode_text::<4>(&self.year))?;
        match self.track {
            Some(track) => {
                w.write(encode_text::<28>(&self.comment))?;
                w.write::<u8>(0)?;
                w.write(track)?;
            }
            None => w.write(encode_text::<30>(&self.comment))?,
        }
        w.write(self.genre)
    }
}

/// Writes tag to the end of the file at the given path
///
/// An existing tag is overwritten in place,
/// otherwise the new tag is appended.
pub fn update<P: AsRef<Path>>(path: P, tag: &Id3v1Tag) -> Result<(), Error> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)?;

    let offset = match Id3v1Tag::read(&mut file)? {
        Some(_) => file.seek(SeekFrom::End(-(TAG_SIZE as i64)))?,
        None => file.seek(SeekFrom::End(0))?,
    };
    log::debug!("writing ID3v1 tag at {offset}");

    file.write_all(&tag.to_bytes()?)?;
    file.flush().map_err(Error::Io)
}

/// Removes tag from the end of the file at the given path
///
/// Returns `false` if the file has no tag.
pub fn delete<P: AsRef<Path>>(path: P) -> Result<bool, Error> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)?;

    match Id3v1Tag::read(&mut file)? {
        Some(_) => {
            let len = file.seek(SeekFrom::End(0))?;
            file.set_len(len - TAG_SIZE)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_layout() {
        let tag = Id3v1Tag {
            title: "Title".to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            year: "1999".to_string(),
            comment: "Comment".to_string(),
            track: None,
            genre: 17,
        };

        let bytes = tag.to_bytes().unwrap();
        assert_eq!(bytes.len(), 128);
        assert_eq!(&bytes[0..8], b"TAGTitle");
        assert_eq!(&bytes[33..39], b"Artist");
        assert_eq!(&bytes[93..97], b"1999");
        assert_eq!(bytes[127], 17);

        assert_eq!(Id3v1Tag::read(Cursor::new(bytes)).unwrap(), Some(tag));
    }

    #[test]
    fn test_track_detection() {
        let mut bytes = Id3v1Tag::default().to_bytes().unwrap();

        // ID3v1.1 track number
        bytes[125] = 0;
        bytes[126] = 7;
        let tag = Id3v1Tag::read(Cursor::new(bytes.clone())).unwrap().unwrap();
        assert_eq!(tag.track, Some(7));

        // a full 30 byte comment is not a track number
        bytes[97..127].copy_from_slice(&[b'x'; 30]);
        let tag = Id3v1Tag::read(Cursor::new(bytes)).unwrap().unwrap();
        assert_eq!(tag.track, None);
        assert_eq!(tag.comment, "x".repeat(30));
    }

    #[test]
    fn test_text_padding() {
        let tag = Id3v1Tag {
            title: "Ünïcode ☃ and a title far too long for its field".to_string(),
            ..Id3v1Tag::default()
        };
        let read = Id3v1Tag::read(Cursor::new(tag.to_bytes().unwrap()))
            .unwrap()
            .unwrap();
        assert_eq!(read.title, "Ünïcode ? and a title far too");

        // space padding is trimmed
        let mut bytes = Id3v1Tag::default().to_bytes().unwrap();
        bytes[3..33].copy_from_slice(b"Padded                        ");
        let read = Id3v1Tag::read(Cursor::new(bytes)).unwrap().unwrap();
        assert_eq!(read.title, "Padded");
    }
}
