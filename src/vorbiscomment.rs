// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling Vorbis comment tags
//!
//! Vorbis comments are used by Ogg Vorbis, Ogg Opus and Ogg Speex.
//! All length fields are stored in little-endian byte order.
//!
//! | Bits | Field | Meaning |
//! |-----:|------:|---------|
//! | 32   | vendor string len | length of vendor string, in bytes
//! | `vendor string len`×8 | `vendor_string` | vendor string, in UTF-8
//! | 32   | field count | number of fields
//! | 32   | field₀ len | length of field₀, in bytes
//! | `field₀ len`×8 | `fields₀` | first field, as `KEY=value` in UTF-8
//! | | | ⋮

use crate::Error;
use bitstream_io::{BitRead, BitWrite, FromBitStream, LittleEndian, ToBitStream};

/// A Vorbis comment tag
///
/// Fields are kept in their original order
/// and the same key may occur any number of times.
///
/// # Example
/// ```
/// use bitstream_io::{BitReader, BitRead, LittleEndian};
/// use audio_containers::vorbiscomment::VorbisComment;
///
/// let data: &[u8] = &[
///     0x06, 0x00, 0x00, 0x00,  // 6 byte vendor string
///     0x76, 0x65, 0x6e, 0x64, 0x6f, 0x72,
///     0x02, 0x00, 0x00, 0x00,  // 2 fields
///     0x0d, 0x00, 0x00, 0x00,  // 13 byte field 1
///     0x54, 0x49, 0x54, 0x4c, 0x45, 0x3d, 0x54, 0x65,
///     0x73, 0x74, 0x69, 0x6e, 0x67,
///     0x10, 0x00, 0x00, 0x00,  // 16 byte field 2
///     0x41, 0x4c, 0x42, 0x55, 0x4d, 0x3d, 0x54, 0x65,
///     0x73, 0x74, 0x20, 0x41, 0x6c, 0x62, 0x75, 0x6d,
/// ];
///
/// let mut r = BitReader::endian(data, LittleEndian);
/// let comment = r.parse::<VorbisComment>().unwrap();
/// assert_eq!(comment.vendor_string, "vendor");
/// assert_eq!(comment.get("title"), Some("Testing"));
/// assert_eq!(comment.get(VorbisComment::ALBUM), Some("Test Album"));
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VorbisComment {
    /// The vendor string
    pub vendor_string: String,
    /// The individual comment strings
    pub fields: Vec<String>,
}

impl Default for VorbisComment {
    fn default() -> Self {
        Self {
            vendor_string: concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
                .to_owned(),
            fields: vec![],
        }
    }
}

impl VorbisComment {
    /// Name of current work
    pub const TITLE: &str = "TITLE";

    /// Name of the artist generally responsible for the current work
    pub const ARTIST: &str = "ARTIST";

    /// Name of the collection the current work belongs to
    pub const ALBUM: &str = "ALBUM";

    /// Track number of current work within its collection
    pub const TRACK_NUMBER: &str = "TRACKNUMBER";

    /// Total tracks in the collection
    pub const TRACK_TOTAL: &str = "TRACKTOTAL";

    /// The channel mask of multi-channel audio streams
    pub const CHANNEL_MASK: &str = "WAVEFORMATEXTENSIBLE_CHANNEL_MASK";

    /// Builds empty comment with the given vendor string
    pub fn new<S: Into<String>>(vendor_string: S) -> Self {
        Self {
            vendor_string: vendor_string.into(),
            fields: vec![],
        }
    }

    /// Given a key, returns first matching value, if any
    ///
    /// Keys are matched case-insensitively
    pub fn get(&self, key: &str) -> Option<&str> {
        self.all(key).next()
    }

    /// Given a key, iterates over all matching values in order
    ///
    /// Keys are matched case-insensitively
    pub fn all(&self, key: &str) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|f| {
            f.split_once('=')
                .and_then(|(k, value)| k.eq_ignore_ascii_case(key).then_some(value))
        })
    }

    /// Iterates over all key-value pairs in order
    ///
    /// Fields without a `=` separator are skipped.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().filter_map(|f| f.split_once('='))
    }

    /// Adds new instance of key with the given value
    ///
    /// # Panics
    ///
    /// Panics if key contains the `=` character.
    pub fn insert<S>(&mut self, key: &str, value: S)
    where
        S: std::fmt::Display,
    {
        assert!(!key.contains('='), "key must not contain '='");

        self.fields.push(format!("{key}={value}"));
    }

    /// Removes any matching instances of the given key
    ///
    /// Keys are matched case-insensitively
    pub fn remove(&mut self, key: &str) {
        self.fields.retain(|f| match f.split_once('=') {
            Some((k, _)) => !k.eq_ignore_ascii_case(key),
            None => true,
        });
    }

    /// Replaces any instances of the given key with a single value
    ///
    /// The new value takes the position of the first replaced field,
    /// or is appended if there were none.
    ///
    /// # Panics
    ///
    /// Panics if key contains the `=` character.
    pub fn set<S>(&mut self, key: &str, value: S)
    where
        S: std::fmt::Display,
    {
        self.replace(key, std::iter::once(value))
    }

    /// Replaces any instances of the given key with the given values
    ///
    /// The new values take the position of the first replaced field,
    /// or are appended if there were none.
    ///
    /// # Panics
    ///
    /// Panics if key contains the `=` character
    pub fn replace<S, I>(&mut self, key: &str, values: I)
    where
        S: std::fmt::Display,
        I: IntoIterator<Item = S>,
    {
        assert!(!key.contains('='), "key must not contain '='");

        let position = self
            .fields
            .iter()
            .position(|f| {
                f.split_once('=')
                    .is_some_and(|(k, _)| k.eq_ignore_ascii_case(key))
            })
            .unwrap_or(self.fields.len());

        self.remove(key);

        let position = position.min(self.fields.len());
        self.fields.splice(
            position..position,
            values.into_iter().map(|value| format!("{key}={value}")),
        );
    }

    /// Size of comment when written, in bytes
    pub fn size(&self) -> usize {
        4 + self.vendor_string.len() + 4 + self.fields.iter().map(|f| 4 + f.len()).sum::<usize>()
    }

    /// Parses comment from bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        bitstream_io::BitReader::endian(bytes, LittleEndian).parse()
    }

    /// Returns comment as bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut w = bitstream_io::BitWriter::endian(Vec::with_capacity(self.size()), LittleEndian);
        w.build(self)?;
        Ok(w.into_writer())
    }
}

impl FromBitStream for VorbisComment {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        fn read_string<R: BitRead + ?Sized>(r: &mut R) -> Result<String, Error> {
            let size = r.read_as_to::<LittleEndian, u32>()?;
            Ok(String::from_utf8(r.read_to_vec(size as usize)?)?)
        }

        Ok(Self {
            vendor_string: read_string(r)?,
            fields: (0..(r.read_as_to::<LittleEndian, u32>()?))
                .map(|_| read_string(r))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

impl ToBitStream for VorbisComment {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        fn write_string<W: BitWrite + ?Sized>(w: &mut W, s: &str) -> Result<(), Error> {
            w.write_as_from::<LittleEndian, u32>(
                s.len()
                    .try_into()
                    .map_err(|_| Error::Encoding("excessive string length".into()))?,
            )?;
            w.write_bytes(s.as_bytes())?;
            Ok(())
        }

        write_string(w, &self.vendor_string)?;
        w.write_as_from::<LittleEndian, u32>(
            self.fields
                .len()
                .try_into()
                .map_err(|_| Error::Encoding("excessive Vorbis comment entries".into()))?,
        )?;
        self.fields.iter().try_for_each(|s| write_string(w, s))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_duplicate_keys() {
        let mut comment = VorbisComment::new("vendor");
        comment.insert("ARTIST", "First");
        comment.insert(VorbisComment::TITLE, "Title");
        comment.insert("artist", "Second");

        assert_eq!(comment.get("Artist"), Some("First"));
        assert_eq!(comment.all("ARTIST").collect::<Vec<_>>(), ["First", "Second"]);

        comment.set("ARTIST", "Only");
        assert_eq!(comment.fields, ["ARTIST=Only", "TITLE=Title"]);

        comment.replace("TITLE", ["A", "B"]);
        assert_eq!(comment.fields, ["ARTIST=Only", "TITLE=A", "TITLE=B"]);

        comment.remove("artist");
        assert_eq!(comment.get("ARTIST"), None);

        comment.set("ALBUM", "Album");
        assert_eq!(comment.fields, ["TITLE=A", "TITLE=B", "ALBUM=Album"]);
    }

    #[test]
    fn test_serialization() {
        let mut comment = VorbisComment::new("vendor");
        comment.insert("TITLE", "Tést");
        comment.fields.push("NOSEPARATOR".to_owned());

        let bytes = comment.to_bytes().unwrap();
        assert_eq!(bytes.len(), comment.size());
        assert_eq!(&bytes[0..4], &[6, 0, 0, 0]);
        assert_eq!(&bytes[10..14], &[2, 0, 0, 0]);

        let parsed = VorbisComment::parse(&bytes).unwrap();
        assert_eq!(parsed, comment);
        assert_eq!(parsed.iter().collect::<Vec<_>>(), [("TITLE", "Tést")]);

        assert!(matches!(
            VorbisComment::parse(&bytes[0..bytes.len() - 1]),
            Err(Error::Truncated)
        ));
    }
}
