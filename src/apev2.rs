// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling APEv2 tags
//!
//! APEv2 tags are appended to the end of a file,
//! ahead of any trailing ID3v1 tag.
//! All fields are little-endian.
//!
//! | Bytes | Field |
//! |------:|-------|
//! | 32 | optional header |
//! | … | items |
//! | 32 | footer |
//!
//! where header and footer share the same layout:
//!
//! | Bytes | Field |
//! |------:|-------|
//! | 8 | `APETAGEX` |
//! | 4 | version, 2000 |
//! | 4 | tag size, counting items and footer |
//! | 4 | item count |
//! | 4 | flags |
//! | 8 | reserved, all 0 |

use crate::{Error, UpdateStrategy};
use bitstream_io::{ByteRead, ByteReader, ByteWrite, ByteWriter, FromByteStream, LittleEndian, ToByteStream};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

const PREAMBLE: [u8; 8] = *b"APETAGEX";
const VERSION: u32 = 2000;
const HEADER_SIZE: u32 = 32;

const CONTAINS_HEADER: u32 = 1 << 31;
const CONTAINS_NO_FOOTER: u32 = 1 << 30;
const IS_HEADER: u32 = 1 << 29;
const READ_ONLY: u32 = 1;

/// An APEv2 header or footer
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct ApeHeader {
    version: u32,
    // items and footer, not including header
    tag_size: u32,
    item_count: u32,
    flags: u32,
}

impl FromByteStream for ApeHeader {
    type Error = Error;

    fn from_reader<R: ByteRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        if r.read::<[u8; 8]>()? != PREAMBLE {
            return Err(Error::InvalidApeTag("missing preamble"));
        }

        let header = Self {
            version: r.read()?,
            tag_size: r.read()?,
            item_count: r.read()?,
            flags: r.read()?,
        };
        r.skip(8)?;
        Ok(header)
    }
}

impl ToByteStream for ApeHeader {
    type Error = std::io::Error;

    fn to_writer<W: ByteWrite + ?Sized>(&self, w: &mut W) -> std::io::Result<()> {
        w.write(PREAMBLE)?;
        w.write(self.version)?;
        w.write(self.tag_size)?;
        w.write(self.item_count)?;
        w.write(self.flags)?;
        w.write([0u8; 8])
    }
}

/// An APEv2 item's value type
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ItemType {
    /// UTF-8 text
    Text,
    /// Binary data
    Binary,
    /// UTF-8 text locator of external data
    External,
    /// Reserved type
    Reserved,
}

impl ItemType {
    fn from_flags(flags: u32) -> Self {
        match (flags >> 1) & 0b11 {
            0 => Self::Text,
            1 => Self::Binary,
            2 => Self::External,
            _ => Self::Reserved,
        }
    }

    fn to_flags(self) -> u32 {
        (match self {
            Self::Text => 0,
            Self::Binary => 1,
            Self::External => 2,
            Self::Reserved => 3,
        }) << 1
    }
}

/// A single APEv2 item
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApeItem {
    key: String,
    /// The item's value type
    pub item_type: ItemType,
    /// Whether the item is flagged read-only
    pub read_only: bool,
    /// The item's raw value
    pub value: Vec<u8>,
}

impl ApeItem {
    /// Builds text item
    pub fn text<S: Into<String>>(key: &str, value: S) -> Result<Self, Error> {
        Ok(Self {
            key: valid_key(key)?,
            item_type: ItemType::Text,
            read_only: false,
            value: value.into().into_bytes(),
        })
    }

    /// Builds binary item
    pub fn binary(key: &str, value: Vec<u8>) -> Result<Self, Error> {
        Ok(Self {
            key: valid_key(key)?,
            item_type: ItemType::Binary,
            read_only: false,
            value,
        })
    }

    /// The item's key
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The item's value as text, if it is a valid text item
    pub fn as_text(&self) -> Option<&str> {
        match self.item_type {
            ItemType::Text | ItemType::External => std::str::from_utf8(&self.value).ok(),
            ItemType::Binary | ItemType::Reserved => None,
        }
    }

    /// Size of item when written, in bytes
    pub fn size(&self) -> usize {
        4 + 4 + self.key.len() + 1 + self.value.len()
    }
}

// keys are 2 to 255 bytes of printable ASCII
fn valid_key(key: &str) -> Result<String, Error> {
    if (2..=255).contains(&key.len()) && key.bytes().all(|b| (0x20..=0x7E).contains(&b)) {
        Ok(key.to_owned())
    } else {
        Err(Error::InvalidApeTag("invalid item key"))
    }
}

impl FromByteStream for ApeItem {
    type Error = Error;

    fn from_reader<R: ByteRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        let value_len = r.read::<u32>()?;
        let flags = r.read::<u32>()?;

        let mut key = Vec::new();
        loop {
            match r.read::<u8>()? {
                0 => break,
                _ if key.len() == 255 => return Err(Error::InvalidApeTag("invalid item key")),
                b => key.push(b),
            }
        }

        Ok(Self {
            key: valid_key(
                std::str::from_utf8(&key).map_err(|_| Error::InvalidApeTag("invalid item key"))?,
            )?,
            item_type: ItemType::from_flags(flags),
            read_only: flags & READ_ONLY != 0,
            value: r.read_to_vec(value_len as usize)?,
        })
    }
}

impl ToByteStream for ApeItem {
    type Error = Error;

    fn to_writer<W: ByteWrite + ?Sized>(&self, w: &mut W) -> Result<(), Error> {
        w.write::<u32>(
            self.value
                .len()
                .try_into()
                .map_err(|_| Error::Encoding("APEv2 item too large".into()))?,
        )?;
        w.write(self.item_type.to_flags() | u32::from(self.read_only))?;
        w.write_bytes(self.key.as_bytes())?;
        w.write::<u8>(0)?;
        w.write_bytes(&self.value)?;
        Ok(())
    }
}

/// Where an APEv2 tag sits in its file
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TagLocation {
    /// Absolute offset of tag's first byte
    pub offset: u64,
    /// Total tag size, including header and footer
    pub size: u64,
}

/// An APEv2 tag
///
/// # Example
///
/// ```
/// use audio_containers::apev2::ApeTag;
/// use std::io::Cursor;
///
/// let mut tag = ApeTag::default();
/// tag.set_text("Title", "Song Title").unwrap();
/// tag.set_text("Artist", "Some Artist").unwrap();
///
/// let mut file = b"audio data".to_vec();
/// file.extend(tag.to_bytes().unwrap());
///
/// let (read, location) = ApeTag::read(Cursor::new(file)).unwrap().unwrap();
/// assert_eq!(read.get_text("TITLE"), Some("Song Title"));
/// assert_eq!(location.offset, 10);
/// assert_eq!(location.size, tag.size());
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApeTag {
    /// Whether the tag is written with a header
    pub has_header: bool,
    items: Vec<ApeItem>,
}

impl Default for ApeTag {
    fn default() -> Self {
        Self {
            has_header: true,
            items: vec![],
        }
    }
}

impl ApeTag {
    /// Locates and reads tag from the end of the stream
    ///
    /// A trailing 128 byte ID3v1 tag is skipped.
    /// Returns `None` if the stream has no APEv2 tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidApeTag`] if the footer's size
    /// runs past the start of the file or any item is invalid.
    pub fn read<R: Read + Seek>(mut reader: R) -> Result<Option<(Self, TagLocation)>, Error> {
        let end = tag_end(reader.by_ref())?;

        let Some(footer_offset) = end.checked_sub(u64::from(HEADER_SIZE)) else {
            return Ok(None);
        };
        reader.seek(SeekFrom::Start(footer_offset))?;
        let mut footer = [0; HEADER_SIZE as usize];
        reader.read_exact(&mut footer)?;

        let footer = match ByteReader::endian(footer.as_slice(), LittleEndian).parse::<ApeHeader>() {
            Ok(footer) if footer.version == VERSION && footer.flags & IS_HEADER == 0 => footer,
            Ok(_) | Err(Error::InvalidApeTag(_)) => return Ok(None),
            Err(err) => return Err(err),
        };

        if footer.tag_size < HEADER_SIZE {
            return Err(Error::InvalidApeTag("invalid tag size"));
        }

        let has_header = footer.flags & CONTAINS_HEADER != 0;
        let size = u64::from(footer.tag_size) + if has_header { u64::from(HEADER_SIZE) } else { 0 };
        let offset = end
            .checked_sub(size)
            .ok_or(Error::InvalidApeTag("tag size exceeds file size"))?;

        reader.seek(SeekFrom::Start(end - u64::from(footer.tag_size)))?;
        let mut items = vec![0; (footer.tag_size - HEADER_SIZE) as usize];
        reader.read_exact(&mut items)?;

        let mut r = ByteReader::endian(items.as_slice(), LittleEndian);
        let items = (0..footer.item_count)
            .map(|_| r.parse::<ApeItem>())
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!("found APEv2 tag with {} items at {offset}", items.len());

        Ok(Some((Self { has_header, items }, TagLocation { offset, size })))
    }

    /// Iterates over all items in order
    pub fn items(&self) -> impl Iterator<Item = &ApeItem> {
        self.items.iter()
    }

    /// Whether the tag has no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns item with the given key, if any
    ///
    /// Keys are matched case-insensitively
    pub fn get(&self, key: &str) -> Option<&ApeItem> {
        self.items.iter().find(|i| i.key.eq_ignore_ascii_case(key))
    }

    /// Returns text value of the given key, if any
    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|i| i.as_text())
    }

    /// Adds item, replacing any item with the same key
    ///
    /// A replacement keeps the position of the item it replaces.
    pub fn insert(&mut self, item: ApeItem) {
        match self
            .items
            .iter_mut()
            .find(|i| i.key.eq_ignore_ascii_case(&item.key))
        {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    /// Sets text value of the given key
    pub fn set_text<S: Into<String>>(&mut self, key: &str, value: S) -> Result<(), Error> {
        ApeItem::text(key, value).map(|item| self.insert(item))
    }

    /// Sets binary value of the given key
    pub fn set_binary(&mut self, key: &str, value: Vec<u8>) -> Result<(), Error> {
        ApeItem::binary(key, value).map(|item| self.insert(item))
    }

    /// Removes item with the given key
    ///
    /// Keys are matched case-insensitively
    pub fn remove(&mut self, key: &str) {
        self.items.retain(|i| !i.key.eq_ignore_ascii_case(key))
    }

    /// Retains only items matching the given predicate
    pub fn retain<F: FnMut(&ApeItem) -> bool>(&mut self, f: F) {
        self.items.retain(f)
    }

    /// Total size of tag when written, including header and footer
    pub fn size(&self) -> u64 {
        self.items.iter().map(|i| i.size() as u64).sum::<u64>()
            + u64::from(HEADER_SIZE)
            + if self.has_header { u64::from(HEADER_SIZE) } else { 0 }
    }

    /// Returns tag as bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let tag_size = u32::try_from(self.size() - if self.has_header { u64::from(HEADER_SIZE) } else { 0 })
            .map_err(|_| Error::Encoding("APEv2 tag too large".into()))?;
        let item_count = u32::try_from(self.items.len())
            .map_err(|_| Error::Encoding("too many APEv2 items".into()))?;
        let flags = if self.has_header { CONTAINS_HEADER } else { 0 };

        let mut w = ByteWriter::endian(Vec::with_capacity(self.size() as usize), LittleEndian);
        if self.has_header {
            w.build(&ApeHeader {
                version: VERSION,
                tag_size,
                item_count,
                flags: flags | IS_HEADER,
            })?;
        }
        for item in &self.items {
            w.build(item)?;
        }
        w.build(&ApeHeader {
            version: VERSION,
            tag_size,
            item_count,
            flags: flags & !CONTAINS_NO_FOOTER,
        })?;
        Ok(w.into_writer())
    }
}

// end of the region an APEv2 tag may occupy,
// which is before any ID3v1 tag
fn tag_end<R: Read + Seek>(mut reader: R) -> Result<u64, Error> {
    let len = reader.seek(SeekFrom::End(0))?;
    if len >= 128 {
        reader.seek(SeekFrom::Start(len - 128))?;
        let mut magic = [0; 3];
        reader.read_exact(&mut magic)?;
        if &magic == b"TAG" {
            return Ok(len - 128);
        }
    }
    Ok(len)
}

/// Writes tag to file at the given path, replacing any existing tag
///
/// A tag at least as large as the existing tag
/// is written over it in place, extending the file if necessary.
/// A file with no tag has one appended.
/// A smaller tag causes the file to be rebuilt in a temporary file
/// which is renamed over the original.
/// In all cases, any trailing ID3v1 tag is preserved after the new tag.
///
/// The in-place paths assume no other process
/// is writing to the file at the same time.
pub fn update<P: AsRef<Path>>(path: P, tag: &ApeTag) -> Result<UpdateStrategy, Error> {
    let path = path.as_ref();
    let bytes = tag.to_bytes()?;

    let mut file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
    let existing = ApeTag::read(&mut file)?.map(|(_, location)| location);
    let end = tag_end(&mut file)?;

    let (offset, strategy) = match existing {
        Some(location) if tag.size() >= location.size => (location.offset, UpdateStrategy::InPlace),
        Some(location) => {
            log::debug!("rewriting {} around smaller APEv2 tag", path.display());
            let trailing = read_from(&mut file, location.offset + location.size)?;
            file.rewind()?;
            return crate::swap::replace_file(path, |f| {
                crate::swap::copy_exact(&mut file, f, location.offset)?;
                f.write_all(&bytes)?;
                f.write_all(&trailing)?;
                Ok(())
            })
            .map(|()| UpdateStrategy::Rewritten);
        }
        None => (end, UpdateStrategy::Appended),
    };

    log::debug!("writing APEv2 tag to {} at {offset}", path.display());

    let trailing = read_from(&mut file, end)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&bytes)?;
    file.write_all(&trailing)?;
    file.set_len(offset + bytes.len() as u64 + trailing.len() as u64)?;
    file.flush()?;
    Ok(strategy)
}

/// Removes tag from file at the given path
///
/// If the tag holds ReplayGain or cuesheet items,
/// it is replaced by a tag holding only those items.
/// Otherwise, the tag is cut from the file
/// and any trailing ID3v1 tag is moved into its place.
/// Returns `false` if the file has no tag.
pub fn delete<P: AsRef<Path>>(path: P) -> Result<bool, Error> {
    fn retained(item: &ApeItem) -> bool {
        item.key
            .get(0..11)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("replaygain_"))
            || item.key.eq_ignore_ascii_case("cuesheet")
    }

    let path = path.as_ref();
    let mut file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;

    let Some((mut tag, location)) = ApeTag::read(&mut file)? else {
        return Ok(false);
    };

    if tag.items().any(retained) {
        drop(file);
        tag.retain(retained);
        return update(path, &tag).map(|_| true);
    }

    let trailing = read_from(&mut file, location.offset + location.size)?;
    file.seek(SeekFrom::Start(location.offset))?;
    file.write_all(&trailing)?;
    file.set_len(location.offset + trailing.len() as u64)?;
    file.flush()?;
    Ok(true)
}

fn read_from(file: &mut std::fs::File, offset: u64) -> Result<Vec<u8>, Error> {
    let mut rest = vec![];
    file.seek(SeekFrom::Start(offset))?;
    file.read_to_end(&mut rest)?;
    Ok(rest)
}
