// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling the nested atoms of M4A files
//!
//! Each atom is a big-endian size and ID, followed by its body:
//!
//! | Bytes | Field |
//! |------:|-------|
//! | 4 | atom size, including this header |
//! | 4 | atom ID |
//! | 8 | 64-bit atom size, only if the 32-bit size is 1 |
//! | … | body |
//!
//! A 32-bit size of 0 means the atom extends to the end of its parent.
//! Container atoms hold nothing but other atoms,
//! except for `meta` which prefixes its children
//! with 4 bytes of version and flags.
//!
//! [`update_metadata`] rewrites a file's `ilst` atom.

use crate::audio::{ChannelMask, Descriptor};
use crate::bitstream::{BitstreamReader, Field, Value};
use crate::metadata::{MetaField, Metadata};
use crate::{Error, Options};
use bitstream_io::{BigEndian, BitRead, ByteRead, ByteReader, ByteWrite, ByteWriter};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A 4 byte atom ID
///
/// Unlike chunk IDs, atom IDs need not be ASCII,
/// as in `©nam`.
pub type AtomId = [u8; 4];

const CONTAINERS: [&AtomId; 10] = [
    b"moov", b"trak", b"mdia", b"minf", b"stbl", b"udta", b"meta", b"ilst", b"dinf", b"edts",
];

/// The contents of an atom
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AtomBody {
    /// Raw bytes
    Leaf(Vec<u8>),
    /// Child atoms
    Container {
        /// Bytes preceding the children, such as `meta`'s version and flags
        prefix: Vec<u8>,
        /// The child atoms in order
        children: Vec<Atom>,
    },
    /// A body too large to load, left in the source stream
    Skipped {
        /// The body's offset in the source stream
        offset: u64,
        /// The body's size, in bytes
        size: u64,
    },
}

/// A single atom and its contents
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Atom {
    /// The atom's ID
    pub id: AtomId,
    /// The atom's body
    pub body: AtomBody,
}

impl Atom {
    /// Builds leaf atom from raw bytes
    pub fn leaf(id: AtomId, data: Vec<u8>) -> Self {
        Self {
            id,
            body: AtomBody::Leaf(data),
        }
    }

    /// Builds container atom from its children
    pub fn container(id: AtomId, children: Vec<Atom>) -> Self {
        Self {
            id,
            body: AtomBody::Container {
                prefix: vec![],
                children,
            },
        }
    }

    /// Size of atom body, in bytes
    pub fn body_size(&self) -> u64 {
        match &self.body {
            AtomBody::Leaf(data) => data.len() as u64,
            AtomBody::Container { prefix, children } => {
                prefix.len() as u64 + children.iter().map(|c| c.size()).sum::<u64>()
            }
            AtomBody::Skipped { size, .. } => *size,
        }
    }

    /// Total size of atom, including its header
    ///
    /// Atoms too large for a 32-bit size
    /// take an extra 8 bytes for a 64-bit size.
    pub fn size(&self) -> u64 {
        let body = self.body_size();
        if body + 8 > u64::from(u32::MAX) {
            body + 16
        } else {
            body + 8
        }
    }

    /// Returns atom's children, if it is a container
    pub fn children(&self) -> &[Atom] {
        match &self.body {
            AtomBody::Container { children, .. } => children,
            _ => &[],
        }
    }

    /// Returns atom's raw data, if it is a loaded leaf
    pub fn data(&self) -> Option<&[u8]> {
        match &self.body {
            AtomBody::Leaf(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the first child with the given ID,
    /// appending a new one if none is found
    ///
    /// Returns `None` if this atom is not a container.
    pub fn child_or_insert_with<F>(&mut self, id: AtomId, f: F) -> Option<&mut Atom>
    where
        F: FnOnce() -> Atom,
    {
        let AtomBody::Container { children, .. } = &mut self.body else {
            return None;
        };
        match children.iter().position(|c| c.id == id) {
            Some(i) => children.get_mut(i),
            None => {
                children.push(f());
                children.last_mut()
            }
        }
    }

    /// Walks a path of IDs from this atom's children
    ///
    /// The first child matching each ID is taken.
    /// An empty path returns the atom itself.
    pub fn find(&self, path: &[&AtomId]) -> Option<&Atom> {
        match path {
            [] => Some(self),
            [id, rest @ ..] => self
                .children()
                .iter()
                .find(|a| &a.id == *id)
                .and_then(|a| a.find(rest)),
        }
    }

    /// Writes atom and all its children
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] for skipped atoms,
    /// whose bodies are not available.
    /// Use [`Atom::build_from`] for those.
    pub fn build<W: Write>(&self, w: &mut W) -> Result<(), Error> {
        self.build_from(&mut Cursor::new(&[][..]), w)
    }

    /// Writes atom and all its children,
    /// taking skipped bodies from the given source
    pub fn build_from<R, W>(&self, source: &mut R, w: &mut W) -> Result<(), Error>
    where
        R: Read + Seek,
        W: Write,
    {
        let body_size = self.body_size();
        {
            let mut w = ByteWriter::endian(w.by_ref(), BigEndian);
            match u32::try_from(body_size + 8) {
                Ok(size) => {
                    w.write(size)?;
                    w.write(self.id)?;
                }
                Err(_) => {
                    w.write::<u32>(1)?;
                    w.write(self.id)?;
                    w.write(body_size + 16)?;
                }
            }
        }

        match &self.body {
            AtomBody::Leaf(data) => w.write_all(data).map_err(Error::Io),
            AtomBody::Container { prefix, children } => {
                w.write_all(prefix)?;
                children.iter().try_for_each(|c| c.build_from(source, w))
            }
            AtomBody::Skipped { offset, size } => {
                source.seek(SeekFrom::Start(*offset))?;
                crate::swap::copy_exact(source.by_ref(), w, *size)
            }
        }
    }
}

/// Reads a sequence of atoms spanning `len` bytes
///
/// Leaf atoms larger than the options' in-memory limit
/// are skipped over and recorded by offset.
///
/// # Errors
///
/// Returns [`Error::InvalidM4a`] if an atom's size
/// is smaller than its header or larger than its parent.
pub fn read_atoms<R: Read + Seek>(reader: &mut R, len: u64, options: Options) -> Result<Vec<Atom>, Error> {
    read_children(reader, len, None, 0, options)
}

// real files nest no deeper than moov/trak/mdia/minf/stbl/stsd
const MAX_DEPTH: usize = 16;

fn read_children<R: Read + Seek>(
    reader: &mut R,
    mut remaining: u64,
    parent: Option<AtomId>,
    depth: usize,
    options: Options,
) -> Result<Vec<Atom>, Error> {
    if depth > MAX_DEPTH {
        return Err(Error::InvalidM4a("atoms nested too deeply"));
    }

    let mut atoms = Vec::new();

    while remaining > 0 {
        let (id, header_size, total_size) = {
            let mut r = ByteReader::endian(reader.by_ref(), BigEndian);
            let size = r.read::<u32>()?;
            let id = r.read::<AtomId>()?;
            match size {
                0 => (id, 8, remaining),
                1 => (id, 16, r.read::<u64>()?),
                size => (id, 8, u64::from(size)),
            }
        };

        let body_size = total_size
            .checked_sub(header_size)
            .ok_or(Error::InvalidM4a("atom size smaller than its header"))?;

        remaining = remaining
            .checked_sub(total_size)
            .ok_or(Error::InvalidM4a("atom size exceeds its parent"))?;

        log::trace!(
            "{} atom of {body_size} bytes",
            id.iter().map(|b| char::from(*b)).collect::<String>()
        );

        // every ilst item contains data atoms
        let body = if CONTAINERS.contains(&&id) || parent == Some(*b"ilst") {
            let prefix = if &id == b"meta" {
                let mut prefix = vec![0; 4];
                reader.read_exact(&mut prefix)?;
                prefix
            } else {
                vec![]
            };
            let children_size = body_size
                .checked_sub(prefix.len() as u64)
                .ok_or(Error::InvalidM4a("invalid meta atom"))?;
            AtomBody::Container {
                prefix,
                children: read_children(reader, children_size, Some(id), depth + 1, options)?,
            }
        } else if body_size > u64::from(options.get_in_memory_limit()) {
            let offset = reader.stream_position()?;
            let end = reader.seek(SeekFrom::End(0))?;
            if offset + body_size > end {
                return Err(Error::Truncated);
            }
            reader.seek(SeekFrom::Start(offset + body_size))?;
            AtomBody::Skipped {
                offset,
                size: body_size,
            }
        } else {
            let mut data = Vec::new();
            reader.by_ref().take(body_size).read_to_end(&mut data)?;
            if data.len() as u64 != body_size {
                return Err(Error::Truncated);
            }
            AtomBody::Leaf(data)
        };

        atoms.push(Atom { id, body });
    }

    Ok(atoms)
}

/// Returns the first atom along the given path of IDs
pub fn find<'a>(atoms: &'a [Atom], path: &[&AtomId]) -> Option<&'a Atom> {
    match path {
        [] => None,
        [id, rest @ ..] => atoms.iter().find(|a| &a.id == *id)?.find(rest),
    }
}

const MDHD_V0: [Field; 6] = [
    Field::Unsigned(8),
    Field::Skip(24),
    Field::Skip(32),
    Field::Skip(32),
    Field::Unsigned(32),
    Field::Unsigned(32),
];

const MDHD_V1: [Field; 6] = [
    Field::Unsigned(8),
    Field::Skip(24),
    Field::Skip(64),
    Field::Skip(64),
    Field::Unsigned(32),
    Field::Unsigned(64),
];

/// The time scale and duration from an `mdhd` atom
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MediaHeader {
    /// Time units per second, which is the sample rate for audio
    pub time_scale: u32,
    /// Duration in time units
    pub duration: u64,
}

impl MediaHeader {
    /// Parses `mdhd` atom body
    ///
    /// Version 0 bodies have 32-bit time fields,
    /// version 1 bodies have 64-bit ones.
    pub fn parse(body: &[u8]) -> Result<Self, Error> {
        const INVALID: Error = Error::InvalidM4a("invalid mdhd atom");

        let mut r = BitstreamReader::endian(Cursor::new(body), BigEndian);

        r.mark()?;
        let version = r.reader().read::<8, u8>().map_err(|_| INVALID)?;
        r.rewind()?;
        r.unmark()?;

        let template: &[Field] = match version {
            0 => &MDHD_V0,
            1 => &MDHD_V1,
            _ => return Err(Error::InvalidM4a("unsupported mdhd version")),
        };

        match r.parse(template).map_err(|_| INVALID)?.as_slice() {
            [_, Value::Unsigned(time_scale), Value::Unsigned(duration)] => Ok(Self {
                time_scale: u32::try_from(*time_scale)
                    .ok()
                    .filter(|t| *t > 0)
                    .ok_or(INVALID)?,
                duration: *duration,
            }),
            _ => Err(Error::TemplateMismatch),
        }
    }
}

/// The audio parameters of an `stsd` atom's first sample entry
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SampleEntry {
    /// Sample entry format, such as `mp4a` or `alac`
    pub format: AtomId,
    /// Channel count
    pub channels: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Sample rate, from the entry or ALAC magic cookie
    pub sample_rate: u32,
}

impl SampleEntry {
    /// Parses `stsd` atom body
    ///
    /// ALAC entries have their parameters taken
    /// from the magic cookie, when present.
    pub fn parse(body: &[u8]) -> Result<Self, Error> {
        const INVALID: Error = Error::InvalidM4a("invalid stsd atom");

        fn read_entry<R: ByteRead + ?Sized>(r: &mut R) -> std::io::Result<(u32, SampleEntry)> {
            r.skip(4)?; // version and flags
            if r.read::<u32>()? == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::InvalidData));
            }
            let entry_size = r.read::<u32>()?;
            let format = r.read::<AtomId>()?;
            r.skip(6 + 2 + 8)?; // reserved, data reference index, version, revision, vendor
            let channels = r.read::<u16>()?;
            let bits_per_sample = r.read::<u16>()?;
            r.skip(4)?; // compression ID and packet size
            let sample_rate = r.read::<u32>()? >> 16;
            Ok((
                entry_size,
                SampleEntry {
                    format,
                    channels,
                    bits_per_sample,
                    sample_rate,
                },
            ))
        }

        let (entry_size, mut entry) =
            read_entry(&mut ByteReader::endian(body, BigEndian)).map_err(|_| INVALID)?;
        let format = entry.format;

        if &format == b"alac" {
            // 8 byte stsd header and 36 byte sample entry precede the cookie
            let start = 8 + 36;
            let end = 8 + entry_size as usize;
            if let Some(extensions) = body.get(start..end) {
                let mut extensions = Cursor::new(extensions);
                let len = extensions.get_ref().len() as u64;
                let atoms = read_children(&mut extensions, len, None, 0, Options::default())?;
                if let Some(cookie) = find(&atoms, &[b"alac"]).and_then(|a| a.data()) {
                    entry.apply_alac_cookie(cookie)?;
                }
            }
        }

        Ok(entry)
    }

    fn apply_alac_cookie(&mut self, cookie: &[u8]) -> Result<(), Error> {
        let mut r = ByteReader::endian(cookie, BigEndian);
        r.skip(4)?; // version and flags
        r.skip(4 + 1)?; // frame length, compatible version
        let bits_per_sample = r.read::<u8>()?;
        r.skip(3)?; // rice parameters
        let channels = r.read::<u8>()?;
        r.skip(2 + 4 + 4)?; // max run, max frame bytes, average bit rate
        let sample_rate = r.read::<u32>()?;

        self.bits_per_sample = bits_per_sample.into();
        self.channels = channels.into();
        self.sample_rate = sample_rate;
        Ok(())
    }
}

/// An M4A file's atoms, audio parameters and metadata
///
/// # Example
///
/// ```
/// use audio_containers::atom::{Atom, M4aFile};
/// use std::io::Cursor;
///
/// let mut mdhd = vec![0; 4 + 8];
/// mdhd.extend(44100u32.to_be_bytes());
/// mdhd.extend(441000u32.to_be_bytes());
/// mdhd.extend([0; 4]);
///
/// let mut stsd = vec![0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 36];
/// stsd.extend(b"mp4a");
/// stsd.extend([0; 6 + 2 + 8]);
/// stsd.extend(2u16.to_be_bytes());
/// stsd.extend(16u16.to_be_bytes());
/// stsd.extend([0; 4]);
/// stsd.extend((44100u32 << 16).to_be_bytes());
///
/// let moov = Atom::container(*b"moov", vec![
///     Atom::container(*b"trak", vec![
///         Atom::container(*b"mdia", vec![
///             Atom::leaf(*b"mdhd", mdhd),
///             Atom::container(*b"minf", vec![
///                 Atom::container(*b"stbl", vec![Atom::leaf(*b"stsd", stsd)]),
///             ]),
///         ]),
///     ]),
/// ]);
///
/// let mut file = vec![];
/// Atom::leaf(*b"ftyp", b"M4A \0\0\0\0".to_vec()).build(&mut file).unwrap();
/// moov.build(&mut file).unwrap();
///
/// let m4a = M4aFile::new(Cursor::new(file)).unwrap();
/// assert_eq!(m4a.descriptor().sample_rate, 44100);
/// assert_eq!(m4a.descriptor().channels, 2);
/// assert_eq!(m4a.descriptor().total_frames, 441000);
/// assert!(m4a.metadata().is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct M4aFile {
    atoms: Vec<Atom>,
    descriptor: Descriptor,
    metadata: Metadata,
}

impl M4aFile {
    /// Opens M4A file from the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::open_with(path, Options::default())
    }

    /// Opens M4A file with the given options
    pub fn open_with<P: AsRef<Path>>(path: P, options: Options) -> Result<Self, Error> {
        std::fs::File::open(path)
            .map_err(Error::Io)
            .and_then(|f| Self::new_with(std::io::BufReader::new(f), options))
    }

    /// Reads M4A file from the given stream
    pub fn new<R: Read + Seek>(reader: R) -> Result<Self, Error> {
        Self::new_with(reader, Options::default())
    }

    /// Reads M4A file from the given stream with the given options
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidM4a`] if the stream
    /// does not start with an `ftyp` atom,
    /// or has no audio track.
    pub fn new_with<R: Read + Seek>(mut reader: R, options: Options) -> Result<Self, Error> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.rewind()?;

        let mut header = [0; 8];
        match reader.read_exact(&mut header) {
            Ok(()) if &header[4..8] == b"ftyp" => reader.rewind()?,
            Ok(()) => return Err(Error::InvalidM4a("not an M4A file")),
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(Error::InvalidM4a("not an M4A file"));
            }
            Err(err) => return Err(Error::Io(err)),
        }

        let atoms = read_atoms(&mut reader, len, options)?;

        let moov = find(&atoms, &[b"moov"]).ok_or(Error::InvalidM4a("moov atom not found"))?;

        let (mdhd, entry) = moov
            .children()
            .iter()
            .filter(|a| &a.id == b"trak")
            .find_map(|trak| {
                let mdia = trak.find(&[b"mdia"])?;
                let stsd = mdia.find(&[b"minf", b"stbl", b"stsd"])?.data()?;
                let mdhd = mdia.find(&[b"mdhd"])?.data()?;
                Some((mdhd, stsd))
            })
            .ok_or(Error::InvalidM4a("audio track not found"))?;

        let mdhd = MediaHeader::parse(mdhd)?;
        let entry = SampleEntry::parse(entry)?;

        if !matches!(&entry.format, b"mp4a" | b"alac") {
            return Err(Error::InvalidM4a("unsupported sample entry"));
        }

        let descriptor = Descriptor::new(
            // the media time scale is the sample rate for audio tracks
            mdhd.time_scale,
            entry.channels,
            ChannelMask::from_channels(entry.channels),
            entry.bits_per_sample.into(),
            mdhd.duration,
        )?;

        log::debug!(
            "M4A with {} channels, {} bps, {} Hz, {} frames",
            descriptor.channels,
            descriptor.bits_per_sample,
            descriptor.sample_rate,
            descriptor.total_frames,
        );

        let metadata = find(&atoms, &[b"moov", b"udta", b"meta", b"ilst"])
            .map(parse_ilst)
            .unwrap_or_default();

        Ok(Self {
            atoms,
            descriptor,
            metadata,
        })
    }

    /// The audio track's stream parameters
    #[inline]
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Metadata from the `ilst` atom
    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// All top-level atoms in order
    #[inline]
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }
}

const DATA_UTF8: u32 = 1;
const DATA_IMPLICIT: u32 = 0;

/// Converts an `ilst` atom to metadata
///
/// Items with no metadata field are ignored.
pub fn parse_ilst(ilst: &Atom) -> Metadata {
    let mut metadata = Metadata::default();

    for item in ilst.children() {
        let Some(data) = item.find(&[b"data"]).and_then(|a| a.data()) else {
            continue;
        };
        let Some(payload) = data.get(8..) else {
            continue;
        };

        match &item.id {
            b"trkn" | b"disk" => {
                let (number, total) = match &item.id {
                    b"trkn" => (MetaField::TrackNumber, MetaField::TrackTotal),
                    _ => (MetaField::AlbumNumber, MetaField::AlbumTotal),
                };
                if let [_, _, n0, n1, t0, t1, ..] = payload {
                    match u16::from_be_bytes([*n0, *n1]) {
                        0 => {}
                        n => metadata.set_number(number, n.into()),
                    }
                    match u16::from_be_bytes([*t0, *t1]) {
                        0 => {}
                        t => metadata.set_number(total, t.into()),
                    }
                }
            }
            id => {
                if let (Some(field), Ok(text)) = (
                    MetaField::ALL
                        .into_iter()
                        .find(|f| f.m4a_atom().as_ref() == Some(id)),
                    std::str::from_utf8(payload),
                ) {
                    metadata.set(field, text);
                }
            }
        }
    }

    metadata
}

/// Builds an `ilst` atom from metadata
///
/// Fields with no M4A atom are skipped.
pub fn build_ilst(metadata: &Metadata) -> Atom {
    fn data(kind: u32, payload: &[u8]) -> Atom {
        let mut data = Vec::with_capacity(8 + payload.len());
        data.extend(kind.to_be_bytes());
        data.extend([0; 4]); // locale
        data.extend(payload);
        Atom::leaf(*b"data", data)
    }

    let mut items = Vec::new();

    for field in MetaField::ALL {
        let Some(id) = field.m4a_atom() else {
            continue;
        };
        let item = match field {
            MetaField::TrackTotal | MetaField::AlbumTotal => continue,
            MetaField::TrackNumber | MetaField::AlbumNumber => {
                let total = match field {
                    MetaField::TrackNumber => MetaField::TrackTotal,
                    _ => MetaField::AlbumTotal,
                };
                let number = metadata.get_number(field);
                let total = metadata.get_number(total);
                if number.is_none() && total.is_none() {
                    continue;
                }
                let to_u16 = |n: Option<u32>| u16::try_from(n.unwrap_or(0)).unwrap_or(u16::MAX);

                let mut payload = vec![0, 0];
                payload.extend(to_u16(number).to_be_bytes());
                payload.extend(to_u16(total).to_be_bytes());
                if field == MetaField::TrackNumber {
                    payload.extend([0, 0]);
                }
                data(DATA_IMPLICIT, &payload)
            }
            field => match metadata.get(field) {
                Some(text) => data(DATA_UTF8, text.as_bytes()),
                None => continue,
            },
        };
        items.push(Atom::container(id, vec![item]));
    }

    Atom::container(*b"ilst", items)
}

/// Replaces the `ilst` atom of the M4A file at the given path
///
/// Items with no metadata field, such as cover art,
/// are carried over from the existing `ilst` atom.
/// Any missing `udta` or `meta` atoms are added to `moov`.
/// Because `moov` changes size, chunk offsets in `stco` and `co64`
/// atoms pointing past it are shifted to match.
/// The file is rebuilt in a temporary file
/// and renamed over the original.
pub fn update_metadata<P: AsRef<Path>>(path: P, metadata: &Metadata) -> Result<(), Error> {
    update_metadata_with(path, metadata, Options::default())
}

/// Replaces the `ilst` atom of the M4A file with the given options
pub fn update_metadata_with<P: AsRef<Path>>(
    path: P,
    metadata: &Metadata,
    options: Options,
) -> Result<(), Error> {
    let path = path.as_ref();
    let mut source = std::io::BufReader::new(std::fs::File::open(path)?);
    let mut atoms = M4aFile::new_with(source.by_ref(), options)?.atoms;

    let moov_index = atoms
        .iter()
        .position(|a| &a.id == b"moov")
        .ok_or(Error::InvalidM4a("moov atom not found"))?;
    let old_end = atoms[..=moov_index].iter().map(Atom::size).sum::<u64>();
    let old_size = atoms[moov_index].size();

    replace_ilst(&mut atoms[moov_index], metadata)?;

    let delta = i64::try_from(atoms[moov_index].size())
        .ok()
        .zip(i64::try_from(old_size).ok())
        .map(|(new, old)| new - old)
        .ok_or(Error::InvalidM4a("atom size too large"))?;

    if delta != 0 {
        log::debug!("moov atom resized by {delta} bytes");
        shift_chunk_offsets(&mut atoms[moov_index], old_end, delta, &mut source)?;
    }

    crate::swap::replace_file(path, |file| {
        let mut w = std::io::BufWriter::new(file);
        atoms
            .iter()
            .try_for_each(|atom| atom.build_from(&mut source, &mut w))?;
        w.flush().map_err(Error::Io)
    })
}

fn replace_ilst(moov: &mut Atom, metadata: &Metadata) -> Result<(), Error> {
    const INVALID: Error = Error::InvalidM4a("invalid udta atom");

    let meta = moov
        .child_or_insert_with(*b"udta", || Atom::container(*b"udta", vec![]))
        .ok_or(INVALID)?
        .child_or_insert_with(*b"meta", || Atom {
            id: *b"meta",
            body: AtomBody::Container {
                prefix: vec![0; 4],
                children: vec![Atom::leaf(
                    *b"hdlr",
                    b"\0\0\0\0\0\0\0\0mdirappl\0\0\0\0\0\0\0\0\0".to_vec(),
                )],
            },
        })
        .ok_or(INVALID)?;

    let ilst = meta
        .child_or_insert_with(*b"ilst", || Atom::container(*b"ilst", vec![]))
        .ok_or(INVALID)?;

    let mut new_ilst = build_ilst(metadata);
    if let AtomBody::Container { children, .. } = &mut new_ilst.body {
        children.extend(
            ilst.children()
                .iter()
                .filter(|item| {
                    !MetaField::ALL
                        .into_iter()
                        .any(|f| f.m4a_atom().as_ref() == Some(&item.id))
                })
                .cloned(),
        );
    }
    *ilst = new_ilst;

    Ok(())
}

// shifts chunk offsets at or beyond `after` by `delta` bytes
fn shift_chunk_offsets<R: Read + Seek>(
    atom: &mut Atom,
    after: u64,
    delta: i64,
    source: &mut R,
) -> Result<(), Error> {
    const INVALID: Error = Error::InvalidM4a("invalid chunk offset atom");

    let width = match &atom.id {
        b"stco" => 4,
        b"co64" => 8,
        _ => {
            return match &mut atom.body {
                AtomBody::Container { children, .. } => children
                    .iter_mut()
                    .try_for_each(|c| shift_chunk_offsets(c, after, delta, source)),
                _ => Ok(()),
            };
        }
    };

    if let AtomBody::Skipped { offset, size } = atom.body {
        let mut data = Vec::new();
        source.seek(SeekFrom::Start(offset))?;
        crate::swap::copy_exact(source.by_ref(), &mut data, size)?;
        atom.body = AtomBody::Leaf(data);
    }

    let AtomBody::Leaf(data) = &mut atom.body else {
        return Err(INVALID);
    };

    // version, flags and entry count
    let (header, entries) = data.split_at_mut_checked(8).ok_or(INVALID)?;
    let count = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let entries = count
        .checked_mul(width)
        .and_then(|len| entries.get_mut(..len))
        .ok_or(INVALID)?;

    for entry in entries.chunks_exact_mut(width) {
        let offset = match <[u8; 8]>::try_from(&entry[..]) {
            Ok(wide) => u64::from_be_bytes(wide),
            Err(_) => u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]).into(),
        };
        if offset < after {
            continue;
        }
        let shifted = offset.checked_add_signed(delta).ok_or(INVALID)?;
        if width == 8 {
            entry.copy_from_slice(&shifted.to_be_bytes());
        } else {
            entry.copy_from_slice(
                &u32::try_from(shifted)
                    .map_err(|_| Error::InvalidM4a("chunk offset too large for stco atom"))?
                    .to_be_bytes(),
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn mdhd_v1(time_scale: u32, duration: u64) -> Vec<u8> {
        let mut mdhd = vec![1, 0, 0, 0];
        mdhd.extend([0; 16]);
        mdhd.extend(time_scale.to_be_bytes());
        mdhd.extend(duration.to_be_bytes());
        mdhd.extend([0; 4]);
        mdhd
    }

    #[test]
    fn test_mdhd() {
        let mut v0 = vec![0, 0, 0, 0];
        v0.extend([0; 8]);
        v0.extend(48000u32.to_be_bytes());
        v0.extend(96000u32.to_be_bytes());
        v0.extend([0; 4]);
        assert_eq!(
            MediaHeader::parse(&v0).unwrap(),
            MediaHeader {
                time_scale: 48000,
                duration: 96000
            }
        );

        assert_eq!(
            MediaHeader::parse(&mdhd_v1(44100, 1 << 40)).unwrap(),
            MediaHeader {
                time_scale: 44100,
                duration: 1 << 40
            }
        );

        assert!(matches!(
            MediaHeader::parse(&v0[0..16]),
            Err(Error::InvalidM4a(_))
        ));
        assert!(matches!(
            MediaHeader::parse(&mdhd_v1(0, 1)),
            Err(Error::InvalidM4a(_))
        ));
        v0[0] = 2;
        assert!(matches!(
            MediaHeader::parse(&v0),
            Err(Error::InvalidM4a("unsupported mdhd version"))
        ));
    }

    #[test]
    fn test_atom_sizes() {
        let meta = Atom {
            id: *b"meta",
            body: AtomBody::Container {
                prefix: vec![0; 4],
                children: vec![build_ilst(&Metadata::default())],
            },
        };
        let udta = Atom::container(*b"udta", vec![meta, Atom::leaf(*b"free", vec![0; 5])]);
        assert_eq!(udta.size(), 8 + (8 + 4 + 8) + (8 + 5));

        let mut bytes = vec![];
        udta.build(&mut bytes).unwrap();
        assert_eq!(bytes.len() as u64, udta.size());
        assert_eq!(&bytes[0..8], &[0, 0, 0, 41, b'u', b'd', b't', b'a']);

        let len = bytes.len() as u64;
        let atoms = read_atoms(&mut Cursor::new(bytes), len, Options::default()).unwrap();
        assert_eq!(atoms, [udta]);
    }

    #[test]
    fn test_extended_sizes() {
        // 64-bit size
        let mut bytes = vec![0, 0, 0, 1, b'f', b'r', b'e', b'e'];
        bytes.extend(20u64.to_be_bytes());
        bytes.extend([1, 2, 3, 4]);
        // to end of parent
        bytes.extend([0, 0, 0, 0, b's', b'k', b'i', b'p', 5, 6]);

        let len = bytes.len() as u64;
        let atoms = read_atoms(&mut Cursor::new(bytes), len, Options::default()).unwrap();
        assert_eq!(
            atoms,
            [
                Atom::leaf(*b"free", vec![1, 2, 3, 4]),
                Atom::leaf(*b"skip", vec![5, 6]),
            ]
        );

        // a size larger than the parent
        let bytes = [0, 0, 0, 20, b'f', b'r', b'e', b'e', 0, 0];
        assert!(matches!(
            read_atoms(&mut Cursor::new(bytes), 10, Options::default()),
            Err(Error::InvalidM4a(_))
        ));
    }

    #[test]
    fn test_skipped_atoms() {
        let mdat = Atom::leaf(*b"mdat", vec![7; 100]);
        let mut bytes = vec![];
        mdat.build(&mut bytes).unwrap();

        let len = bytes.len() as u64;
        let mut source = Cursor::new(bytes.clone());
        let atoms = read_atoms(&mut source, len, Options::default().in_memory_limit(10)).unwrap();
        assert_eq!(
            atoms[0].body,
            AtomBody::Skipped {
                offset: 8,
                size: 100
            }
        );

        let mut rebuilt = vec![];
        atoms[0].build_from(&mut source, &mut rebuilt).unwrap();
        assert_eq!(rebuilt, bytes);
        assert!(atoms[0].build(&mut Vec::new()).is_err());
    }

    #[test]
    fn test_ilst() {
        let mut metadata = Metadata::default();
        metadata.set(MetaField::TrackName, "Title");
        metadata.set(MetaField::ArtistName, "Artist");
        metadata.set(MetaField::Isrc, "not in M4A");
        metadata.set_number(MetaField::TrackNumber, 3);
        metadata.set_number(MetaField::TrackTotal, 12);
        metadata.set_number(MetaField::AlbumTotal, 2);

        let ilst = build_ilst(&metadata);
        let trkn = ilst.find(&[b"trkn", b"data"]).unwrap().data().unwrap();
        assert_eq!(trkn, &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 3, 0, 12, 0, 0]);

        metadata.remove(MetaField::Isrc);
        assert_eq!(parse_ilst(&ilst), metadata);
    }

    #[test]
    fn test_nesting_depth() {
        let nested = |levels: usize| {
            (0..levels).fold(vec![], |inner: Vec<u8>, _| {
                let mut outer = (8 + inner.len() as u32).to_be_bytes().to_vec();
                outer.extend(b"moov");
                outer.extend(inner);
                outer
            })
        };

        let bytes = nested(5);
        let len = bytes.len() as u64;
        let atoms = read_atoms(&mut Cursor::new(bytes), len, Options::default()).unwrap();
        assert!(atoms[0].find(&[b"moov", b"moov", b"moov", b"moov"]).is_some());

        let bytes = nested(1_000);
        let len = bytes.len() as u64;
        assert!(matches!(
            read_atoms(&mut Cursor::new(bytes), len, Options::default()),
            Err(Error::InvalidM4a("atoms nested too deeply"))
        ));
    }

    #[test]
    fn test_shift_chunk_offsets() {
        let mut co64 = vec![0, 0, 0, 0, 0, 0, 0, 2];
        co64.extend(10u64.to_be_bytes());
        co64.extend((1u64 << 40).to_be_bytes());

        let mut stco = vec![0, 0, 0, 0, 0, 0, 0, 2];
        stco.extend(50u32.to_be_bytes());
        stco.extend(200u32.to_be_bytes());

        let mut stbl = Atom::container(
            *b"stbl",
            vec![Atom::leaf(*b"co64", co64), Atom::leaf(*b"stco", stco)],
        );
        shift_chunk_offsets(&mut stbl, 100, -20, &mut std::io::empty()).unwrap();

        let mut expected = vec![0, 0, 0, 0, 0, 0, 0, 2];
        expected.extend(10u64.to_be_bytes());
        expected.extend(((1u64 << 40) - 20).to_be_bytes());
        assert_eq!(stbl.find(&[b"co64"]).unwrap().data(), Some(expected.as_slice()));

        let mut expected = vec![0, 0, 0, 0, 0, 0, 0, 2];
        expected.extend(50u32.to_be_bytes());
        expected.extend(180u32.to_be_bytes());
        assert_eq!(stbl.find(&[b"stco"]).unwrap().data(), Some(expected.as_slice()));

        // 32-bit offsets cannot grow past 4 GiB
        let mut stco = vec![0, 0, 0, 0, 0, 0, 0, 1];
        stco.extend(u32::MAX.to_be_bytes());
        let mut stco = Atom::leaf(*b"stco", stco);
        assert!(shift_chunk_offsets(&mut stco, 0, 1, &mut std::io::empty()).is_err());

        // entry count larger than the atom
        let mut stco = Atom::leaf(*b"stco", vec![0, 0, 0, 0, 0, 0, 0, 9]);
        assert!(matches!(
            shift_chunk_offsets(&mut stco, 0, 1, &mut std::io::empty()),
            Err(Error::InvalidM4a("invalid chunk offset atom"))
        ));
    }

    #[test]
    fn test_not_m4a() {
        let mut bytes = vec![];
        Atom::leaf(*b"free", vec![]).build(&mut bytes).unwrap();
        assert!(matches!(
            M4aFile::new(Cursor::new(bytes)),
            Err(Error::InvalidM4a("not an M4A file"))
        ));

        let mut bytes = vec![];
        Atom::leaf(*b"ftyp", b"M4A ".to_vec()).build(&mut bytes).unwrap();
        assert!(matches!(
            M4aFile::new(Cursor::new(bytes)),
            Err(Error::InvalidM4a("moov atom not found"))
        ));
    }
}
