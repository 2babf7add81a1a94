// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Format-independent track metadata
//!
//! Every tag format stores the same handful of fields
//! under its own names.
//! [`MetaField`] enumerates those fields and
//! maps each to its name in every format.
//!
//! | Field | Vorbis | APEv2 | ID3v2 | M4A |
//! |------:|--------|-------|-------|-----|
//! | track name | `TITLE` | `Title` | `TIT2` | `©nam` |
//! | track number | `TRACKNUMBER` | `Track` | `TRCK` | `trkn` |
//! | track total | `TRACKTOTAL` | `Track` | `TRCK` | `trkn` |
//! | album name | `ALBUM` | `Album` | `TALB` | `©alb` |
//! | artist name | `ARTIST` | `Artist` | `TPE1` | `©ART` |
//! | performer name | `PERFORMER` | `Performer` | `TPE2` | |
//! | composer name | `COMPOSER` | `Composer` | `TCOM` | `©wrt` |
//! | conductor name | `CONDUCTOR` | `Conductor` | `TPE3` | |
//! | media | `SOURCE MEDIUM` | `Media` | `TMED` | |
//! | ISRC | `ISRC` | `ISRC` | `TSRC` | |
//! | catalog | `CATALOG` | `Catalog` | | |
//! | copyright | `COPYRIGHT` | `Copyright` | `TCOP` | `cprt` |
//! | publisher | `PUBLISHER` | `Publisher` | `TPUB` | |
//! | year | `YEAR` | `Year` | `TYER` | `©day` |
//! | date | `DATE` | `Record Date` | `TDRC` | |
//! | album number | `DISCNUMBER` | `Disc` | `TPOS` | `disk` |
//! | album total | `DISCTOTAL` | `Disc` | `TPOS` | `disk` |
//! | comment | `COMMENT` | `Comment` | `COMM` | `©cmt` |

use crate::apev2::{ApeItem, ApeTag};
use crate::id3v1::Id3v1Tag;
use crate::id3v2::Id3v2Tag;
use crate::vorbiscomment::VorbisComment;
use std::collections::BTreeMap;

/// A format-independent metadata field
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum MetaField {
    /// Name of the track
    TrackName,
    /// Track's number within its album
    TrackNumber,
    /// Total tracks in album
    TrackTotal,
    /// Name of the album
    AlbumName,
    /// Track's artist
    ArtistName,
    /// Track's performer
    PerformerName,
    /// Track's composer
    ComposerName,
    /// Track's conductor
    ConductorName,
    /// Original source media
    Media,
    /// International Standard Recording Code
    Isrc,
    /// Album catalog number
    Catalog,
    /// Copyright notice
    Copyright,
    /// Publisher name
    Publisher,
    /// Release year
    Year,
    /// Recording date
    Date,
    /// Album's number within a multi-disc set
    AlbumNumber,
    /// Total albums in set
    AlbumTotal,
    /// Freeform comment
    Comment,
}

impl MetaField {
    /// All fields, in order
    pub const ALL: [Self; 18] = [
        Self::TrackName,
        Self::TrackNumber,
        Self::TrackTotal,
        Self::AlbumName,
        Self::ArtistName,
        Self::PerformerName,
        Self::ComposerName,
        Self::ConductorName,
        Self::Media,
        Self::Isrc,
        Self::Catalog,
        Self::Copyright,
        Self::Publisher,
        Self::Year,
        Self::Date,
        Self::AlbumNumber,
        Self::AlbumTotal,
        Self::Comment,
    ];

    /// Whether the field holds a number
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::TrackNumber | Self::TrackTotal | Self::AlbumNumber | Self::AlbumTotal
        )
    }

    /// Vorbis comment keys, with the preferred key first
    /// followed by any aliases recognized when reading
    pub fn vorbis_keys(self) -> &'static [&'static str] {
        match self {
            Self::TrackName => &["TITLE"],
            Self::TrackNumber => &["TRACKNUMBER"],
            Self::TrackTotal => &["TRACKTOTAL", "TOTALTRACKS"],
            Self::AlbumName => &["ALBUM"],
            Self::ArtistName => &["ARTIST"],
            Self::PerformerName => &["PERFORMER"],
            Self::ComposerName => &["COMPOSER"],
            Self::ConductorName => &["CONDUCTOR"],
            Self::Media => &["SOURCE MEDIUM"],
            Self::Isrc => &["ISRC"],
            Self::Catalog => &["CATALOG"],
            Self::Copyright => &["COPYRIGHT"],
            Self::Publisher => &["PUBLISHER"],
            Self::Year => &["YEAR"],
            Self::Date => &["DATE"],
            Self::AlbumNumber => &["DISCNUMBER"],
            Self::AlbumTotal => &["DISCTOTAL", "TOTALDISCS"],
            Self::Comment => &["COMMENT", "DESCRIPTION"],
        }
    }

    /// APEv2 item key
    ///
    /// Numbers and totals share a single `number/total` item.
    pub fn ape_key(self) -> &'static str {
        match self {
            Self::TrackName => "Title",
            Self::TrackNumber | Self::TrackTotal => "Track",
            Self::AlbumName => "Album",
            Self::ArtistName => "Artist",
            Self::PerformerName => "Performer",
            Self::ComposerName => "Composer",
            Self::ConductorName => "Conductor",
            Self::Media => "Media",
            Self::Isrc => "ISRC",
            Self::Catalog => "Catalog",
            Self::Copyright => "Copyright",
            Self::Publisher => "Publisher",
            Self::Year => "Year",
            Self::Date => "Record Date",
            Self::AlbumNumber | Self::AlbumTotal => "Disc",
            Self::Comment => "Comment",
        }
    }

    /// ID3v2 frame IDs, with the preferred ID first, if any
    ///
    /// Numbers and totals share a single `number/total` frame.
    pub fn id3v2_frames(self) -> &'static [&'static str] {
        match self {
            Self::TrackName => &["TIT2"],
            Self::TrackNumber | Self::TrackTotal => &["TRCK"],
            Self::AlbumName => &["TALB"],
            Self::ArtistName => &["TPE1"],
            Self::PerformerName => &["TPE2"],
            Self::ComposerName => &["TCOM"],
            Self::ConductorName => &["TPE3"],
            Self::Media => &["TMED"],
            Self::Isrc => &["TSRC"],
            Self::Catalog => &[],
            Self::Copyright => &["TCOP"],
            Self::Publisher => &["TPUB"],
            Self::Year => &["TYER"],
            Self::Date => &["TDRC"],
            Self::AlbumNumber | Self::AlbumTotal => &["TPOS"],
            Self::Comment => &["COMM"],
        }
    }

    /// M4A `ilst` atom ID, if any
    pub fn m4a_atom(self) -> Option<[u8; 4]> {
        match self {
            Self::TrackName => Some(*b"\xA9nam"),
            Self::TrackNumber | Self::TrackTotal => Some(*b"trkn"),
            Self::AlbumName => Some(*b"\xA9alb"),
            Self::ArtistName => Some(*b"\xA9ART"),
            Self::ComposerName => Some(*b"\xA9wrt"),
            Self::Copyright => Some(*b"cprt"),
            Self::Year => Some(*b"\xA9day"),
            Self::AlbumNumber | Self::AlbumTotal => Some(*b"disk"),
            Self::Comment => Some(*b"\xA9cmt"),
            _ => None,
        }
    }

    // totals stored in the same item as their number
    fn is_total(self) -> bool {
        matches!(self, Self::TrackTotal | Self::AlbumTotal)
    }

    // for fields sharing a "number/total" value,
    // the number and total fields
    fn pair(self) -> Option<(Self, Self)> {
        match self {
            Self::TrackNumber | Self::TrackTotal => Some((Self::TrackNumber, Self::TrackTotal)),
            Self::AlbumNumber | Self::AlbumTotal => Some((Self::AlbumNumber, Self::AlbumTotal)),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetaField {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::TrackName => "track name".fmt(f),
            Self::TrackNumber => "track number".fmt(f),
            Self::TrackTotal => "track total".fmt(f),
            Self::AlbumName => "album name".fmt(f),
            Self::ArtistName => "artist name".fmt(f),
            Self::PerformerName => "performer name".fmt(f),
            Self::ComposerName => "composer name".fmt(f),
            Self::ConductorName => "conductor name".fmt(f),
            Self::Media => "media".fmt(f),
            Self::Isrc => "ISRC".fmt(f),
            Self::Catalog => "catalog".fmt(f),
            Self::Copyright => "copyright".fmt(f),
            Self::Publisher => "publisher".fmt(f),
            Self::Year => "year".fmt(f),
            Self::Date => "date".fmt(f),
            Self::AlbumNumber => "album number".fmt(f),
            Self::AlbumTotal => "album total".fmt(f),
            Self::Comment => "comment".fmt(f),
        }
    }
}

/// Parses a `number/total` style value
///
/// Either half may be missing, and a 0 is treated as missing.
///
/// ```
/// use audio_containers::metadata::parse_number_pair;
///
/// assert_eq!(parse_number_pair("3/12"), (Some(3), Some(12)));
/// assert_eq!(parse_number_pair(" 3 "), (Some(3), None));
/// assert_eq!(parse_number_pair("0/12"), (None, Some(12)));
/// assert_eq!(parse_number_pair("three"), (None, None));
/// ```
pub fn parse_number_pair(value: &str) -> (Option<u32>, Option<u32>) {
    fn number(s: &str) -> Option<u32> {
        s.trim().parse().ok().filter(|n| *n != 0)
    }

    match value.split_once('/') {
        Some((n, total)) => (number(n), number(total)),
        None => (number(value), None),
    }
}

fn build_number_pair(number: Option<u32>, total: Option<u32>) -> Option<String> {
    match (number, total) {
        (None, None) => None,
        (Some(n), None) => Some(n.to_string()),
        (n, Some(t)) => Some(format!("{}/{t}", n.unwrap_or(0))),
    }
}

/// Track metadata independent of any tag format
///
/// Numeric fields are stored as numbers,
/// while all others are stored as text.
///
/// # Example
///
/// ```
/// use audio_containers::metadata::{Metadata, MetaField, Tag};
/// use audio_containers::vorbiscomment::VorbisComment;
///
/// let mut comment = VorbisComment::default();
/// comment.insert("TITLE", "Track Title");
/// comment.insert("TRACKNUMBER", "3/12");
///
/// let mut metadata = Metadata::from(&comment);
/// assert_eq!(metadata.get(MetaField::TrackName), Some("Track Title"));
/// assert_eq!(metadata.get_number(MetaField::TrackNumber), Some(3));
/// assert_eq!(metadata.get_number(MetaField::TrackTotal), Some(12));
///
/// metadata.set(MetaField::AlbumName, "Album Name");
/// comment.update_from(&metadata);
/// assert_eq!(comment.get("ALBUM"), Some("Album Name"));
/// assert_eq!(comment.get("TRACKTOTAL"), Some("12"));
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Metadata {
    fields: BTreeMap<MetaField, String>,
}

impl Metadata {
    /// Returns the field's value, if any
    pub fn get(&self, field: MetaField) -> Option<&str> {
        self.fields.get(&field).map(|s| s.as_str())
    }

    /// Returns numeric field's value, if any
    pub fn get_number(&self, field: MetaField) -> Option<u32> {
        self.get(field).and_then(|s| s.parse().ok())
    }

    /// Sets the field's value
    ///
    /// Numeric fields whose values are not positive numbers
    /// are removed instead.
    pub fn set<S: Into<String>>(&mut self, field: MetaField, value: S) {
        let value = value.into();
        if field.is_numeric() {
            match parse_number_pair(&value).0 {
                Some(n) => self.set_number(field, n),
                None => self.remove(field),
            }
        } else {
            self.fields.insert(field, value);
        }
    }

    /// Sets numeric field's value
    pub fn set_number(&mut self, field: MetaField, value: u32) {
        self.fields.insert(field, value.to_string());
    }

    /// Removes the field's value
    pub fn remove(&mut self, field: MetaField) {
        self.fields.remove(&field);
    }

    /// Iterates over all populated fields in order
    pub fn iter(&self) -> impl Iterator<Item = (MetaField, &str)> {
        self.fields.iter().map(|(f, v)| (*f, v.as_str()))
    }

    /// Whether no fields are populated
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    // populates field from a raw value,
    // splitting a number/total pair into both fields
    fn set_raw(&mut self, field: MetaField, value: &str) {
        match field.pair() {
            Some((number, total)) if field == number => {
                let (n, t) = parse_number_pair(value);
                if let Some(n) = n {
                    self.set_number(number, n);
                }
                if let Some(t) = t {
                    self.set_number(total, t);
                }
            }
            _ if !value.is_empty() => self.set(field, value),
            _ => {}
        }
    }

    // the combined number/total value for a paired field
    fn pair_value(&self, field: MetaField) -> Option<String> {
        field
            .pair()
            .and_then(|(n, t)| build_number_pair(self.get_number(n), self.get_number(t)))
    }
}

/// A tag which can be populated from [`Metadata`]
pub trait Tag {
    /// Replaces the tag's fields with those of the metadata
    ///
    /// Fields missing from the metadata are removed from the tag.
    /// Anything the metadata does not cover is left as-is.
    fn update_from(&mut self, metadata: &Metadata);
}

impl From<&VorbisComment> for Metadata {
    fn from(comment: &VorbisComment) -> Self {
        let mut metadata = Self::default();
        for field in MetaField::ALL {
            if let Some(value) = field.vorbis_keys().iter().find_map(|k| comment.get(k)) {
                metadata.set_raw(field, value);
            }
        }
        metadata
    }
}

impl Tag for VorbisComment {
    fn update_from(&mut self, metadata: &Metadata) {
        for field in MetaField::ALL {
            let [key, aliases @ ..] = field.vorbis_keys() else {
                continue;
            };
            aliases.iter().for_each(|alias| self.remove(alias));
            match metadata.get(field) {
                Some(value) => self.set(key, value),
                None => self.remove(key),
            }
        }
    }
}

impl From<&ApeTag> for Metadata {
    fn from(tag: &ApeTag) -> Self {
        let mut metadata = Self::default();
        for field in MetaField::ALL.into_iter().filter(|f| !f.is_total()) {
            if let Some(value) = tag.get_text(field.ape_key()) {
                metadata.set_raw(field, value);
            }
        }
        metadata
    }
}

impl Tag for ApeTag {
    fn update_from(&mut self, metadata: &Metadata) {
        for field in MetaField::ALL {
            let value = match field.pair() {
                Some(_) => metadata.pair_value(field),
                None => metadata.get(field).map(|s| s.to_owned()),
            };
            match value.map(|v| ApeItem::text(field.ape_key(), v)) {
                Some(Ok(item)) => self.insert(item),
                Some(Err(_)) | None => self.remove(field.ape_key()),
            }
        }
    }
}

impl From<&Id3v1Tag> for Metadata {
    fn from(tag: &Id3v1Tag) -> Self {
        let mut metadata = Self::default();
        for (field, value) in [
            (MetaField::TrackName, &tag.title),
            (MetaField::ArtistName, &tag.artist),
            (MetaField::AlbumName, &tag.album),
            (MetaField::Year, &tag.year),
            (MetaField::Comment, &tag.comment),
        ] {
            if !value.is_empty() {
                metadata.set(field, value.as_str());
            }
        }
        if let Some(track) = tag.track {
            metadata.set_number(MetaField::TrackNumber, track.into());
        }
        metadata
    }
}

impl Tag for Id3v1Tag {
    fn update_from(&mut self, metadata: &Metadata) {
        let text = |field| metadata.get(field).unwrap_or_default().to_owned();

        self.title = text(MetaField::TrackName);
        self.artist = text(MetaField::ArtistName);
        self.album = text(MetaField::AlbumName);
        self.year = text(MetaField::Year);
        self.comment = text(MetaField::Comment);
        self.track = metadata
            .get_number(MetaField::TrackNumber)
            .and_then(|n| u8::try_from(n).ok());
    }
}

impl From<&Id3v2Tag> for Metadata {
    fn from(tag: &Id3v2Tag) -> Self {
        let mut metadata = Self::default();
        for field in MetaField::ALL.into_iter().filter(|f| !f.is_total()) {
            let value = match field {
                MetaField::Comment => tag.comment(),
                field => field.id3v2_frames().iter().find_map(|id| tag.get_text(id)),
            };
            if let Some(value) = value {
                metadata.set_raw(field, value);
            }
        }
        metadata
    }
}

impl Tag for Id3v2Tag {
    fn update_from(&mut self, metadata: &Metadata) {
        for field in MetaField::ALL {
            let [id, ..] = field.id3v2_frames() else {
                continue;
            };
            let value = match field.pair() {
                Some(_) => metadata.pair_value(field),
                None => metadata.get(field).map(|s| s.to_owned()),
            };
            match (field, value) {
                (MetaField::Comment, Some(value)) => self.set_comment(value),
                (_, Some(value)) => self.set_text(id, value),
                (_, None) => self.remove(id),
            }
        }
    }
}
