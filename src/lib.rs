// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A library for reading and rewriting audio container files
//! and the metadata tags embedded in them.
//!
//! Audio compression itself is not handled here.
//! Instead, this crate handles the containers which wrap
//! PCM or compressed audio, and does so bit-exactly,
//! so that rewriting a file's metadata never disturbs
//! its audio data, its foreign chunks, or its padding.
//!
//! # Containers
//!
//! | Format | Module | Structure |
//! |-------:|--------|-----------|
//! | AIFF | [`aiff`] | flat, big-endian [`chunk`]s |
//! | RIFF WAVE | [`wav`] | flat, little-endian [`chunk`]s |
//! | M4A | [`atom`] | nested atoms |
//! | Ogg | [`ogg`] | CRC-checked pages carrying packets |
//!
//! # Tags
//!
//! | Format | Module |
//! |-------:|--------|
//! | ID3v1 | [`id3v1`] |
//! | ID3v2 | [`id3v2`] |
//! | APEv2 | [`apev2`] |
//! | Vorbis Comment | [`vorbiscomment`] |
//!
//! All tag formats may be converted to and from the
//! format-independent [`metadata::Metadata`].

#![warn(missing_docs)]

pub mod aiff;
pub mod apev2;
pub mod atom;
pub mod audio;
pub mod bitstream;
pub mod byteorder;
pub mod chunk;
pub mod crc;
pub mod id3v1;
pub mod id3v2;
pub mod metadata;
pub mod ogg;
pub mod options;
pub mod process;
mod swap;
pub mod vorbiscomment;
pub mod wav;

pub use options::Options;

/// A possible error when reading or writing audio containers
#[derive(Debug)]
pub enum Error {
    /// A general I/O error from the underlying stream
    Io(std::io::Error),
    /// A UTF-8 formatting error
    Utf8(std::string::FromUtf8Error),
    /// The stream ended before a structure was fully read
    Truncated,
    /// An invalid AIFF file
    InvalidAiff(&'static str),
    /// An invalid RIFF WAVE file
    InvalidWave(&'static str),
    /// An invalid M4A file
    InvalidM4a(&'static str),
    /// An invalid Ogg stream
    InvalidOgg(&'static str),
    /// An invalid APEv2 tag
    InvalidApeTag(&'static str),
    /// An invalid ID3v1 tag
    InvalidId3v1(&'static str),
    /// An invalid ID3v2 tag
    InvalidId3v2(&'static str),
    /// A chunk or atom ID contains non-printable bytes
    InvalidChunkId([u8; 4]),
    /// A chunk's declared size runs past its container
    ChunkSizeMismatch,
    /// A stored checksum does not match the calculated one
    ChecksumMismatch,
    /// A channel mask does not fit the stream's channel count
    /// or cannot be stored in the container
    InvalidChannelMask,
    /// A value does not fit in its field's width
    ValueOverflow {
        /// The field's width, in bits
        bits: u32,
    },
    /// Values do not match the shape of their template
    TemplateMismatch,
    /// A byte-level operation was attempted mid-byte
    UnalignedStream,
    /// A mark was popped from an empty mark stack
    UnbalancedMark,
    /// PCM parameters do not match the stream being written
    PcmMismatch,
    /// An error occurred when writing an output file
    Encoding(String),
    /// An external decoder failed
    Decoding(String),
}

impl Error {
    /// Converts any error into an encoding error
    ///
    /// Writers use this so that a failure anywhere
    /// in the process of building an output file
    /// is reported as that output file failing to encode,
    /// regardless of which collaborator failed.
    pub fn into_encoding(self) -> Self {
        match self {
            e @ Self::Encoding(_) => e,
            Self::Decoding(reason) => Self::Encoding(reason),
            other => Self::Encoding(other.to_string()),
        }
    }

    /// Whether the error indicates a truncated stream
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::Truncated,
            _ => Self::Io(error),
        }
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(error: std::string::FromUtf8Error) -> Self {
        Self::Utf8(error)
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
            Self::Truncated => "stream ended prematurely".fmt(f),
            Self::InvalidAiff(reason) => reason.fmt(f),
            Self::InvalidWave(reason) => reason.fmt(f),
            Self::InvalidM4a(reason) => reason.fmt(f),
            Self::InvalidOgg(reason) => reason.fmt(f),
            Self::InvalidApeTag(reason) => reason.fmt(f),
            Self::InvalidId3v1(reason) => reason.fmt(f),
            Self::InvalidId3v2(reason) => reason.fmt(f),
            Self::InvalidChunkId(id) => write!(f, "invalid chunk ID {id:02X?}"),
            Self::ChunkSizeMismatch => "chunk size exceeds container size".fmt(f),
            Self::ChecksumMismatch => "checksum mismatch".fmt(f),
            Self::InvalidChannelMask => "unsupported channel mask".fmt(f),
            Self::ValueOverflow { bits } => write!(f, "value too large for {bits}-bit field"),
            Self::TemplateMismatch => "values do not match template".fmt(f),
            Self::UnalignedStream => "stream is not byte-aligned".fmt(f),
            Self::UnbalancedMark => "no mark to remove".fmt(f),
            Self::PcmMismatch => "PCM parameters do not match output stream".fmt(f),
            Self::Encoding(reason) => reason.fmt(f),
            Self::Decoding(reason) => reason.fmt(f),
        }
    }
}

/// How a tag update was applied to its file
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UpdateStrategy {
    /// Tag overwritten at its old position
    InPlace,
    /// Tag added where there was none
    Appended,
    /// Whole file rewritten around the new tag
    Rewritten,
}
