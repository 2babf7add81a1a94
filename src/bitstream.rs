// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Template-driven packed field reading and writing
//!
//! Fixed structures, such as container headers, are easiest
//! to describe as a list of [`Field`]s which a
//! [`BitstreamReader`] parses into a list of [`Value`]s,
//! and which a [`BitstreamWriter`] builds from the same list.
//!
//! ```
//! use audio_containers::bitstream::{BitstreamReader, BitstreamWriter, Field, Value};
//! use bitstream_io::BigEndian;
//!
//! let template = Field::template("4b 16u 4p 4s").unwrap();
//!
//! let mut reader = BitstreamReader::endian(
//!     [b'C', b'O', b'M', b'M', 0x00, 0x02, 0x0F].as_slice(),
//!     BigEndian,
//! );
//! let values = reader.parse(&template).unwrap();
//! assert_eq!(
//!     values,
//!     vec![
//!         Value::Bytes(b"COMM".to_vec()),
//!         Value::Unsigned(2),
//!         Value::Signed(-1),
//!     ],
//! );
//!
//! let mut writer = BitstreamWriter::endian(vec![], BigEndian);
//! writer.build(&template, &values).unwrap();
//! assert_eq!(
//!     writer.into_writer().unwrap(),
//!     [b'C', b'O', b'M', b'M', 0x00, 0x02, 0x0F],
//! );
//! ```

use crate::Error;
use crate::crc::{Checksum, CrcReader, CrcWriter};
use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};
use std::io::{Cursor, SeekFrom};

/// A single element of a parsing template
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Field {
    /// An unsigned integer of up to 64 bits
    Unsigned(u32),
    /// A two's complement signed integer of up to 64 bits
    Signed(u32),
    /// A run of raw bytes
    Bytes(usize),
    /// Bits to be skipped when reading, or zeroed when writing
    Skip(u32),
}

impl Field {
    /// Parses a compact template string
    ///
    /// Each whitespace-separated token is a count
    /// followed by a field type:
    ///
    /// | Suffix | Field |
    /// |-------:|-------|
    /// | `u` | unsigned integer of that many bits |
    /// | `s` | signed integer of that many bits |
    /// | `b` | that many raw bytes |
    /// | `p` | that many bits of padding |
    /// | `P` | that many bytes of padding |
    ///
    /// Returns `None` if any token is malformed.
    pub fn template(s: &str) -> Option<Vec<Field>> {
        s.split_whitespace()
            .map(|token| {
                let (last, _) = token.char_indices().last()?;
                let (count, kind) = token.split_at(last);
                match kind {
                    "u" => count.parse().ok().map(Field::Unsigned),
                    "s" => count.parse().ok().map(Field::Signed),
                    "b" => count.parse().ok().map(Field::Bytes),
                    "p" => count.parse().ok().map(Field::Skip),
                    "P" => count
                        .parse::<u32>()
                        .ok()
                        .and_then(|c| c.checked_mul(8))
                        .map(Field::Skip),
                    _ => None,
                }
            })
            .collect()
    }

    /// Total size of field, in bits
    pub fn bits(&self) -> u64 {
        match self {
            Self::Unsigned(bits) | Self::Signed(bits) | Self::Skip(bits) => u64::from(*bits),
            Self::Bytes(bytes) => *bytes as u64 * 8,
        }
    }

    /// Total size of template, in bits
    pub fn template_bits(template: &[Field]) -> u64 {
        template.iter().map(|f| f.bits()).sum()
    }
}

/// A value parsed from, or to be built into, a template field
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    /// An unsigned integer
    Unsigned(u64),
    /// A signed integer
    Signed(i64),
    /// Raw bytes
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns unsigned value, if any
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            Self::Unsigned(u) => Some(*u),
            _ => None,
        }
    }

    /// Returns signed value, if any
    pub fn as_signed(&self) -> Option<i64> {
        match self {
            Self::Signed(s) => Some(*s),
            _ => None,
        }
    }

    /// Returns bytes value, if any
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Self::Unsigned(u)
    }
}

impl From<i64> for Value {
    fn from(s: i64) -> Self {
        Self::Signed(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

/// A bit-granular reader with a fixed endianness
///
/// When the underlying stream is seekable,
/// positions may be pushed to a stack of marks
/// and returned to later.
/// Every [`BitstreamReader::mark`] should be balanced
/// by a [`BitstreamReader::unmark`].
pub struct BitstreamReader<R: std::io::Read, E: Endianness> {
    reader: BitReader<R, E>,
    marks: Vec<u64>,
}

impl<R: std::io::Read, E: Endianness> BitstreamReader<R, E> {
    /// Wraps reader in the given endianness
    pub fn endian(reader: R, endianness: E) -> Self {
        Self {
            reader: BitReader::endian(reader, endianness),
            marks: Vec::new(),
        }
    }

    /// Wraps reader in an endianness given by type
    pub fn new(reader: R) -> Self {
        Self {
            reader: BitReader::new(reader),
            marks: Vec::new(),
        }
    }

    /// Reads a single field
    ///
    /// Returns `None` for [`Field::Skip`] fields.
    pub fn parse_field(&mut self, field: Field) -> Result<Option<Value>, Error> {
        match field {
            Field::Unsigned(0) => Ok(Some(Value::Unsigned(0))),
            Field::Unsigned(bits @ 1..=64) => self
                .reader
                .read_unsigned_var::<u64>(bits)
                .map(|u| Some(Value::Unsigned(u)))
                .map_err(Error::from),
            Field::Signed(0) => Ok(Some(Value::Signed(0))),
            Field::Signed(bits @ 1..=64) => self
                .reader
                .read_signed_var::<i64>(bits)
                .map(|s| Some(Value::Signed(s)))
                .map_err(Error::from),
            Field::Unsigned(_) | Field::Signed(_) => Err(Error::TemplateMismatch),
            Field::Bytes(bytes) => {
                let mut buf = vec![0; bytes];
                self.reader.read_bytes(&mut buf)?;
                Ok(Some(Value::Bytes(buf)))
            }
            Field::Skip(bits) => self.skip_bits(bits).map(|()| None),
        }
    }

    /// Reads all the template's fields in order
    ///
    /// Skipped fields produce no value.
    /// Returns [`Error::Truncated`] if the stream ends
    /// before the template is satisfied.
    pub fn parse(&mut self, template: &[Field]) -> Result<Vec<Value>, Error> {
        template
            .iter()
            .filter_map(|field| self.parse_field(*field).transpose())
            .collect()
    }

    /// Parses a structure directly
    pub fn parse_with<F>(&mut self) -> Result<F, F::Error>
    where
        F: bitstream_io::FromBitStream,
    {
        self.reader.parse()
    }

    /// Skips the given number of bits
    pub fn skip_bits(&mut self, bits: u32) -> Result<(), Error> {
        self.reader.skip(bits).map_err(Error::from)
    }

    /// Skips the given number of bytes
    pub fn skip_bytes(&mut self, mut bytes: u64) -> Result<(), Error> {
        const MAX_SKIP: u64 = (u32::MAX / 8) as u64;

        while bytes > 0 {
            let to_skip = bytes.min(MAX_SKIP);
            self.reader.skip(to_skip as u32 * 8)?;
            bytes -= to_skip;
        }
        Ok(())
    }

    /// Reads exactly the given number of bytes
    pub fn read_bytes(&mut self, bytes: usize) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0; bytes];
        self.reader.read_bytes(&mut buf)?;
        Ok(buf)
    }

    /// Returns a new reader over the next `bytes` bytes
    ///
    /// Our reader is advanced past those bytes
    /// and the two readers share no further state.
    pub fn substream(&mut self, bytes: usize) -> Result<BitstreamReader<Cursor<Vec<u8>>, E>, Error> {
        self.read_bytes(bytes)
            .map(|buf| BitstreamReader::new(Cursor::new(buf)))
    }

    /// Whether the reader sits on a byte boundary
    #[inline]
    pub fn byte_aligned(&self) -> bool {
        self.reader.byte_aligned()
    }

    /// Discards bits up to the next byte boundary
    #[inline]
    pub fn byte_align(&mut self) {
        self.reader.byte_align()
    }

    /// Direct access to the underlying bit reader
    pub fn reader(&mut self) -> &mut BitReader<R, E> {
        &mut self.reader
    }

    /// Returns the underlying bit reader
    pub fn into_reader(self) -> BitReader<R, E> {
        if !self.marks.is_empty() {
            log::warn!("reader released with {} outstanding marks", self.marks.len());
        }
        self.reader
    }
}

impl<R: std::io::Read + std::io::Seek, E: Endianness> BitstreamReader<R, E> {
    /// Pushes the current position to the mark stack
    pub fn mark(&mut self) -> Result<(), Error> {
        let position = self.reader.position_in_bits()?;
        self.marks.push(position);
        Ok(())
    }

    /// Returns to the most recent mark without removing it
    pub fn rewind(&mut self) -> Result<(), Error> {
        let position = *self.marks.last().ok_or(Error::UnbalancedMark)?;
        self.reader.seek_bits(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Removes the most recent mark without returning to it
    pub fn unmark(&mut self) -> Result<(), Error> {
        self.marks.pop().map(|_| ()).ok_or(Error::UnbalancedMark)
    }

    /// Number of outstanding marks
    pub fn marks(&self) -> usize {
        self.marks.len()
    }

    /// Current position in the stream, in bits
    pub fn position_in_bits(&mut self) -> Result<u64, Error> {
        self.reader.position_in_bits().map_err(Error::from)
    }

    /// Current position in the stream, in whole bytes
    pub fn position(&mut self) -> Result<u64, Error> {
        self.position_in_bits().map(|bits| bits / 8)
    }
}

impl<R: std::io::Read, C: Checksum, E: Endianness> BitstreamReader<CrcReader<R, C>, E> {
    /// Running checksum of all bytes consumed so far
    ///
    /// Returns [`Error::UnalignedStream`] when mid-byte,
    /// since the current byte's bits are only partially consumed.
    pub fn checksum(&mut self) -> Result<C::Output, Error> {
        self.reader
            .reader()
            .map(|r| r.checksum().checksum())
            .ok_or(Error::UnalignedStream)
    }
}

/// A bit-granular writer with a fixed endianness
pub struct BitstreamWriter<W: std::io::Write, E: Endianness> {
    writer: BitWriter<W, E>,
}

impl<W: std::io::Write, E: Endianness> BitstreamWriter<W, E> {
    /// Wraps writer in the given endianness
    pub fn endian(writer: W, endianness: E) -> Self {
        Self {
            writer: BitWriter::endian(writer, endianness),
        }
    }

    /// Wraps writer in an endianness given by type
    pub fn new(writer: W) -> Self {
        Self {
            writer: BitWriter::new(writer),
        }
    }

    /// Writes a single non-skip field
    fn build_field(&mut self, field: Field, value: &Value) -> Result<(), Error> {
        match (field, value) {
            (Field::Unsigned(0), Value::Unsigned(0)) => Ok(()),
            (Field::Unsigned(bits @ 1..=64), Value::Unsigned(u)) => {
                if bits < 64 && (u >> bits) != 0 {
                    Err(Error::ValueOverflow { bits })
                } else {
                    self.writer
                        .write_unsigned_var(bits, *u)
                        .map_err(Error::Io)
                }
            }
            (Field::Unsigned(bits), Value::Unsigned(_)) => Err(Error::ValueOverflow { bits }),
            (Field::Signed(0), Value::Signed(0)) => Ok(()),
            (Field::Signed(bits @ 1..=64), Value::Signed(s)) => {
                let limit = 1i128 << (bits - 1);
                if (-limit..limit).contains(&i128::from(*s)) {
                    self.writer
                        .write_signed_var(bits, *s)
                        .map_err(Error::Io)
                } else {
                    Err(Error::ValueOverflow { bits })
                }
            }
            (Field::Signed(bits), Value::Signed(_)) => Err(Error::ValueOverflow { bits }),
            (Field::Bytes(bytes), Value::Bytes(b)) if b.len() == bytes => {
                self.writer.write_bytes(b).map_err(Error::Io)
            }
            _ => Err(Error::TemplateMismatch),
        }
    }

    /// Writes zero bits
    pub fn pad_bits(&mut self, mut bits: u32) -> Result<(), Error> {
        while bits > 0 {
            let to_write = bits.min(32);
            self.writer.write_unsigned_var::<u32>(to_write, 0)?;
            bits -= to_write;
        }
        Ok(())
    }

    /// Writes all the template's fields in order
    ///
    /// `values` holds one value per non-skip field.
    /// Returns [`Error::ValueOverflow`] if a value
    /// does not fit in its field, or [`Error::TemplateMismatch`]
    /// if the values do not line up with the template's fields.
    pub fn build(&mut self, template: &[Field], values: &[Value]) -> Result<(), Error> {
        let mut values = values.iter();

        for field in template {
            match field {
                Field::Skip(bits) => self.pad_bits(*bits)?,
                field => {
                    let value = values.next().ok_or(Error::TemplateMismatch)?;
                    self.build_field(*field, value)?;
                }
            }
        }

        match values.next() {
            None => Ok(()),
            Some(_) => Err(Error::TemplateMismatch),
        }
    }

    /// Builds a structure directly
    pub fn build_with<T>(&mut self, value: &T) -> Result<(), T::Error>
    where
        T: bitstream_io::ToBitStream,
    {
        self.writer.build(value)
    }

    /// Writes raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.writer.write_bytes(bytes).map_err(Error::Io)
    }

    /// Whether the writer sits on a byte boundary
    #[inline]
    pub fn byte_aligned(&self) -> bool {
        self.writer.byte_aligned()
    }

    /// Pads with zero bits up to the next byte boundary
    pub fn byte_align(&mut self) -> Result<(), Error> {
        self.writer.byte_align().map_err(Error::Io)
    }

    /// Direct access to the underlying bit writer
    pub fn writer(&mut self) -> &mut BitWriter<W, E> {
        &mut self.writer
    }

    /// Pads to a byte boundary and returns the underlying writer
    pub fn into_writer(mut self) -> Result<W, Error> {
        self.writer.byte_align()?;
        Ok(self.writer.into_writer())
    }
}

impl<W: std::io::Write, C: Checksum, E: Endianness> BitstreamWriter<CrcWriter<W, C>, E> {
    /// Running checksum of all bytes written so far
    ///
    /// Returns [`Error::UnalignedStream`] when mid-byte,
    /// since the current byte has not been written yet.
    pub fn checksum(&mut self) -> Result<C::Output, Error> {
        self.writer
            .writer()
            .map(|w| w.checksum().checksum())
            .ok_or(Error::UnalignedStream)
    }
}
