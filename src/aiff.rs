// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For reading and writing AIFF files
//!
//! AIFF files are a big-endian `FORM` [`chunk`](crate::chunk) container
//! which must hold a `COMM` chunk describing the stream
//! and an `SSND` chunk holding its signed PCM samples.
//!
//! # Example
//!
//! ```
//! use audio_containers::aiff::{AiffReader, AiffWriter};
//! use audio_containers::audio::{Channel, ChannelMask, Frame, PcmReader};
//! use std::io::Cursor;
//!
//! let mut file = Cursor::new(vec![]);
//! let mut writer = AiffWriter::new(
//!     &mut file,
//!     44100,
//!     2,
//!     ChannelMask::from_channels(2),
//!     16,
//! ).unwrap();
//! writer.write(&Frame::from_interleaved(2, 16, &[1, -1, 2, -2, 3, -3])).unwrap();
//! writer.finalize().unwrap();
//!
//! let reader = AiffReader::new(Cursor::new(file.into_inner())).unwrap();
//! assert_eq!(reader.total_frames(), 3);
//! assert_eq!(
//!     reader.channel_mask(),
//!     [Channel::FrontLeft, Channel::FrontRight].into_iter().collect(),
//! );
//!
//! let mut pcm = reader.to_pcm().unwrap();
//! let frame = pcm.read(4096).unwrap();
//! assert_eq!(frame.channel(0), &[1, 2, 3]);
//! assert_eq!(frame.channel(1), &[-1, -2, -3]);
//! assert!(pcm.read(4096).unwrap().is_empty());
//! ```

use crate::audio::{Channel, ChannelMask, Descriptor, Frame, PcmReader};
use crate::bitstream::{BitstreamReader, BitstreamWriter, Field, Value};
use crate::byteorder::{BigEndian, Signedness};
use crate::chunk::{Chunk, ChunkId, Chunks, Form};
use crate::{Error, Options};
use bitstream_io::{ByteRead, ByteReader, ByteWrite, ByteWriter};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// COMM fields common to AIFF and AIFF-C,
/// with the sample rate as sign, exponent and mantissa
const COMM: [Field; 6] = [
    Field::Unsigned(16),
    Field::Unsigned(32),
    Field::Unsigned(16),
    Field::Unsigned(1),
    Field::Unsigned(15),
    Field::Unsigned(64),
];

/// Size of an AIFF COMM chunk body
const COMM_SIZE: u32 = 18;

/// Parses an 80-bit IEEE 754 extended precision value
///
/// An exponent of 0 is treated as zero
/// and an exponent of 0x7FFF as infinity.
///
/// ```
/// use audio_containers::aiff::parse_ieee_extended;
///
/// assert_eq!(
///     parse_ieee_extended([0x40, 0x0E, 0xAC, 0x44, 0, 0, 0, 0, 0, 0]),
///     44100.0,
/// );
/// ```
pub fn parse_ieee_extended(bytes: [u8; 10]) -> f64 {
    let [s0, s1, mantissa @ ..] = bytes;
    let sign_exponent = u16::from_be_bytes([s0, s1]);
    ieee_extended(
        sign_exponent & 0x8000 != 0,
        sign_exponent & 0x7FFF,
        u64::from_be_bytes(mantissa),
    )
}

fn ieee_extended(sign: bool, exponent: u16, mantissa: u64) -> f64 {
    let value = match exponent {
        0 => 0.0,
        0x7FFF => f64::INFINITY,
        exponent => (mantissa as f64 / 2.0f64.powi(63)) * 2.0f64.powi(i32::from(exponent) - 16383),
    };

    if sign { -value } else { value }
}

/// Builds an 80-bit IEEE 754 extended precision value
///
/// ```
/// use audio_containers::aiff::build_ieee_extended;
///
/// assert_eq!(
///     build_ieee_extended(44100.0),
///     [0x40, 0x0E, 0xAC, 0x44, 0, 0, 0, 0, 0, 0],
/// );
/// ```
pub fn build_ieee_extended(value: f64) -> [u8; 10] {
    let (sign, exponent, mantissa) = ieee_extended_parts(value);

    let mut bytes = [0; 10];
    bytes[0..2].copy_from_slice(&(u16::from(sign) << 15 | exponent).to_be_bytes());
    bytes[2..10].copy_from_slice(&mantissa.to_be_bytes());
    bytes
}

fn ieee_extended_parts(value: f64) -> (bool, u16, u64) {
    let bits = value.to_bits();
    let sign = bits >> 63 != 0;

    if value == 0.0 || value.is_nan() {
        (sign, 0, 0)
    } else if value.is_infinite() {
        (sign, 0x7FFF, 0)
    } else {
        let exponent = ((bits >> 52) & 0x7FF) as i32;
        let fraction = bits & ((1 << 52) - 1);

        // normalize so the explicit integer bit is set
        let (exponent, significand) = match exponent {
            0 => {
                let shift = fraction.leading_zeros() - 11;
                (-1022 - shift as i32, fraction << shift)
            }
            exponent => (exponent - 1023, fraction | (1 << 52)),
        };

        (sign, (exponent + 16383) as u16, significand << 11)
    }
}

/// AIFF's speaker assignment for the given channel count
///
/// Returns the channel mask along with the order
/// in which AIFF's physical channels are rearranged
/// to match the mask's channel order, if any.
fn aiff_channels(channels: u16) -> (ChannelMask, Option<&'static [usize]>) {
    use Channel::*;

    match channels {
        1 => ([FrontCenter].into_iter().collect(), None),
        2 => ([FrontLeft, FrontRight].into_iter().collect(), None),
        // left, right, center
        3 => (
            [FrontLeft, FrontRight, FrontCenter].into_iter().collect(),
            Some(&[0, 1, 2]),
        ),
        // left, center, right, surround
        4 => (
            [FrontLeft, FrontRight, FrontCenter, BackCenter]
                .into_iter()
                .collect(),
            Some(&[0, 2, 1, 3]),
        ),
        // left, left center, center, right, right center, surround
        6 => (
            [
                FrontLeft,
                FrontRight,
                FrontCenter,
                BackCenter,
                SideLeft,
                SideRight,
            ]
            .into_iter()
            .collect(),
            Some(&[0, 3, 2, 5, 1, 4]),
        ),
        _ => (ChannelMask::UNDEFINED, None),
    }
}

/// Inverts a channel rearrangement
fn invert(order: &[usize]) -> Vec<usize> {
    let mut inverted = vec![0; order.len()];
    for (i, o) in order.iter().enumerate() {
        inverted[*o] = i;
    }
    inverted
}

/// A parsed COMM chunk
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Comm {
    /// Channel count
    pub channels: u16,
    /// Total PCM frames
    pub total_frames: u32,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Sample rate, in Hz
    pub sample_rate: u32,
}

impl Comm {
    /// Parses COMM chunk body
    ///
    /// AIFF-C bodies must indicate uncompressed big-endian samples.
    pub fn parse(body: &[u8], form_type: ChunkId) -> Result<Self, Error> {
        let mut r = BitstreamReader::endian(body, bitstream_io::BigEndian);

        let values = r
            .parse(&COMM)
            .map_err(|_| Error::InvalidAiff("invalid COMM chunk"))?
            .iter()
            .filter_map(Value::as_unsigned)
            .collect::<Vec<_>>();

        let [channels, total_frames, bits_per_sample, sign, exponent, mantissa] =
            values.as_slice()
        else {
            return Err(Error::TemplateMismatch);
        };

        if form_type == ChunkId::AIFC {
            match r.read_bytes(4) {
                Ok(compression) if compression == b"NONE" => {}
                Ok(_) => return Err(Error::InvalidAiff("unsupported AIFF-C compression")),
                Err(_) => return Err(Error::InvalidAiff("invalid COMM chunk")),
            }
        }

        let sample_rate = match ieee_extended(*sign != 0, *exponent as u16, *mantissa) {
            rate if rate == 0.0 => return Err(Error::InvalidAiff("zero sample rate")),
            rate if rate.is_infinite() => return Err(Error::InvalidAiff("infinite sample rate")),
            rate if rate.fract() == 0.0 && (1.0..=f64::from(u32::MAX)).contains(&rate) => {
                rate as u32
            }
            _ => return Err(Error::InvalidAiff("invalid sample rate")),
        };

        Ok(Self {
            channels: *channels as u16,
            total_frames: *total_frames as u32,
            bits_per_sample: *bits_per_sample as u16,
            sample_rate,
        })
    }

    /// Builds an AIFF COMM chunk
    pub fn build(&self) -> Result<Chunk, Error> {
        let (sign, exponent, mantissa) = ieee_extended_parts(f64::from(self.sample_rate));

        let mut w = BitstreamWriter::endian(Vec::with_capacity(COMM_SIZE as usize), bitstream_io::BigEndian);
        w.build(
            &COMM,
            &[
                Value::Unsigned(self.channels.into()),
                Value::Unsigned(self.total_frames.into()),
                Value::Unsigned(self.bits_per_sample.into()),
                Value::Unsigned(sign.into()),
                Value::Unsigned(exponent.into()),
                Value::Unsigned(mantissa),
            ],
        )?;

        Chunk::new(ChunkId::COMM, w.into_writer()?)
    }
}

/// Location of PCM data within the SSND chunk
#[derive(Copy, Clone, Debug)]
struct Ssnd {
    // absolute offset of first PCM byte
    offset: u64,
    // total PCM bytes
    size: u64,
}

/// An AIFF file reader
pub struct AiffReader<R> {
    reader: R,
    form_type: ChunkId,
    descriptor: Descriptor,
    chunks: Vec<Chunk>,
    ssnd: Ssnd,
}

impl AiffReader<std::io::BufReader<std::fs::File>> {
    /// Opens AIFF file from the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::open_with(path, Options::default())
    }

    /// Opens AIFF file with the given options
    pub fn open_with<P: AsRef<Path>>(path: P, options: Options) -> Result<Self, Error> {
        Self::from_chunks(Chunks::open(path, options)?)
    }
}

impl<R: Read + Seek> AiffReader<R> {
    /// Reads AIFF file from the given stream
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is not an AIFF file
    /// or if its `COMM` or `SSND` chunks are missing or invalid.
    pub fn new(reader: R) -> Result<Self, Error> {
        Self::from_chunks(Chunks::new(reader, Options::default())?)
    }

    fn from_chunks(mut chunks: Chunks<R, Form>) -> Result<Self, Error> {
        let form_type = chunks.header().form_type;
        let all = chunks.by_ref().collect::<Result<Vec<_>, _>>()?;
        let mut reader = chunks.into_reader();

        let comm = match all
            .iter()
            .filter(|c| c.id == ChunkId::COMM)
            .collect::<Vec<_>>()
            .as_slice()
        {
            [] => return Err(Error::InvalidAiff("COMM chunk not found")),
            [comm] => Comm::parse(&comm.data()?, form_type)?,
            _ => return Err(Error::InvalidAiff("multiple COMM chunks")),
        };

        let ssnd = all
            .iter()
            .find(|c| c.id == ChunkId::SSND)
            .ok_or(Error::InvalidAiff("SSND chunk not found"))?;

        let ssnd = {
            let chunk_offset = ssnd
                .data
                .offset()
                .ok_or(Error::InvalidAiff("invalid SSND chunk"))?;
            reader.seek(SeekFrom::Start(chunk_offset))?;
            let mut r = ByteReader::endian(reader.by_ref(), bitstream_io::BigEndian);
            let offset = r.read::<u32>()?;
            let _block_size = r.read::<u32>()?;
            if offset != 0 {
                log::warn!("SSND chunk has non-zero offset {offset}");
            }

            Ssnd {
                offset: chunk_offset + 8 + u64::from(offset),
                size: u64::from(ssnd.size)
                    .checked_sub(8 + u64::from(offset))
                    .ok_or(Error::InvalidAiff("invalid SSND chunk"))?,
            }
        };

        let (channel_mask, _) = aiff_channels(comm.channels);

        log::debug!(
            "{form_type} with {} channels, {} bps, {} Hz, {} frames",
            comm.channels,
            comm.bits_per_sample,
            comm.sample_rate,
            comm.total_frames,
        );

        Ok(Self {
            reader,
            form_type,
            descriptor: Descriptor::new(
                comm.sample_rate,
                comm.channels,
                channel_mask,
                comm.bits_per_sample.into(),
                comm.total_frames.into(),
            )?,
            chunks: all,
            ssnd,
        })
    }

    /// The file's stream parameters
    #[inline]
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Total PCM frames, from the COMM chunk
    #[inline]
    pub fn total_frames(&self) -> u64 {
        self.descriptor.total_frames
    }

    /// Sample rate, in Hz
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.descriptor.sample_rate
    }

    /// Channel count
    #[inline]
    pub fn channels(&self) -> u16 {
        self.descriptor.channels
    }

    /// Speaker assignment, derived from channel count
    #[inline]
    pub fn channel_mask(&self) -> ChannelMask {
        self.descriptor.channel_mask
    }

    /// Bits per sample
    #[inline]
    pub fn bits_per_sample(&self) -> u32 {
        self.descriptor.bits_per_sample
    }

    /// The file's form type, either `AIFF` or `AIFC`
    #[inline]
    pub fn form_type(&self) -> ChunkId {
        self.form_type
    }

    /// All the file's chunks, in file order
    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Parses the file's ID3v2 tag chunk, if any
    pub fn id3v2(&self) -> Result<Option<crate::id3v2::Id3v2Tag>, Error> {
        match self.chunks.iter().find(|c| c.id == ChunkId::ID3) {
            Some(chunk) => crate::id3v2::Id3v2Tag::read(chunk.data()?.as_ref()),
            None => Ok(None),
        }
    }

    /// Splits file into the bytes before its PCM data,
    /// the range of its PCM data, and the bytes after
    pub fn split(&mut self) -> Result<Split, Error> {
        let end = self.ssnd.offset + self.ssnd.size;

        self.reader.rewind()?;
        let mut head = vec![0; self.ssnd.offset as usize];
        self.reader.read_exact(&mut head)?;

        self.reader.seek(SeekFrom::Start(end))?;
        let mut tail = vec![];
        self.reader.read_to_end(&mut tail)?;

        Ok(Split {
            head,
            payload: self.ssnd.offset..end,
            tail,
        })
    }

    /// Returns reader of the file's PCM frames
    pub fn to_pcm(mut self) -> Result<AiffPcmReader<R>, Error> {
        self.reader.seek(SeekFrom::Start(self.ssnd.offset))?;

        Ok(AiffPcmReader {
            reader: self.reader,
            descriptor: self.descriptor,
            order: aiff_channels(self.descriptor.channels).1,
            remaining_frames: self.descriptor.total_frames,
            remaining_bytes: self.ssnd.size,
        })
    }
}

/// An AIFF file split around its PCM data
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Split {
    /// All bytes prior to the PCM data
    pub head: Vec<u8>,
    /// Absolute range of the PCM data
    pub payload: std::ops::Range<u64>,
    /// All bytes following the PCM data, including any padding
    pub tail: Vec<u8>,
}

/// Rebuilds AIFF file from the parts of a [`Split`]
///
/// Returns total bytes written.
///
/// # Errors
///
/// Returns [`Error::ChunkSizeMismatch`] if the `FORM` size
/// in `head` does not match the assembled file's length.
pub fn reassemble<W, P>(mut w: W, head: &[u8], mut payload: P, tail: &[u8]) -> Result<u64, Error>
where
    W: Write,
    P: Read,
{
    let form_size = match head {
        [b'F', b'O', b'R', b'M', s0, s1, s2, s3, ..] => u32::from_be_bytes([*s0, *s1, *s2, *s3]),
        _ => return Err(Error::InvalidAiff("not an AIFF file")),
    };

    w.write_all(head)?;
    let payload_len = std::io::copy(&mut payload, &mut w)?;
    w.write_all(tail)?;

    let total = head.len() as u64 + payload_len + tail.len() as u64;
    if total == u64::from(form_size) + 8 {
        Ok(total)
    } else {
        Err(Error::ChunkSizeMismatch)
    }
}

/// A reader of an AIFF file's PCM frames
///
/// Frames of 3, 4 and 6 channel files are rearranged
/// from AIFF's physical order to their channel mask's order.
pub struct AiffPcmReader<R> {
    reader: R,
    descriptor: Descriptor,
    order: Option<&'static [usize]>,
    remaining_frames: u64,
    remaining_bytes: u64,
}

impl<R: Read> PcmReader for AiffPcmReader<R> {
    fn sample_rate(&self) -> u32 {
        self.descriptor.sample_rate
    }

    fn channels(&self) -> u16 {
        self.descriptor.channels
    }

    fn channel_mask(&self) -> ChannelMask {
        self.descriptor.channel_mask
    }

    fn bits_per_sample(&self) -> u32 {
        self.descriptor.bits_per_sample
    }

    fn read(&mut self, frames: usize) -> Result<Frame, Error> {
        const PREMATURE: Error = Error::InvalidAiff("ssnd chunk ends prematurely");

        let channels = usize::from(self.descriptor.channels);
        let container_bits = self.descriptor.bits_per_sample.div_ceil(8) * 8;
        let frames = self.remaining_frames.min(frames as u64) as usize;

        if frames == 0 {
            return Ok(Frame::empty(channels, self.descriptor.bits_per_sample));
        }

        let bytes = frames * channels * container_bits as usize / 8;
        if bytes as u64 > self.remaining_bytes {
            return Err(PREMATURE);
        }

        let mut buf = vec![0; bytes];
        self.reader.read_exact(&mut buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => PREMATURE,
            _ => Error::Io(e),
        })?;

        self.remaining_frames -= frames as u64;
        self.remaining_bytes -= bytes as u64;

        let mut frame = Frame::empty(channels, container_bits);
        frame.fill_from_buf::<BigEndian>(&buf, Signedness::Signed);
        let frame = frame.rejustify(self.descriptor.bits_per_sample);

        Ok(match self.order {
            Some(order) => frame.reorder(order),
            None => frame,
        })
    }
}

/// An AIFF file writer
///
/// The header is written with placeholder sizes
/// which are filled in by [`AiffWriter::finalize`].
/// If the writer is dropped before then,
/// or if writing fails, any file it created is removed.
pub struct AiffWriter<W: Write + Seek> {
    writer: W,
    // file to remove if we fail
    path: Option<PathBuf>,
    start: u64,
    comm: Comm,
    leading: Vec<Chunk>,
    // rearrangement from mask order to AIFF's physical order
    order: Option<Vec<usize>>,
    frames: u64,
    bytes: u64,
    finalized: bool,
}

impl AiffWriter<std::io::BufWriter<std::fs::File>> {
    /// Creates new AIFF file at the given path
    pub fn create<P: AsRef<Path>>(
        path: P,
        sample_rate: u32,
        channels: u16,
        channel_mask: ChannelMask,
        bits_per_sample: u32,
    ) -> Result<Self, Error> {
        Self::create_with_chunks(
            path,
            sample_rate,
            channels,
            channel_mask,
            bits_per_sample,
            vec![],
        )
    }

    /// Creates new AIFF file at the given path
    /// with additional chunks between `COMM` and `SSND`
    pub fn create_with_chunks<P: AsRef<Path>>(
        path: P,
        sample_rate: u32,
        channels: u16,
        channel_mask: ChannelMask,
        bits_per_sample: u32,
        leading: Vec<Chunk>,
    ) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = std::fs::File::create(path).map_err(|e| Error::Io(e).into_encoding())?;

        let mut writer = Self::new_with_chunks(
            std::io::BufWriter::new(file),
            sample_rate,
            channels,
            channel_mask,
            bits_per_sample,
            leading,
        );
        if let Ok(w) = writer.as_mut() {
            w.path = Some(path.to_path_buf());
        } else {
            let _ = std::fs::remove_file(path);
        }
        writer
    }
}

impl<W: Write + Seek> AiffWriter<W> {
    /// Starts writing AIFF file to the given stream
    pub fn new(
        writer: W,
        sample_rate: u32,
        channels: u16,
        channel_mask: ChannelMask,
        bits_per_sample: u32,
    ) -> Result<Self, Error> {
        Self::new_with_chunks(
            writer,
            sample_rate,
            channels,
            channel_mask,
            bits_per_sample,
            vec![],
        )
    }

    /// Starts writing AIFF file to the given stream
    /// with additional chunks between `COMM` and `SSND`
    pub fn new_with_chunks(
        mut writer: W,
        sample_rate: u32,
        channels: u16,
        channel_mask: ChannelMask,
        bits_per_sample: u32,
        leading: Vec<Chunk>,
    ) -> Result<Self, Error> {
        if !channel_mask.valid_for(channels) {
            return Err(Error::InvalidChannelMask);
        } else if channels == 0 || !(1..=32).contains(&bits_per_sample) || sample_rate == 0 {
            return Err(Error::PcmMismatch);
        }

        let (aiff_mask, order) = aiff_channels(channels);
        // AIFF fixes the speaker layout of 3, 4 and 6 channel files
        let order = match order {
            Some(order) if channel_mask == aiff_mask || channel_mask == ChannelMask::UNDEFINED => {
                Some(invert(order))
            }
            Some(_) => {
                log::warn!("channel mask {channel_mask} has no AIFF equivalent");
                return Err(Error::InvalidChannelMask);
            }
            None => None,
        };

        let mut aiff = Self {
            start: writer.stream_position()?,
            writer,
            path: None,
            comm: Comm {
                channels,
                total_frames: 0,
                bits_per_sample: bits_per_sample as u16,
                sample_rate,
            },
            leading,
            order,
            frames: 0,
            bytes: 0,
            finalized: false,
        };

        aiff.write_header(&[])
            .map_err(Error::into_encoding)
            .map(|()| aiff)
    }

    // writes everything before the PCM data
    fn write_header(&mut self, trailing: &[Chunk]) -> Result<(), Error> {
        const TOO_LARGE: &str = "PCM data too large for aiff file";

        let comm = Comm {
            total_frames: self
                .frames
                .try_into()
                .map_err(|_| Error::Encoding(TOO_LARGE.into()))?,
            ..self.comm
        }
        .build()?;

        let ssnd_size = self.bytes + 8;

        let form_size = crate::chunk::total_size(
            std::iter::once(&comm)
                .chain(&self.leading)
                .chain(trailing),
        ) + 8
            + ssnd_size
            + (ssnd_size % 2);

        let (form_size, ssnd_size): (u32, u32) = form_size
            .try_into()
            .and_then(|form| ssnd_size.try_into().map(|ssnd| (form, ssnd)))
            .map_err(|_| Error::Encoding(TOO_LARGE.into()))?;

        crate::chunk::ContainerHeader {
            size: form_size,
            form_type: ChunkId::AIFF,
        }
        .write::<Form, _>(self.writer.by_ref())?;

        comm.write::<bitstream_io::BigEndian, _>(&mut self.writer)?;
        for chunk in &self.leading {
            chunk.write::<bitstream_io::BigEndian, _>(&mut self.writer)?;
        }

        let mut w = ByteWriter::endian(self.writer.by_ref(), bitstream_io::BigEndian);
        w.build(&crate::chunk::ChunkHeader {
            id: ChunkId::SSND,
            size: ssnd_size,
        })?;
        w.write::<u32>(0)?; // offset
        w.write::<u32>(0)?; // block size
        Ok(())
    }

    // removes partial output, if any,
    // and converts error to an encoding error
    fn fail(&mut self, err: Error) -> Error {
        if let Some(path) = self.path.take() {
            log::debug!("removing partial {}", path.display());
            let _ = std::fs::remove_file(path);
        }
        err.into_encoding()
    }

    /// Writes PCM frame to file
    ///
    /// # Errors
    ///
    /// Returns [`Error::PcmMismatch`] if the frame's parameters
    /// differ from the file's, or an encoding error
    /// if the frame can't be written.
    pub fn write(&mut self, frame: &Frame) -> Result<(), Error> {
        if frame.channel_count() != usize::from(self.comm.channels)
            || frame.bits_per_sample() != u32::from(self.comm.bits_per_sample)
        {
            return Err(Error::PcmMismatch);
        }

        let bytes = self.bytes + frame.bytes_len() as u64;
        if bytes + 8 > u64::from(u32::MAX) - 64 {
            return Err(self.fail(Error::Encoding("PCM data too large for aiff file".into())));
        }

        let frame = match &self.order {
            Some(order) => frame.reorder(order),
            None => frame.clone(),
        };
        let buf = frame
            .justify(frame.bytes_per_sample() as u32 * 8)
            .to_bytes::<BigEndian>(Signedness::Signed);

        match self.writer.write_all(&buf) {
            Ok(()) => {
                self.bytes = bytes;
                self.frames += frame.pcm_frames() as u64;
                Ok(())
            }
            Err(err) => Err(self.fail(Error::Io(err))),
        }
    }

    /// Completes the file by writing its final sizes
    pub fn finalize(self) -> Result<(), Error> {
        self.finalize_with_chunks(&[])
    }

    /// Completes the file with additional chunks after `SSND`
    pub fn finalize_with_chunks(mut self, trailing: &[Chunk]) -> Result<(), Error> {
        match self.finish(trailing) {
            Ok(()) => {
                self.finalized = true;
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn finish(&mut self, trailing: &[Chunk]) -> Result<(), Error> {
        if self.bytes % 2 == 1 {
            self.writer.write_all(&[0])?;
        }

        for chunk in trailing {
            chunk.write::<bitstream_io::BigEndian, _>(&mut self.writer)?;
        }

        let end = self.writer.stream_position()?;
        self.writer.seek(SeekFrom::Start(self.start))?;
        self.write_header(trailing)?;
        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;

        log::debug!("wrote AIFF with {} frames", self.frames);
        Ok(())
    }
}

impl<W: Write + Seek> Drop for AiffWriter<W> {
    fn drop(&mut self) {
        if !self.finalized {
            if let Some(path) = self.path.take() {
                log::debug!("removing unfinished {}", path.display());
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

/// Writes AIFF file from the given PCM reader
///
/// Any failure, including a failure from the reader,
/// removes the partial file and is reported as an encoding error.
pub fn from_pcm<P, R>(path: P, pcm: &mut R, options: Options) -> Result<(), Error>
where
    P: AsRef<Path>,
    R: PcmReader + ?Sized,
{
    from_pcm_with_chunks(path, pcm, options, vec![], &[])
}

/// Writes AIFF file from the given PCM reader
/// with additional chunks before and after the `SSND` chunk
pub fn from_pcm_with_chunks<P, R>(
    path: P,
    pcm: &mut R,
    options: Options,
    leading: Vec<Chunk>,
    trailing: &[Chunk],
) -> Result<(), Error>
where
    P: AsRef<Path>,
    R: PcmReader + ?Sized,
{
    let mut writer = AiffWriter::create_with_chunks(
        path,
        pcm.sample_rate(),
        pcm.channels(),
        pcm.channel_mask(),
        pcm.bits_per_sample(),
        leading,
    )?;

    loop {
        let frame = pcm
            .read(options.get_frames_per_read())
            .map_err(|e| writer.fail(e))?;
        if frame.is_empty() {
            break writer.finalize_with_chunks(trailing);
        }
        writer.write(&frame)?;
    }
}

/// Replaces AIFF file's ID3v2 tag chunk
///
/// A `None` tag removes any existing tag chunk.
/// The file is rebuilt in a temporary file
/// and renamed over the original.
pub fn update_id3v2<P: AsRef<Path>>(
    path: P,
    tag: Option<&crate::id3v2::Id3v2Tag>,
    options: Options,
) -> Result<(), Error> {
    let new_chunk = tag
        .map(|tag| Chunk::new(ChunkId::ID3, tag.to_bytes(options.get_id3v2_padding())?))
        .transpose()?;

    crate::chunk::update_chunk::<Form, _>(path, ChunkId::ID3, new_chunk, options)
}
