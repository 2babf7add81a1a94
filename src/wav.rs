// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For reading and writing RIFF WAVE files
//!
//! WAVE files are a little-endian `RIFF` [`chunk`](crate::chunk) container
//! which must hold a `fmt ` chunk describing the stream
//! followed by a `data` chunk holding its PCM samples.
//! 8 bits-per-sample files store unsigned samples,
//! all others store signed samples.
//!
//! # Example
//!
//! ```
//! use audio_containers::wav::{WaveReader, WaveWriter};
//! use audio_containers::audio::{ChannelMask, Frame, PcmReader};
//! use std::io::Cursor;
//!
//! let mut file = Cursor::new(vec![]);
//! let mut writer = WaveWriter::new(
//!     &mut file,
//!     8000,
//!     1,
//!     ChannelMask::from_channels(1),
//!     8,
//! ).unwrap();
//! writer.write(&Frame::from_interleaved(1, 8, &[-128, 0, 127])).unwrap();
//! writer.finalize().unwrap();
//!
//! // 8-bit samples are stored unsigned
//! let file = file.into_inner();
//! assert_eq!(&file[file.len() - 4..file.len() - 1], &[0x00, 0x80, 0xFF]);
//!
//! let mut pcm = WaveReader::new(Cursor::new(file)).unwrap().to_pcm().unwrap();
//! assert_eq!(pcm.read(10).unwrap().channel(0), &[-128, 0, 127]);
//! ```

use crate::audio::{ChannelMask, Descriptor, Frame, PcmReader};
use crate::byteorder::{LittleEndian, Signedness};
use crate::chunk::{Chunk, ChunkId, Chunks, Riff};
use crate::{Error, Options};
use bitstream_io::{ByteRead, ByteReader, ByteWrite, ByteWriter};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// WAVE_FORMAT_PCM
const FORMAT_PCM: u16 = 0x0001;

/// WAVE_FORMAT_EXTENSIBLE
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// The KSDATAFORMAT_SUBTYPE_PCM GUID
const SUB_FORMAT_PCM: [u8; 16] = [
    0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
];

/// A parsed `fmt ` chunk
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Fmt {
    /// A WAVE_FORMAT_PCM chunk
    Standard {
        /// Channel count
        channels: u16,
        /// Sample rate, in Hz
        sample_rate: u32,
        /// Bytes per second
        data_rate: u32,
        /// Bytes per PCM frame
        data_block_size: u16,
        /// Bits per sample
        bits_per_sample: u16,
    },
    /// A WAVE_FORMAT_EXTENSIBLE chunk
    Extensible {
        /// Channel count
        channels: u16,
        /// Sample rate, in Hz
        sample_rate: u32,
        /// Bytes per second
        data_rate: u32,
        /// Bytes per PCM frame
        data_block_size: u16,
        /// Bits per sample container
        bits_per_sample: u16,
        /// Significant bits per sample
        valid_bits: u16,
        /// Speaker assignment
        channel_mask: u32,
        /// Sample format GUID
        sub_format: [u8; 16],
    },
}

impl Fmt {
    /// Builds the fmt chunk best suited to the given parameters
    ///
    /// The extensible format is used for streams of more than 2 channels,
    /// of more than 16 bits-per-sample, of bits-per-sample
    /// not a multiple of 8, or with a channel mask
    /// other than the undefined or default one.
    pub fn new(
        sample_rate: u32,
        channels: u16,
        channel_mask: ChannelMask,
        bits_per_sample: u32,
    ) -> Self {
        let container_bytes = bits_per_sample.div_ceil(8) as u16;
        let data_block_size = channels.saturating_mul(container_bytes);
        let data_rate = sample_rate.saturating_mul(data_block_size.into());

        if channels > 2
            || bits_per_sample > 16
            || bits_per_sample % 8 != 0
            || !(channel_mask == ChannelMask::UNDEFINED
                || channel_mask == ChannelMask::from_channels(channels))
        {
            Self::Extensible {
                channels,
                sample_rate,
                data_rate,
                data_block_size,
                bits_per_sample: container_bytes * 8,
                valid_bits: bits_per_sample as u16,
                channel_mask: channel_mask.into(),
                sub_format: SUB_FORMAT_PCM,
            }
        } else {
            Self::Standard {
                channels,
                sample_rate,
                data_rate,
                data_block_size,
                bits_per_sample: bits_per_sample as u16,
            }
        }
    }

    /// Channel count
    pub fn channels(&self) -> u16 {
        match self {
            Self::Standard { channels, .. } | Self::Extensible { channels, .. } => *channels,
        }
    }

    /// Sample rate, in Hz
    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::Standard { sample_rate, .. } | Self::Extensible { sample_rate, .. } => {
                *sample_rate
            }
        }
    }

    /// Significant bits per sample
    pub fn bits_per_sample(&self) -> u32 {
        match self {
            Self::Standard {
                bits_per_sample, ..
            } => (*bits_per_sample).into(),
            Self::Extensible {
                valid_bits: 0,
                bits_per_sample,
                ..
            } => (*bits_per_sample).into(),
            Self::Extensible { valid_bits, .. } => (*valid_bits).into(),
        }
    }

    /// Bits per sample container, always a multiple of 8
    pub fn container_bits(&self) -> u32 {
        match self {
            Self::Standard {
                bits_per_sample, ..
            }
            | Self::Extensible {
                bits_per_sample, ..
            } => u32::from(*bits_per_sample).div_ceil(8) * 8,
        }
    }

    /// Speaker assignment
    ///
    /// Standard fmt chunks derive theirs from the channel count.
    pub fn channel_mask(&self) -> ChannelMask {
        match self {
            Self::Standard { channels, .. } => ChannelMask::from_channels(*channels),
            Self::Extensible { channel_mask, .. } => (*channel_mask).into(),
        }
    }

    /// Builds `fmt ` chunk
    pub fn build(&self) -> Result<Chunk, Error> {
        let mut w = ByteWriter::endian(Vec::with_capacity(40), bitstream_io::LittleEndian);
        w.build(self)?;
        Chunk::new(ChunkId::FMT, w.into_writer())
    }
}

impl bitstream_io::FromByteStream for Fmt {
    type Error = Error;

    fn from_reader<R>(r: &mut R) -> Result<Self, Self::Error>
    where
        R: bitstream_io::ByteRead + ?Sized,
    {
        match r.read::<u16>()? {
            FORMAT_PCM => Ok(Self::Standard {
                channels: r.read()?,
                sample_rate: r.read()?,
                data_rate: r.read()?,
                data_block_size: r.read()?,
                bits_per_sample: r.read()?,
            }),
            FORMAT_EXTENSIBLE => {
                let channels = r.read()?;
                let sample_rate = r.read()?;
                let data_rate = r.read()?;
                let data_block_size = r.read()?;
                let bits_per_sample = r.read()?;

                // extension size should be 22 bytes
                if r.read::<u16>()? != 22 {
                    return Err(Error::InvalidWave("invalid fmt chunk"));
                }

                let fmt = Self::Extensible {
                    channels,
                    sample_rate,
                    data_rate,
                    data_block_size,
                    bits_per_sample,
                    valid_bits: r.read()?,
                    channel_mask: r.read()?,
                    sub_format: r.read()?,
                };

                match fmt {
                    Self::Extensible {
                        sub_format: SUB_FORMAT_PCM,
                        ..
                    } => Ok(fmt),
                    _ => Err(Error::InvalidWave("unsupported format")),
                }
            }
            _ => Err(Error::InvalidWave("unsupported format")),
        }
    }
}

impl bitstream_io::ToByteStream for Fmt {
    type Error = std::io::Error;

    // yields chunk body only
    fn to_writer<W>(&self, w: &mut W) -> std::io::Result<()>
    where
        W: bitstream_io::ByteWrite + ?Sized,
    {
        match self {
            Self::Standard {
                channels,
                sample_rate,
                data_rate,
                data_block_size,
                bits_per_sample,
            } => {
                w.write(FORMAT_PCM)?;
                w.write(*channels)?;
                w.write(*sample_rate)?;
                w.write(*data_rate)?;
                w.write(*data_block_size)?;
                w.write(*bits_per_sample)
            }
            Self::Extensible {
                channels,
                sample_rate,
                data_rate,
                data_block_size,
                bits_per_sample,
                valid_bits,
                channel_mask,
                sub_format,
            } => {
                w.write(FORMAT_EXTENSIBLE)?;
                w.write(*channels)?;
                w.write(*sample_rate)?;
                w.write(*data_rate)?;
                w.write(*data_block_size)?;
                w.write(*bits_per_sample)?;
                w.write::<u16>(22)?; // size of extension
                w.write(*valid_bits)?;
                w.write(*channel_mask)?;
                w.write_bytes(sub_format)
            }
        }
    }
}

/// A RIFF WAVE file reader
pub struct WaveReader<R> {
    reader: R,
    fmt: Fmt,
    descriptor: Descriptor,
    chunks: Vec<Chunk>,
    // absolute offset and size of data chunk body
    data: (u64, u64),
}

impl WaveReader<std::io::BufReader<std::fs::File>> {
    /// Opens WAVE file from the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::open_with(path, Options::default())
    }

    /// Opens WAVE file with the given options
    pub fn open_with<P: AsRef<Path>>(path: P, options: Options) -> Result<Self, Error> {
        Self::from_chunks(Chunks::open(path, options)?)
    }
}

impl<R: Read + Seek> WaveReader<R> {
    /// Reads WAVE file from the given stream
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is not a RIFF WAVE file,
    /// if its `fmt ` chunk is missing, duplicated or unsupported,
    /// or if its `data` chunk is missing.
    pub fn new(reader: R) -> Result<Self, Error> {
        Self::from_chunks(Chunks::new(reader, Options::default())?)
    }

    fn from_chunks(mut chunks: Chunks<R, Riff>) -> Result<Self, Error> {
        let all = chunks.by_ref().collect::<Result<Vec<_>, _>>()?;
        let reader = chunks.into_reader();

        let mut fmt = None;
        let mut data = None;

        for chunk in &all {
            match chunk.id {
                ChunkId::FMT if fmt.is_some() => {
                    return Err(Error::InvalidWave("multiple fmt chunks"));
                }
                ChunkId::FMT => {
                    fmt = Some(
                        ByteReader::endian(chunk.data()?.as_ref(), bitstream_io::LittleEndian)
                            .parse::<Fmt>()?,
                    );
                }
                ChunkId::DATA if data.is_none() => {
                    data = chunk
                        .data
                        .offset()
                        .map(|offset| (offset, u64::from(chunk.size)));
                }
                _ => { /* foreign chunk */ }
            }
        }

        let fmt = fmt.ok_or(Error::InvalidWave("fmt chunk not found"))?;
        let data = data.ok_or(Error::InvalidWave("data chunk not found"))?;

        let block_size = u64::from(fmt.channels()) * u64::from(fmt.container_bits() / 8);
        if block_size == 0 {
            return Err(Error::InvalidWave("invalid fmt chunk"));
        } else if data.1 % block_size != 0 {
            log::warn!("data chunk holds a partial PCM frame");
        }

        log::debug!(
            "WAVE with {} channels, {} bps, {} Hz, {} data bytes",
            fmt.channels(),
            fmt.bits_per_sample(),
            fmt.sample_rate(),
            data.1,
        );

        Ok(Self {
            reader,
            descriptor: Descriptor::new(
                fmt.sample_rate(),
                fmt.channels(),
                fmt.channel_mask(),
                fmt.bits_per_sample(),
                data.1 / block_size,
            )?,
            fmt,
            chunks: all,
            data,
        })
    }

    /// The file's stream parameters
    #[inline]
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// The file's parsed `fmt ` chunk
    #[inline]
    pub fn fmt(&self) -> &Fmt {
        &self.fmt
    }

    /// Total PCM frames, from the size of the data chunk
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

    /// Speaker assignment
    #[inline]
    pub fn channel_mask(&self) -> ChannelMask {
        self.descriptor.channel_mask
    }

    /// Significant bits per sample
    #[inline]
    pub fn bits_per_sample(&self) -> u32 {
        self.descriptor.bits_per_sample
    }

    /// All the file's chunks, in file order
    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Parses the file's ID3v2 tag chunk, if any
    ///
    /// Both `id3 ` and `ID3 ` chunk IDs are recognized.
    pub fn id3v2(&self) -> Result<Option<crate::id3v2::Id3v2Tag>, Error> {
        match self
            .chunks
            .iter()
            .find(|c| c.id == ChunkId::ID3_WAVE || c.id == ChunkId::ID3)
        {
            Some(chunk) => crate::id3v2::Id3v2Tag::read(chunk.data()?.as_ref()),
            None => Ok(None),
        }
    }

    /// Returns reader of the file's PCM frames
    pub fn to_pcm(mut self) -> Result<WavePcmReader<R>, Error> {
        self.reader.seek(SeekFrom::Start(self.data.0))?;

        Ok(WavePcmReader {
            reader: self.reader,
            descriptor: self.descriptor,
            container_bits: self.fmt.container_bits(),
            remaining_frames: self.descriptor.total_frames,
        })
    }
}

/// A reader of a WAVE file's PCM frames
pub struct WavePcmReader<R> {
    reader: R,
    descriptor: Descriptor,
    container_bits: u32,
    remaining_frames: u64,
}

impl<R: Read> PcmReader for WavePcmReader<R> {
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
        let channels = usize::from(self.descriptor.channels);
        let frames = self.remaining_frames.min(frames as u64) as usize;

        if frames == 0 {
            return Ok(Frame::empty(channels, self.descriptor.bits_per_sample));
        }

        let mut buf = vec![0; frames * channels * self.container_bits as usize / 8];
        self.reader.read_exact(&mut buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                Error::InvalidWave("data chunk ends prematurely")
            }
            _ => Error::Io(e),
        })?;
        self.remaining_frames -= frames as u64;

        let mut frame = Frame::empty(channels, self.container_bits);
        frame.fill_from_buf::<LittleEndian>(&buf, Signedness::wave(self.container_bits));
        Ok(frame.rejustify(self.descriptor.bits_per_sample))
    }
}

/// A RIFF WAVE file writer
///
/// The header is written with placeholder sizes
/// which are filled in by [`WaveWriter::finalize`].
/// If the writer is dropped before then,
/// or if writing fails, any file it created is removed.
pub struct WaveWriter<W: Write + Seek> {
    writer: W,
    // file to remove if we fail
    path: Option<PathBuf>,
    start: u64,
    fmt: Fmt,
    bits_per_sample: u32,
    leading: Vec<Chunk>,
    frames: u64,
    bytes: u64,
    finalized: bool,
}

impl WaveWriter<std::io::BufWriter<std::fs::File>> {
    /// Creates new WAVE file at the given path
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

    /// Creates new WAVE file at the given path
    /// with additional chunks between `fmt ` and `data`
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
        match writer.as_mut() {
            Ok(w) => w.path = Some(path.to_path_buf()),
            Err(_) => {
                let _ = std::fs::remove_file(path);
            }
        }
        writer
    }
}

impl<W: Write + Seek> WaveWriter<W> {
    /// Starts writing WAVE file to the given stream
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

    /// Starts writing WAVE file to the given stream
    /// with additional chunks between `fmt ` and `data`
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

        let mut wave = Self {
            start: writer.stream_position()?,
            writer,
            path: None,
            fmt: Fmt::new(sample_rate, channels, channel_mask, bits_per_sample),
            bits_per_sample,
            leading,
            frames: 0,
            bytes: 0,
            finalized: false,
        };

        wave.write_header(&[])
            .map_err(Error::into_encoding)
            .map(|()| wave)
    }

    // writes everything before the PCM data
    fn write_header(&mut self, trailing: &[Chunk]) -> Result<(), Error> {
        let fmt = self.fmt.build()?;

        let riff_size = crate::chunk::total_size(
            std::iter::once(&fmt)
                .chain(&self.leading)
                .chain(trailing),
        ) + 8
            + self.bytes
            + (self.bytes % 2);

        let (riff_size, data_size): (u32, u32) = riff_size
            .try_into()
            .and_then(|riff| self.bytes.try_into().map(|data| (riff, data)))
            .map_err(|_| Error::Encoding("PCM data too large for wave file".into()))?;

        crate::chunk::ContainerHeader {
            size: riff_size,
            form_type: ChunkId::WAVE,
        }
        .write::<Riff, _>(self.writer.by_ref())?;

        fmt.write::<bitstream_io::LittleEndian, _>(&mut self.writer)?;
        for chunk in &self.leading {
            chunk.write::<bitstream_io::LittleEndian, _>(&mut self.writer)?;
        }

        ByteWriter::endian(self.writer.by_ref(), bitstream_io::LittleEndian).build(
            &crate::chunk::ChunkHeader {
                id: ChunkId::DATA,
                size: data_size,
            },
        )?;
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
        if frame.channel_count() != usize::from(self.fmt.channels())
            || frame.bits_per_sample() != self.bits_per_sample
        {
            return Err(Error::PcmMismatch);
        }

        let container_bits = self.fmt.container_bits();
        let buf = frame
            .justify(container_bits)
            .to_bytes::<LittleEndian>(Signedness::wave(container_bits));

        let bytes = self.bytes + buf.len() as u64;
        if bytes > u64::from(u32::MAX) - 64 {
            return Err(self.fail(Error::Encoding("PCM data too large for wave file".into())));
        }

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

    /// Completes the file with additional chunks after `data`
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
            chunk.write::<bitstream_io::LittleEndian, _>(&mut self.writer)?;
        }

        let end = self.writer.stream_position()?;
        self.writer.seek(SeekFrom::Start(self.start))?;
        self.write_header(trailing)?;
        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;

        log::debug!("wrote WAVE with {} frames", self.frames);
        Ok(())
    }
}

impl<W: Write + Seek> Drop for WaveWriter<W> {
    fn drop(&mut self) {
        if !self.finalized {
            if let Some(path) = self.path.take() {
                log::debug!("removing unfinished {}", path.display());
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

/// Writes WAVE file from the given PCM reader
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

/// Writes WAVE file from the given PCM reader
/// with additional chunks before and after the `data` chunk
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
    let mut writer = WaveWriter::create_with_chunks(
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

/// Replaces WAVE file's `id3 ` tag chunk
///
/// A `None` tag removes any existing tag chunk.
pub fn update_id3v2<P: AsRef<Path>>(
    path: P,
    tag: Option<&crate::id3v2::Id3v2Tag>,
    options: Options,
) -> Result<(), Error> {
    let new_chunk = tag
        .map(|tag| Chunk::new(ChunkId::ID3_WAVE, tag.to_bytes(options.get_id3v2_padding())?))
        .transpose()?;

    crate::chunk::update_chunk::<Riff, _>(path, ChunkId::ID3_WAVE, new_chunk, options)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::Channel;
    use std::io::Cursor;

    #[test]
    fn test_fmt_selection() {
        assert!(matches!(
            Fmt::new(44100, 2, ChannelMask::from_channels(2), 16),
            Fmt::Standard {
                data_block_size: 4,
                data_rate: 176400,
                ..
            }
        ));

        let fmt = Fmt::new(
            48000,
            2,
            ChannelMask::from_channels(2),
            20,
        );
        assert!(matches!(
            fmt,
            Fmt::Extensible {
                bits_per_sample: 24,
                valid_bits: 20,
                data_block_size: 6,
                ..
            }
        ));
        assert_eq!(fmt.bits_per_sample(), 20);
        assert_eq!(fmt.container_bits(), 24);

        let mask: ChannelMask = [
            Channel::FrontLeft,
            Channel::FrontRight,
            Channel::FrontCenter,
        ]
        .into_iter()
        .collect();
        assert_eq!(Fmt::new(44100, 3, mask, 16).channel_mask(), mask);

        // an unassigned mono or stereo stream needs no extension
        assert!(matches!(
            Fmt::new(44100, 1, ChannelMask::UNDEFINED, 16),
            Fmt::Standard { channels: 1, .. }
        ));
        assert!(matches!(
            Fmt::new(44100, 2, ChannelMask::UNDEFINED, 24),
            Fmt::Extensible { channel_mask: 0, .. }
        ));
    }

    #[test]
    fn test_fmt_round_trip() {
        for fmt in [
            Fmt::new(44100, 2, ChannelMask::from_channels(2), 16),
            Fmt::new(96000, 6, ChannelMask::UNDEFINED, 24),
        ] {
            let chunk = fmt.build().unwrap();
            assert_eq!(
                chunk.size,
                match fmt {
                    Fmt::Standard { .. } => 16,
                    Fmt::Extensible { .. } => 40,
                }
            );
            assert_eq!(
                ByteReader::endian(chunk.data().unwrap().as_ref(), bitstream_io::LittleEndian)
                    .parse::<Fmt>()
                    .unwrap(),
                fmt
            );
        }
    }

    #[test]
    fn test_unsupported_format() {
        // WAVE_FORMAT_IEEE_FLOAT
        let mut body = vec![0x03, 0x00];
        body.extend([0; 14]);
        assert!(matches!(
            ByteReader::endian(body.as_slice(), bitstream_io::LittleEndian).parse::<Fmt>(),
            Err(Error::InvalidWave("unsupported format"))
        ));
    }

    #[test]
    fn test_missing_chunks() {
        fn file(chunks: &[Chunk]) -> Cursor<Vec<u8>> {
            let mut w = Cursor::new(vec![]);
            crate::chunk::write_chunks::<Riff, _, _>(&mut w, ChunkId::WAVE, chunks).unwrap();
            w.set_position(0);
            w
        }

        let fmt = Fmt::new(44100, 1, ChannelMask::from_channels(1), 16)
            .build()
            .unwrap();
        let data = Chunk::new(ChunkId::DATA, vec![0; 4]).unwrap();

        assert!(matches!(
            WaveReader::new(file(&[data.clone()])),
            Err(Error::InvalidWave("fmt chunk not found"))
        ));
        assert!(matches!(
            WaveReader::new(file(&[fmt.clone()])),
            Err(Error::InvalidWave("data chunk not found"))
        ));
        assert!(matches!(
            WaveReader::new(file(&[fmt.clone(), fmt.clone(), data.clone()])),
            Err(Error::InvalidWave("multiple fmt chunks"))
        ));
        assert_eq!(
            WaveReader::new(file(&[fmt, data])).unwrap().total_frames(),
            2
        );
    }
}
