// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! PCM frames, channel assignments and stream parameters

use crate::Error;
use crate::byteorder::{Endianness, Signedness};

/// A block of PCM frames
///
/// Samples are stored stacked by channel,
/// so that each channel is a contiguous slice.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Frame {
    // all samples, stacked by channel
    samples: Vec<i32>,

    // total number of channels
    channels: usize,

    // total length of each channel in samples
    channel_len: usize,

    // bits-per-sample
    bits_per_sample: u32,
}

impl Frame {
    /// Returns empty Frame which can be filled as needed
    #[inline]
    pub fn empty(channels: usize, bits_per_sample: u32) -> Self {
        Self {
            samples: Vec::new(),
            channels,
            channel_len: 0,
            bits_per_sample,
        }
    }

    /// Builds frame from interleaved samples
    ///
    /// Any trailing partial PCM frame is ignored.
    ///
    /// # Example
    ///
    /// ```
    /// use audio_containers::audio::Frame;
    ///
    /// let frame = Frame::from_interleaved(2, 16, &[1, -1, 2, -2, 3, -3]);
    /// assert_eq!(frame.pcm_frames(), 3);
    /// assert_eq!(frame.channel(0), &[1, 2, 3]);
    /// assert_eq!(frame.channel(1), &[-1, -2, -3]);
    /// assert_eq!(frame.iter().collect::<Vec<_>>(), vec![1, -1, 2, -2, 3, -3]);
    /// ```
    pub fn from_interleaved(channels: usize, bits_per_sample: u32, samples: &[i32]) -> Self {
        let mut frame = Self::empty(channels, bits_per_sample);
        frame.fill_from_samples(samples);
        frame
    }

    /// Builds frame from individual channels of equal length
    ///
    /// Returns `None` if the channels differ in length.
    pub fn from_channels<C: AsRef<[i32]>>(bits_per_sample: u32, channels: &[C]) -> Option<Self> {
        let channel_len = channels.first().map(|c| c.as_ref().len()).unwrap_or(0);

        channels
            .iter()
            .all(|c| c.as_ref().len() == channel_len)
            .then(|| Self {
                samples: channels
                    .iter()
                    .flat_map(|c| c.as_ref().iter().copied())
                    .collect(),
                channels: channels.len(),
                channel_len,
                bits_per_sample,
            })
    }

    /// Returns PCM frame count
    #[inline]
    pub fn pcm_frames(&self) -> usize {
        self.channel_len
    }

    /// Returns true if the frame contains no samples
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.channel_len == 0
    }

    /// Returns channel count
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Returns bits-per-sample
    #[inline]
    pub fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    /// Returns bytes-per-sample
    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample.div_ceil(8) as usize
    }

    /// Returns total length of buffer in bytes
    #[inline]
    pub fn bytes_len(&self) -> usize {
        self.bytes_per_sample() * self.samples.len()
    }

    /// Iterates over any samples in interleaved order
    pub fn iter(&self) -> impl Iterator<Item = i32> {
        (0..self.samples.len()).map(|i| {
            let (sample, channel) = (i / self.channels, i % self.channels);
            self.samples[channel * self.channel_len + sample]
        })
    }

    /// Iterates over all channels
    #[inline]
    pub fn channels(&self) -> impl Iterator<Item = &[i32]> {
        self.samples.chunks_exact(self.channel_len.max(1))
    }

    /// Returns the given channel's samples
    ///
    /// # Panics
    ///
    /// Panics if the channel is out of range
    pub fn channel(&self, channel: usize) -> &[i32] {
        &self.samples[channel * self.channel_len..(channel + 1) * self.channel_len]
    }

    /// Returns new frame with channels rearranged
    ///
    /// Output channel `i` is taken from input channel `order[i]`.
    ///
    /// # Panics
    ///
    /// Panics if `order` names a channel out of range.
    ///
    /// # Example
    ///
    /// ```
    /// use audio_containers::audio::Frame;
    ///
    /// let frame = Frame::from_interleaved(3, 16, &[1, 2, 3, 4, 5, 6]);
    /// let swapped = frame.reorder(&[2, 0, 1]);
    /// assert_eq!(swapped.iter().collect::<Vec<_>>(), vec![3, 1, 2, 6, 4, 5]);
    /// ```
    pub fn reorder(&self, order: &[usize]) -> Self {
        Self {
            samples: order
                .iter()
                .flat_map(|c| self.channel(*c).iter().copied())
                .collect(),
            channels: order.len(),
            channel_len: self.channel_len,
            bits_per_sample: self.bits_per_sample,
        }
    }

    /// Returns a new frame of PCM frames `start..end`
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.channel_len);
        let start = start.min(end);

        Self {
            samples: self
                .channels()
                .flat_map(|c| c[start..end].iter().copied())
                .collect(),
            channels: self.channels,
            channel_len: end - start,
            bits_per_sample: self.bits_per_sample,
        }
    }

    /// Appends another frame's PCM frames to the end of this one
    ///
    /// # Errors
    ///
    /// Returns an error if the frames' channel counts
    /// or bits-per-sample differ.
    pub fn append(&mut self, other: &Frame) -> Result<(), Error> {
        if self.is_empty() && self.samples.is_empty() {
            *self = other.clone();
            return Ok(());
        } else if other.is_empty() {
            return Ok(());
        } else if other.channels != self.channels || other.bits_per_sample != self.bits_per_sample
        {
            return Err(Error::PcmMismatch);
        }

        let channel_len = self.channel_len + other.channel_len;
        self.samples = self
            .channels()
            .zip(other.channels())
            .flat_map(|(a, b)| a.iter().chain(b).copied())
            .collect();
        self.channel_len = channel_len;
        Ok(())
    }

    /// Fills buffer with our samples in the given endianness
    ///
    /// # Panics
    ///
    /// Panics if buffer is not [`Frame::bytes_len`] long.
    pub fn to_buf<E: Endianness>(&self, buf: &mut [u8], signedness: Signedness) {
        assert_eq!(buf.len(), self.bytes_len());

        for (sample, bytes) in self.iter().zip(buf.chunks_exact_mut(self.bytes_per_sample())) {
            E::sample_to_bytes(sample, bytes, signedness);
        }
    }

    /// Returns our samples as bytes in the given endianness
    pub fn to_bytes<E: Endianness>(&self, signedness: Signedness) -> Vec<u8> {
        let mut buf = vec![0; self.bytes_len()];
        self.to_buf::<E>(&mut buf, signedness);
        buf
    }

    /// Fills frame samples from interleaved bytes of the given endianness
    ///
    /// Any trailing partial PCM frame is ignored.
    pub fn fill_from_buf<E: Endianness>(&mut self, buf: &[u8], signedness: Signedness) -> &Self {
        let bytes_per_sample = self.bytes_per_sample();
        let frame_len = (bytes_per_sample * self.channels).max(1);

        self.channel_len = buf.len() / frame_len;
        self.samples.resize(self.channel_len * self.channels, 0);

        for (s, frame) in buf.chunks_exact(frame_len).enumerate() {
            for (c, bytes) in frame.chunks_exact(bytes_per_sample).enumerate() {
                self.samples[c * self.channel_len + s] = E::bytes_to_sample(bytes, signedness);
            }
        }

        self
    }

    /// Converts samples held left-justified in a wider container
    /// to right-justified samples of the given bits-per-sample
    pub(crate) fn rejustify(mut self, bits_per_sample: u32) -> Self {
        let shift = self.bits_per_sample.saturating_sub(bits_per_sample);
        if shift > 0 {
            self.samples.iter_mut().for_each(|s| *s >>= shift);
        }
        self.bits_per_sample = bits_per_sample;
        self
    }

    /// Converts samples to left-justified samples
    /// in a container of the given bits-per-sample
    pub(crate) fn justify(&self, container_bits: u32) -> Self {
        let shift = container_bits.saturating_sub(self.bits_per_sample);
        Self {
            samples: self.samples.iter().map(|s| s << shift).collect(),
            channels: self.channels,
            channel_len: self.channel_len,
            bits_per_sample: container_bits,
        }
    }

    /// Fills frame samples from interleaved samples
    pub fn fill_from_samples(&mut self, samples: &[i32]) -> &Self {
        fn samples_iter(
            channels: usize,
            channel_len: usize,
            samples: &[i32],
        ) -> impl Iterator<Item = i32> {
            (0..channels)
                .flat_map(move |c| (0..channel_len).map(move |s| samples[(s * channels) + c]))
        }

        self.channel_len = samples.len().checked_div(self.channels).unwrap_or(0);
        self.samples = samples_iter(self.channels, self.channel_len, samples).collect();

        self
    }
}

/// A speaker assignment mask
///
/// Each set bit indicates a speaker present in the stream,
/// and channels are stored in the order of their bits
/// from least to most significant.
/// A mask of 0 indicates an undefined assignment
/// where channels follow some positional convention.
///
/// # Example
///
/// ```
/// use audio_containers::audio::{ChannelMask, Channel};
///
/// let mask = "0x003F".parse::<ChannelMask>().unwrap();
///
/// let mut channels = mask.channels();
/// assert_eq!(channels.next(), Some(Channel::FrontLeft));
/// assert_eq!(channels.next(), Some(Channel::FrontRight));
/// assert_eq!(channels.next(), Some(Channel::FrontCenter));
/// assert_eq!(channels.next(), Some(Channel::Lfe));
/// assert_eq!(channels.next(), Some(Channel::BackLeft));
/// assert_eq!(channels.next(), Some(Channel::BackRight));
/// assert_eq!(channels.next(), None);
/// assert_eq!(mask.len(), 6);
/// ```
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ChannelMask {
    mask: u32,
}

impl ChannelMask {
    /// An undefined channel mask
    pub const UNDEFINED: Self = Self { mask: 0 };

    const ALL: [Channel; 18] = [
        Channel::FrontLeft,
        Channel::FrontRight,
        Channel::FrontCenter,
        Channel::Lfe,
        Channel::BackLeft,
        Channel::BackRight,
        Channel::FrontLeftOfCenter,
        Channel::FrontRightOfCenter,
        Channel::BackCenter,
        Channel::SideLeft,
        Channel::SideRight,
        Channel::TopCenter,
        Channel::TopFrontLeft,
        Channel::TopFrontCenter,
        Channel::TopFrontRight,
        Channel::TopRearLeft,
        Channel::TopRearCenter,
        Channel::TopRearRight,
    ];

    /// Iterates over all the mask's defined channels
    pub fn channels(&self) -> impl Iterator<Item = Channel> {
        Self::ALL
            .into_iter()
            .filter(|channel| (*channel as u32 & self.mask) != 0)
    }

    /// Number of channels defined in mask
    #[inline]
    pub fn len(&self) -> u32 {
        self.mask.count_ones()
    }

    /// Whether the mask is undefined
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Whether the mask contains the given channel
    #[inline]
    pub fn contains(&self, channel: Channel) -> bool {
        self.mask & channel as u32 != 0
    }

    /// Whether the mask is usable for a stream with the given channel count
    ///
    /// An undefined mask is valid for any channel count.
    pub fn valid_for(&self, channels: u16) -> bool {
        self.is_empty() || self.len() == u32::from(channels)
    }

    /// The conventional assignment for the given channel count
    ///
    /// Mono and stereo have conventional assignments,
    /// but all other counts are undefined.
    pub fn from_channels(channels: u16) -> Self {
        match channels {
            1 => [Channel::FrontCenter].into_iter().collect(),
            2 => [Channel::FrontLeft, Channel::FrontRight].into_iter().collect(),
            _ => Self::UNDEFINED,
        }
    }
}

impl FromIterator<Channel> for ChannelMask {
    fn from_iter<I: IntoIterator<Item = Channel>>(iter: I) -> Self {
        Self {
            mask: iter.into_iter().fold(0, |mask, c| mask | c as u32),
        }
    }
}

impl std::str::FromStr for ChannelMask {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('x').ok_or(())? {
            ("0", hex) => u32::from_str_radix(hex, 16)
                .map(|mask| ChannelMask { mask })
                .map_err(|_| ()),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "0x{:04x}", self.mask)
    }
}

impl From<ChannelMask> for u32 {
    fn from(mask: ChannelMask) -> u32 {
        mask.mask
    }
}

impl From<u32> for ChannelMask {
    fn from(mask: u32) -> ChannelMask {
        ChannelMask { mask }
    }
}

/// An individual channel mask channel
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Channel {
    /// Front left channel
    FrontLeft = 0b1,

    /// Front right channel
    FrontRight = 0b10,

    /// Front center channel
    FrontCenter = 0b100,

    /// Low-frequency effects (LFE) channel
    Lfe = 0b1000,

    /// Back left channel
    BackLeft = 0b10000,

    /// Back right channel
    BackRight = 0b100000,

    /// Front left of center channel
    FrontLeftOfCenter = 0b1000000,

    /// Front right of center channel
    FrontRightOfCenter = 0b10000000,

    /// Back center channel
    BackCenter = 0b100000000,

    /// Side left channel
    SideLeft = 0b1000000000,

    /// Side right channel
    SideRight = 0b10000000000,

    /// Top center channel
    TopCenter = 0b100000000000,

    /// Top front left channel
    TopFrontLeft = 0b1000000000000,

    /// Top front center channel
    TopFrontCenter = 0b10000000000000,

    /// Top front right channel
    TopFrontRight = 0b100000000000000,

    /// Top rear left channel
    TopRearLeft = 0b1000000000000000,

    /// Top rear center channel
    TopRearCenter = 0b10000000000000000,

    /// Top rear right channel
    TopRearRight = 0b100000000000000000,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::FrontLeft => "front left".fmt(f),
            Self::FrontRight => "front right".fmt(f),
            Self::FrontCenter => "front center".fmt(f),
            Self::Lfe => "LFE".fmt(f),
            Self::BackLeft => "back left".fmt(f),
            Self::BackRight => "back right".fmt(f),
            Self::FrontLeftOfCenter => "front left of center".fmt(f),
            Self::FrontRightOfCenter => "front right of center".fmt(f),
            Self::BackCenter => "back center".fmt(f),
            Self::SideLeft => "side left".fmt(f),
            Self::SideRight => "side right".fmt(f),
            Self::TopCenter => "top center".fmt(f),
            Self::TopFrontLeft => "top front left".fmt(f),
            Self::TopFrontCenter => "top front center".fmt(f),
            Self::TopFrontRight => "top front right".fmt(f),
            Self::TopRearLeft => "top rear left".fmt(f),
            Self::TopRearCenter => "top rear center".fmt(f),
            Self::TopRearRight => "top rear right".fmt(f),
        }
    }
}

/// A container's audio stream parameters
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Descriptor {
    /// Sample rate, in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
    /// Speaker assignment, possibly undefined
    pub channel_mask: ChannelMask,
    /// Bits per sample
    pub bits_per_sample: u32,
    /// Total PCM frames
    pub total_frames: u64,
}

impl Descriptor {
    /// Builds descriptor from its parts
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidChannelMask`] if the
    /// channel mask is defined but its channel count
    /// differs from `channels`.
    pub fn new(
        sample_rate: u32,
        channels: u16,
        channel_mask: ChannelMask,
        bits_per_sample: u32,
        total_frames: u64,
    ) -> Result<Self, Error> {
        channel_mask
            .valid_for(channels)
            .then_some(Self {
                sample_rate,
                channels,
                channel_mask,
                bits_per_sample,
                total_frames,
            })
            .ok_or(Error::InvalidChannelMask)
    }

    /// Returns total length of decoded stream, in bytes
    pub fn decoded_len(&self) -> u64 {
        self.total_frames * u64::from(self.channels) * u64::from(self.bits_per_sample.div_ceil(8))
    }

    /// Returns duration of stream
    pub fn duration(&self) -> std::time::Duration {
        const NANOS_PER_SEC: u64 = 1_000_000_000;

        match u64::from(self.sample_rate) {
            0 => std::time::Duration::ZERO,
            sample_rate => std::time::Duration::new(
                self.total_frames / sample_rate,
                u32::try_from(((self.total_frames % sample_rate) * NANOS_PER_SEC) / sample_rate)
                    .unwrap_or_default(),
            ),
        }
    }
}

/// A source of PCM frames
pub trait PcmReader {
    /// Sample rate, in Hz
    fn sample_rate(&self) -> u32;

    /// Channel count
    fn channels(&self) -> u16;

    /// Speaker assignment
    fn channel_mask(&self) -> ChannelMask;

    /// Bits per sample
    fn bits_per_sample(&self) -> u32;

    /// Reads up to `frames` PCM frames
    ///
    /// Returns an empty frame once the stream is exhausted,
    /// and a non-empty frame before then.
    fn read(&mut self, frames: usize) -> Result<Frame, Error>;
}

impl<P: PcmReader + ?Sized> PcmReader for &mut P {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn channels(&self) -> u16 {
        (**self).channels()
    }

    fn channel_mask(&self) -> ChannelMask {
        (**self).channel_mask()
    }

    fn bits_per_sample(&self) -> u32 {
        (**self).bits_per_sample()
    }

    fn read(&mut self, frames: usize) -> Result<Frame, Error> {
        (**self).read(frames)
    }
}

/// A PCM reader over frames held in memory
///
/// # Example
///
/// ```
/// use audio_containers::audio::{Frame, MemoryPcmReader, PcmReader};
///
/// let frame = Frame::from_interleaved(1, 8, &[1, 2, 3, 4, 5]);
/// let mut reader = MemoryPcmReader::new(44100, frame);
///
/// assert_eq!(reader.read(2).unwrap().channel(0), &[1, 2]);
/// assert_eq!(reader.read(10).unwrap().channel(0), &[3, 4, 5]);
/// assert!(reader.read(10).unwrap().is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct MemoryPcmReader {
    sample_rate: u32,
    channel_mask: ChannelMask,
    frame: Frame,
    position: usize,
}

impl MemoryPcmReader {
    /// Wraps frame with the conventional channel mask for its channel count
    pub fn new(sample_rate: u32, frame: Frame) -> Self {
        Self {
            sample_rate,
            channel_mask: ChannelMask::from_channels(frame.channel_count() as u16),
            frame,
            position: 0,
        }
    }

    /// Assigns a specific channel mask
    pub fn with_channel_mask(self, channel_mask: ChannelMask) -> Self {
        Self {
            channel_mask,
            ..self
        }
    }
}

impl PcmReader for MemoryPcmReader {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.frame.channel_count() as u16
    }

    fn channel_mask(&self) -> ChannelMask {
        self.channel_mask
    }

    fn bits_per_sample(&self) -> u32 {
        self.frame.bits_per_sample()
    }

    fn read(&mut self, frames: usize) -> Result<Frame, Error> {
        let start = self.position;
        self.position = (start + frames).min(self.frame.pcm_frames());
        Ok(self.frame.slice(start, self.position))
    }
}

/// An MD5 digest of PCM data
///
/// The digest is always calculated in terms of
/// little-endian, signed, byte-aligned values
/// so that the same audio held in different containers
/// produces the same digest.
pub struct PcmDigest {
    context: md5::Context,
    frames: u64,
}

impl Default for PcmDigest {
    fn default() -> Self {
        Self {
            context: md5::Context::new(),
            frames: 0,
        }
    }
}

impl PcmDigest {
    /// Adds frame's samples to digest
    pub fn update(&mut self, frame: &Frame) {
        self.context.consume(
            frame.to_bytes::<crate::byteorder::LittleEndian>(Signedness::Signed),
        );
        self.frames += frame.pcm_frames() as u64;
    }

    /// Total PCM frames digested so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Returns final digest
    pub fn finalize(self) -> [u8; 16] {
        self.context.compute().0
    }

    /// Digests the whole of a PCM reader's stream
    ///
    /// Returns digest and total PCM frames read
    pub fn of_reader<R: PcmReader + ?Sized>(
        reader: &mut R,
        frames_per_read: usize,
    ) -> Result<([u8; 16], u64), Error> {
        let mut digest = Self::default();
        loop {
            let frame = reader.read(frames_per_read)?;
            if frame.is_empty() {
                let frames = digest.frames();
                break Ok((digest.finalize(), frames));
            }
            digest.update(&frame);
        }
    }
}

#[test]
fn test_frame_bytes() {
    use crate::byteorder::{BigEndian, LittleEndian};

    let frame = Frame::from_interleaved(2, 16, &[0x0102, -2, 0x0304, 0x7FFF]);
    let be = frame.to_bytes::<BigEndian>(Signedness::Signed);
    assert_eq!(be, [0x01, 0x02, 0xFF, 0xFE, 0x03, 0x04, 0x7F, 0xFF]);

    let mut decoded = Frame::empty(2, 16);
    decoded.fill_from_buf::<BigEndian>(&be, Signedness::Signed);
    assert_eq!(decoded, frame);

    let le = frame.to_bytes::<LittleEndian>(Signedness::Signed);
    assert_eq!(le, [0x02, 0x01, 0xFE, 0xFF, 0x04, 0x03, 0xFF, 0x7F]);
}

#[test]
fn test_frame_append() {
    let mut frame = Frame::empty(2, 16);
    frame
        .append(&Frame::from_interleaved(2, 16, &[1, 2, 3, 4]))
        .unwrap();
    frame
        .append(&Frame::from_interleaved(2, 16, &[5, 6]))
        .unwrap();
    assert_eq!(frame.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6]);
    assert!(matches!(
        frame.append(&Frame::from_interleaved(1, 16, &[7])),
        Err(Error::PcmMismatch)
    ));
}

#[test]
fn test_descriptor() {
    let descriptor = Descriptor::new(44100, 2, ChannelMask::from_channels(2), 24, 66150).unwrap();
    assert_eq!(descriptor.decoded_len(), 66150 * 2 * 3);
    assert_eq!(descriptor.duration(), std::time::Duration::from_millis(1500));

    assert!(matches!(
        Descriptor::new(44100, 3, ChannelMask::from_channels(2), 16, 0),
        Err(Error::InvalidChannelMask)
    ));
    assert!(Descriptor::new(44100, 3, ChannelMask::UNDEFINED, 16, 0).is_ok());
}
