// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Byte order and signedness for PCM samples
//!
//! AIFF stores samples big-endian and always signed.
//! RIFF WAVE stores samples little-endian,
//! signed except for 8-bit samples which are unsigned.

/// Whether samples are stored signed or offset-binary
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Signedness {
    /// Two's complement samples
    Signed,
    /// Unsigned samples, offset by half their range
    Unsigned,
}

impl Signedness {
    /// WAVE signedness for the given bits-per-sample
    pub fn wave(bits_per_sample: u32) -> Self {
        match bits_per_sample {
            1..=8 => Self::Unsigned,
            _ => Self::Signed,
        }
    }
}

/// Sample byte order
pub trait Endianness {
    /// Iterates over a sample's byte indexes,
    /// from most significant to least significant
    fn significance(width: usize) -> impl DoubleEndedIterator<Item = usize>;

    /// Converts 1 to 4 bytes to a single sample
    fn bytes_to_sample(bytes: &[u8], signedness: Signedness) -> i32 {
        debug_assert!((1..=4).contains(&bytes.len()));

        let bits = bytes.len() as u32 * 8;
        let unsigned = Self::significance(bytes.len())
            .fold(0u32, |acc, i| (acc << 8) | u32::from(bytes[i]));

        match signedness {
            Signedness::Signed if bits == 32 => unsigned as i32,
            Signedness::Signed if unsigned & (1 << (bits - 1)) == 0 => unsigned as i32,
            Signedness::Signed => (i64::from(unsigned) - (1i64 << bits)) as i32,
            Signedness::Unsigned => (i64::from(unsigned) - (1i64 << (bits - 1))) as i32,
        }
    }

    /// Converts a single sample to 1 to 4 bytes
    fn sample_to_bytes(sample: i32, bytes: &mut [u8], signedness: Signedness) {
        debug_assert!((1..=4).contains(&bytes.len()));

        let bits = bytes.len() as u32 * 8;
        let unsigned = match signedness {
            Signedness::Signed => sample as u32,
            Signedness::Unsigned => (i64::from(sample) + (1i64 << (bits - 1))) as u32,
        };

        for (shift, i) in Self::significance(bytes.len()).rev().enumerate() {
            bytes[i] = (unsigned >> (shift * 8)) as u8;
        }
    }
}

/// Little-endian byte order
#[derive(Copy, Clone, Debug)]
pub struct LittleEndian;

impl Endianness for LittleEndian {
    #[inline]
    fn significance(width: usize) -> impl DoubleEndedIterator<Item = usize> {
        (0..width).rev()
    }
}

/// Big-endian byte order
#[derive(Copy, Clone, Debug)]
pub struct BigEndian;

impl Endianness for BigEndian {
    #[inline]
    fn significance(width: usize) -> impl DoubleEndedIterator<Item = usize> {
        0..width
    }
}

#[allow(unused)]
fn test_endianness<F: bitstream_io::Endianness, E: Endianness>() {
    use bitstream_io::{BitWrite, BitWriter};

    // 8 bits-per-sample to bytes
    for i in i8::MIN..=i8::MAX {
        let mut buf1 = [0; 1];
        let mut w: BitWriter<_, F> = BitWriter::new(buf1.as_mut_slice());
        w.write::<8, i8>(i).unwrap();

        let mut buf2 = [0; 1];
        E::sample_to_bytes(i.into(), &mut buf2, Signedness::Signed);
        assert_eq!(buf1, buf2);
        assert_eq!(E::bytes_to_sample(&buf2, Signedness::Signed), i32::from(i));
    }

    // 16 bits-per-sample to bytes
    for i in i16::MIN..=i16::MAX {
        let mut buf1 = [0; 2];
        let mut w: BitWriter<_, F> = BitWriter::new(buf1.as_mut_slice());
        w.write::<16, i16>(i).unwrap();

        let mut buf2 = [0; 2];
        E::sample_to_bytes(i.into(), &mut buf2, Signedness::Signed);
        assert_eq!(buf1, buf2);
        assert_eq!(E::bytes_to_sample(&buf2, Signedness::Signed), i32::from(i));
    }

    // 24 bits-per-sample to bytes, sampled sparsely
    for i in ((-1 << 23)..=((1 << 23) - 1)).step_by(97) {
        let mut buf1 = [0; 3];
        let mut w: BitWriter<_, F> = BitWriter::new(buf1.as_mut_slice());
        w.write::<24, i32>(i).unwrap();

        let mut buf2 = [0; 3];
        E::sample_to_bytes(i, &mut buf2, Signedness::Signed);
        assert_eq!(buf1, buf2);
        assert_eq!(E::bytes_to_sample(&buf2, Signedness::Signed), i);
    }

    for i in [i32::MIN, -1, 0, 1, i32::MAX] {
        let mut buf = [0; 4];
        E::sample_to_bytes(i, &mut buf, Signedness::Signed);
        assert_eq!(E::bytes_to_sample(&buf, Signedness::Signed), i);
    }
}

#[test]
fn test_samples_le() {
    test_endianness::<bitstream_io::LittleEndian, LittleEndian>()
}

#[test]
fn test_samples_be() {
    test_endianness::<bitstream_io::BigEndian, BigEndian>()
}

#[test]
fn test_unsigned_samples() {
    let mut buf = [0; 1];
    LittleEndian::sample_to_bytes(-128, &mut buf, Signedness::Unsigned);
    assert_eq!(buf, [0x00]);
    LittleEndian::sample_to_bytes(0, &mut buf, Signedness::Unsigned);
    assert_eq!(buf, [0x80]);
    LittleEndian::sample_to_bytes(127, &mut buf, Signedness::Unsigned);
    assert_eq!(buf, [0xFF]);

    for i in -128..=127 {
        LittleEndian::sample_to_bytes(i, &mut buf, Signedness::Unsigned);
        assert_eq!(LittleEndian::bytes_to_sample(&buf, Signedness::Unsigned), i);
    }
}
