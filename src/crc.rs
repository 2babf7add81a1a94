// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Running checksums over streams

/// A checksum which is updated one run of bytes at a time
pub trait Checksum: Default {
    /// The checksum's final value
    type Output: Copy + Eq + std::fmt::Debug;

    /// Updates checksum with the given bytes
    fn update(&mut self, bytes: &[u8]);

    /// Returns checksum of all bytes so far
    fn checksum(&self) -> Self::Output;
}

const fn ogg_crc_table() -> [u32; 256] {
    const POLY: u32 = 0x04C1_1DB7;

    let mut table = [0; 256];
    let mut i = 0;
    while i < table.len() {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static OGG_CRC_TABLE: [u32; 256] = ogg_crc_table();

/// The CRC-32 used by Ogg pages
///
/// Polynomial 0x04C11DB7, initial value 0,
/// no reflection and no final XOR.
///
/// # Example
///
/// ```
/// use audio_containers::crc::{Checksum, OggCrc};
///
/// let mut crc = OggCrc::default();
/// crc.update(b"123456789");
/// assert_eq!(crc.checksum(), 0x89A1_897F);
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct OggCrc(u32);

impl Checksum for OggCrc {
    type Output = u32;

    fn update(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 = (self.0 << 8) ^ OGG_CRC_TABLE[usize::from((self.0 >> 24) as u8 ^ byte)];
        }
    }

    #[inline]
    fn checksum(&self) -> u32 {
        self.0
    }
}

/// A reader which updates a checksum with every byte read
pub struct CrcReader<R, C> {
    reader: R,
    checksum: C,
}

impl<R, C: Checksum> CrcReader<R, C> {
    /// Wraps reader with a fresh checksum
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            checksum: C::default(),
        }
    }

    /// Returns the running checksum
    pub fn checksum(&self) -> &C {
        &self.checksum
    }

    /// Feeds bytes to the checksum which did not come from the reader
    ///
    /// Some formats checksum a structure with one of
    /// its fields replaced, such as Ogg pages
    /// whose CRC field counts as zeroes.
    pub fn substitute(&mut self, bytes: &[u8]) {
        self.checksum.update(bytes);
    }

    /// Returns the wrapped reader, bypassing the checksum
    pub fn bypass(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Returns wrapped reader and final checksum
    pub fn into_parts(self) -> (R, C) {
        (self.reader, self.checksum)
    }
}

impl<R: std::io::Read, C: Checksum> std::io::Read for CrcReader<R, C> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf).inspect(|amt_read| {
            self.checksum.update(&buf[0..*amt_read]);
        })
    }
}

/// A writer which updates a checksum with every byte written
pub struct CrcWriter<W, C> {
    writer: W,
    checksum: C,
}

impl<W, C: Checksum> CrcWriter<W, C> {
    /// Wraps writer with a fresh checksum
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            checksum: C::default(),
        }
    }

    /// Returns the running checksum
    pub fn checksum(&self) -> &C {
        &self.checksum
    }

    /// Returns wrapped writer and final checksum
    pub fn into_parts(self) -> (W, C) {
        (self.writer, self.checksum)
    }
}

impl<W: std::io::Write, C: Checksum> std::io::Write for CrcWriter<W, C> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf).inspect(|amt_written| {
            self.checksum.update(&buf[0..*amt_written]);
        })
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

#[test]
fn test_crc_wrappers() {
    use std::io::{Read, Write};

    let data = b"OggS checksummed bytes";

    let mut r: CrcReader<_, OggCrc> = CrcReader::new(data.as_slice());
    let mut buf = vec![];
    r.read_to_end(&mut buf).unwrap();

    let mut w: CrcWriter<_, OggCrc> = CrcWriter::new(vec![]);
    w.write_all(data).unwrap();

    let mut direct = OggCrc::default();
    direct.update(data);

    assert_eq!(r.checksum().checksum(), direct.checksum());
    assert_eq!(w.checksum().checksum(), direct.checksum());
    assert_eq!(w.into_parts().0, buf);
}
