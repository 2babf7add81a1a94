// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Reading and writing options

/// Options shared by container readers and writers
///
/// # Example
///
/// ```
/// use audio_containers::Options;
///
/// let options = Options::default()
///     .frames_per_read(1024)
///     .id3v2_padding(0);
///
/// assert_eq!(options.get_frames_per_read(), 1024);
/// assert_eq!(options.get_id3v2_padding(), 0);
/// assert!(options.get_verify_checksums());
/// ```
#[derive(Copy, Clone, Debug)]
pub struct Options {
    frames_per_read: usize,
    verify_checksums: bool,
    id3v2_padding: u32,
    in_memory_limit: u32,
}

impl Options {
    /// Number of PCM frames to request per read
    /// when converting from one container to another
    pub fn frames_per_read(self, frames_per_read: usize) -> Self {
        Self {
            frames_per_read: frames_per_read.max(1),
            ..self
        }
    }

    /// Whether to verify Ogg page checksums on read
    pub fn verify_checksums(self, verify_checksums: bool) -> Self {
        Self {
            verify_checksums,
            ..self
        }
    }

    /// Bytes of padding to leave after ID3v2 frames
    ///
    /// Padding allows later tag updates
    /// to be made without rewriting the whole file.
    pub fn id3v2_padding(self, id3v2_padding: u32) -> Self {
        Self {
            id3v2_padding,
            ..self
        }
    }

    /// Chunks larger than this are referenced by file offset
    /// rather than loaded into memory
    pub fn in_memory_limit(self, in_memory_limit: u32) -> Self {
        Self {
            in_memory_limit,
            ..self
        }
    }

    /// Returns PCM frames per read
    pub fn get_frames_per_read(&self) -> usize {
        self.frames_per_read
    }

    /// Returns whether Ogg checksums are verified
    pub fn get_verify_checksums(&self) -> bool {
        self.verify_checksums
    }

    /// Returns ID3v2 padding size, in bytes
    pub fn get_id3v2_padding(&self) -> u32 {
        self.id3v2_padding
    }

    /// Returns in-memory chunk size limit, in bytes
    pub fn get_in_memory_limit(&self) -> u32 {
        self.in_memory_limit
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            frames_per_read: 4096,
            verify_checksums: true,
            id3v2_padding: 1024,
            in_memory_limit: 1 << 20,
        }
    }
}
