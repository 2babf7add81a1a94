// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! PCM exchanged with external decoder and encoder processes
//!
//! Compressed formats are decoded and encoded by
//! separate programs which exchange raw PCM over pipes.
//! PCM on those pipes is interleaved, signed and little-endian.

use crate::audio::{ChannelMask, Frame, PcmReader};
use crate::byteorder::{LittleEndian, Signedness};
use crate::{Error, Options};
use std::io::{Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// A PCM reader fed by an external decoder's standard output
///
/// Once the decoder's output is exhausted, its exit status is checked.
/// A decoder which fails is reported as [`Error::Decoding`].
pub struct ExternalPcmReader {
    child: Child,
    stdout: Option<ChildStdout>,
    sample_rate: u32,
    channels: u16,
    channel_mask: ChannelMask,
    bits_per_sample: u32,
}

impl ExternalPcmReader {
    /// Spawns decoder whose output has the given parameters
    pub fn spawn(
        command: &mut Command,
        sample_rate: u32,
        channels: u16,
        channel_mask: ChannelMask,
        bits_per_sample: u32,
    ) -> Result<Self, Error> {
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|err| Error::Decoding(format!("unable to start decoder: {err}")))?;

        Self::new(child, sample_rate, channels, channel_mask, bits_per_sample)
    }

    /// Wraps already-running decoder whose standard output is piped
    pub fn new(
        mut child: Child,
        sample_rate: u32,
        channels: u16,
        channel_mask: ChannelMask,
        bits_per_sample: u32,
    ) -> Result<Self, Error> {
        if !channel_mask.valid_for(channels) {
            return Err(Error::InvalidChannelMask);
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Decoding("decoder output not piped".into()))?;

        Ok(Self {
            child,
            stdout: Some(stdout),
            sample_rate,
            channels,
            channel_mask,
            bits_per_sample,
        })
    }

    fn finish(&mut self) -> Result<(), Error> {
        // closing our end lets a decoder blocked on output exit
        self.stdout = None;

        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            log::debug!("decoder exited with {status}");
            Err(Error::Decoding(format!("external decoder failed with {status}")))
        }
    }
}

impl PcmReader for ExternalPcmReader {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn channel_mask(&self) -> ChannelMask {
        self.channel_mask
    }

    fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    fn read(&mut self, frames: usize) -> Result<Frame, Error> {
        let channels = usize::from(self.channels);
        let mut frame = Frame::empty(channels, self.bits_per_sample);

        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(frame);
        };

        let wanted = frames * frame.bytes_per_sample() * channels;
        let mut buf = Vec::with_capacity(wanted);
        stdout
            .take(wanted as u64)
            .read_to_end(&mut buf)
            .map_err(|err| Error::Decoding(err.to_string()))?;

        if buf.len() < wanted {
            // output exhausted
            if buf.len() % (frame.bytes_per_sample() * channels).max(1) != 0 {
                log::warn!("decoder output ends with a partial PCM frame");
            }
            self.finish()?;
        }

        frame.fill_from_buf::<LittleEndian>(&buf, Signedness::Signed);
        Ok(frame)
    }
}

impl Drop for ExternalPcmReader {
    fn drop(&mut self) {
        if self.stdout.is_some() {
            // decoder abandoned before its output was exhausted
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// A PCM writer which feeds an external encoder's standard input
///
/// Any failure, including the encoder exiting unsuccessfully,
/// is reported as [`Error::Encoding`].
pub struct ExternalPcmWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    channels: u16,
    bits_per_sample: u32,
}

impl ExternalPcmWriter {
    /// Spawns encoder which takes PCM of the given parameters
    pub fn spawn(command: &mut Command, channels: u16, bits_per_sample: u32) -> Result<Self, Error> {
        let child = command
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|err| Error::Encoding(format!("unable to start encoder: {err}")))?;

        Self::new(child, channels, bits_per_sample)
    }

    /// Wraps already-running encoder whose standard input is piped
    pub fn new(mut child: Child, channels: u16, bits_per_sample: u32) -> Result<Self, Error> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Encoding("encoder input not piped".into()))?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            channels,
            bits_per_sample,
        })
    }

    /// Writes frame to encoder
    ///
    /// # Errors
    ///
    /// Returns [`Error::PcmMismatch`] if the frame's
    /// parameters differ from the encoder's.
    pub fn write(&mut self, frame: &Frame) -> Result<(), Error> {
        if frame.channel_count() != usize::from(self.channels)
            || frame.bits_per_sample() != self.bits_per_sample
        {
            return Err(Error::PcmMismatch);
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(Error::Encoding("encoder already finished".into()));
        };

        match stdin.write_all(&frame.to_bytes::<LittleEndian>(Signedness::Signed)) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err.into())),
        }
    }

    /// Closes encoder's input and waits for it to exit
    pub fn finalize(mut self) -> Result<(), Error> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), Error> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush()?;
        }

        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            log::debug!("encoder exited with {status}");
            Err(Error::Encoding("external encoder failed".into()))
        }
    }

    // an encoder which has exited early is the more useful error
    fn fail(&mut self, err: Error) -> Error {
        match self.finish() {
            Ok(()) => err.into_encoding(),
            Err(finished) => finished.into_encoding(),
        }
    }
}

impl Drop for ExternalPcmWriter {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            let _ = self.child.wait();
        }
    }
}

/// Feeds all of a PCM reader's frames to an external encoder
///
/// Failures of the reader are also reported as [`Error::Encoding`].
pub fn encode<R>(command: &mut Command, pcm: &mut R, options: Options) -> Result<(), Error>
where
    R: PcmReader + ?Sized,
{
    let mut writer = ExternalPcmWriter::spawn(command, pcm.channels(), pcm.bits_per_sample())?;

    loop {
        let frame = pcm
            .read(options.get_frames_per_read())
            .map_err(|err| writer.fail(err))?;
        if frame.is_empty() {
            break writer.finalize();
        }
        writer.write(&frame)?;
    }
}
