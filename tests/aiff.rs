// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use audio_containers::{
    Error, Options,
    aiff::{self, AiffReader, AiffWriter},
    audio::{Channel, ChannelMask, Frame, MemoryPcmReader, PcmDigest, PcmReader},
    chunk::{Chunk, ChunkId},
    id3v2::Id3v2Tag,
};
use std::io::Cursor;

fn read_all<R: PcmReader>(pcm: &mut R) -> Frame {
    let mut all = Frame::empty(usize::from(pcm.channels()), pcm.bits_per_sample());
    loop {
        let frame = pcm.read(37).unwrap();
        if frame.is_empty() {
            break all;
        }
        all.append(&frame).unwrap();
    }
}

fn noise(channels: usize, bits: u32, frames: usize) -> Frame {
    let max = (1i64 << (bits - 1)) - 1;
    let min = -(1i64 << (bits - 1));
    let samples = (0..channels * frames)
        .map(|_| fastrand::i64(min..=max) as i32)
        .collect::<Vec<_>>();
    Frame::from_interleaved(channels, bits, &samples)
}

#[test]
fn test_stereo_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stereo.aiff");

    let frame = noise(2, 16, 100);
    aiff::from_pcm(
        &path,
        &mut MemoryPcmReader::new(44100, frame.clone()),
        Options::default(),
    )
    .unwrap();

    // FORM header + COMM chunk + SSND header and offsets + PCM data
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 12 + (8 + 18) + (8 + 8) + 400);
    assert_eq!(&bytes[0..4], b"FORM");
    assert_eq!(
        u32::from_be_bytes(bytes[4..8].try_into().unwrap()) as usize,
        bytes.len() - 8
    );
    assert_eq!(&bytes[8..12], b"AIFF");

    let reader = AiffReader::open(&path).unwrap();
    assert_eq!(reader.sample_rate(), 44100);
    assert_eq!(reader.channels(), 2);
    assert_eq!(reader.bits_per_sample(), 16);
    assert_eq!(reader.total_frames(), 100);
    assert_eq!(
        reader.channel_mask(),
        [Channel::FrontLeft, Channel::FrontRight]
            .into_iter()
            .collect::<ChannelMask>()
    );
    assert_eq!(read_all(&mut reader.to_pcm().unwrap()), frame);
}

#[test]
fn test_bit_depths() {
    for bits in [8, 12, 16, 20, 24, 32] {
        let mut file = Cursor::new(vec![]);
        let frame = noise(1, bits, 51);

        let mut writer =
            AiffWriter::new(&mut file, 22050, 1, ChannelMask::from_channels(1), bits).unwrap();
        writer.write(&frame).unwrap();
        writer.finalize().unwrap();

        file.set_position(0);
        let reader = AiffReader::new(file).unwrap();
        assert_eq!(reader.bits_per_sample(), bits);
        assert_eq!(read_all(&mut reader.to_pcm().unwrap()), frame);
    }
}

#[test]
fn test_odd_padding() {
    // 8-bit mono with an odd frame count leaves an odd SSND body
    let mut file = Cursor::new(vec![]);
    let frame = noise(1, 8, 7);

    let mut writer = AiffWriter::new(&mut file, 8000, 1, ChannelMask::UNDEFINED, 8).unwrap();
    writer.write(&frame).unwrap();
    writer
        .finalize_with_chunks(&[Chunk::new(ChunkId::new(*b"ANNO").unwrap(), b"x".to_vec()).unwrap()])
        .unwrap();

    let bytes = file.into_inner();
    assert_eq!(bytes.len() % 2, 0);
    assert_eq!(bytes.len(), 12 + (8 + 18) + (8 + 8 + 7 + 1) + (8 + 1 + 1));

    audio_containers::chunk::verify::<audio_containers::chunk::Form, _>(Cursor::new(&bytes))
        .unwrap();

    let reader = AiffReader::new(Cursor::new(bytes)).unwrap();
    assert!(
        reader
            .chunks()
            .iter()
            .any(|c| c.id == ChunkId::new(*b"ANNO").unwrap())
    );
    assert_eq!(read_all(&mut reader.to_pcm().unwrap()), frame);
}

#[test]
fn test_multichannel_round_trip() {
    for channels in [3u16, 4, 6] {
        let mut file = Cursor::new(vec![]);

        // each channel holds a distinct constant
        let samples = (0..10)
            .flat_map(|_| (0..i32::from(channels)).map(|c| (c + 1) * 100))
            .collect::<Vec<_>>();
        let frame = Frame::from_interleaved(usize::from(channels), 16, &samples);

        let mut writer =
            AiffWriter::new(&mut file, 48000, channels, ChannelMask::UNDEFINED, 16).unwrap();
        writer.write(&frame).unwrap();
        writer.finalize().unwrap();

        // AIFF's own channel assignment is reported on read
        file.set_position(0);
        let reader = AiffReader::new(&mut file).unwrap();
        assert_eq!(reader.channel_mask().len(), u32::from(channels));
        let mask = reader.channel_mask();

        // so writing with that assignment round-trips through reordering
        let mut file = Cursor::new(vec![]);
        let mut writer = AiffWriter::new(&mut file, 48000, channels, mask, 16).unwrap();
        writer.write(&frame).unwrap();
        writer.finalize().unwrap();

        file.set_position(0);
        let reader = AiffReader::new(file).unwrap();
        assert_eq!(reader.channel_mask(), mask);
        assert_eq!(read_all(&mut reader.to_pcm().unwrap()), frame);
    }
}

#[test]
fn test_unsupported_channel_mask() {
    // quadraphonic speakers differ from AIFF's 4-channel layout
    let quad = [
        Channel::FrontLeft,
        Channel::FrontRight,
        Channel::BackLeft,
        Channel::BackRight,
    ]
    .into_iter()
    .collect::<ChannelMask>();

    assert!(matches!(
        AiffWriter::new(Cursor::new(vec![]), 44100, 4, quad, 16),
        Err(Error::InvalidChannelMask)
    ));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quad.aiff");
    let samples = (0..10)
        .flat_map(|i| (0..4).map(move |c| c * 100 + i))
        .collect::<Vec<_>>();
    let frame = Frame::from_interleaved(4, 16, &samples);

    let mut pcm = MemoryPcmReader::new(44100, frame.clone()).with_channel_mask(quad);
    assert!(aiff::from_pcm(&path, &mut pcm, Options::default()).is_err());
    assert!(!path.exists());

    // an unassigned layout keeps its channel order
    let mut file = Cursor::new(vec![]);
    let mut writer =
        AiffWriter::new(&mut file, 44100, 4, ChannelMask::UNDEFINED, 16).unwrap();
    writer.write(&frame).unwrap();
    writer.finalize().unwrap();

    file.set_position(0);
    let reader = AiffReader::new(file).unwrap();
    assert_ne!(reader.channel_mask(), quad);
    let read = read_all(&mut reader.to_pcm().unwrap());
    assert_eq!(read.channel(1)[0], 100);
    assert_eq!(read.channel(2)[0], 200);
    assert_eq!(read, frame);
}

#[test]
fn test_split_reassemble() {
    let mut file = Cursor::new(vec![]);
    let mut writer = AiffWriter::new_with_chunks(
        &mut file,
        44100,
        2,
        ChannelMask::from_channels(2),
        24,
        vec![Chunk::new(ChunkId::new(*b"NAME").unwrap(), b"Song".to_vec()).unwrap()],
    )
    .unwrap();
    writer.write(&noise(2, 24, 25)).unwrap();
    writer
        .finalize_with_chunks(&[Chunk::new(ChunkId::new(*b"AUTH").unwrap(), b"Me!".to_vec()).unwrap()])
        .unwrap();
    let original = file.into_inner();

    let mut reader = AiffReader::new(Cursor::new(original.clone())).unwrap();
    let split = reader.split().unwrap();
    assert_eq!(split.head.len() as u64, split.payload.start);
    assert_eq!(split.payload.end - split.payload.start, 25 * 2 * 3);

    let payload = &original[split.payload.start as usize..split.payload.end as usize];
    let mut rebuilt = vec![];
    let written = aiff::reassemble(&mut rebuilt, &split.head, payload, &split.tail).unwrap();
    assert_eq!(written, original.len() as u64);
    assert_eq!(rebuilt, original);

    // a payload of the wrong length no longer matches the FORM size
    assert!(matches!(
        aiff::reassemble(&mut vec![], &split.head, &payload[1..], &split.tail),
        Err(Error::ChunkSizeMismatch)
    ));
}

#[test]
fn test_not_aiff() {
    let mut wave_form = b"FORM".to_vec();
    wave_form.extend(4u32.to_be_bytes());
    wave_form.extend(b"WAVE");
    assert!(matches!(
        AiffReader::new(Cursor::new(wave_form)),
        Err(Error::InvalidAiff(_))
    ));

    assert!(matches!(
        AiffReader::new(Cursor::new(b"RIFF".to_vec())),
        Err(Error::InvalidAiff(_))
    ));

    // COMM without SSND
    let mut file = Cursor::new(vec![]);
    let mut writer = AiffWriter::new(&mut file, 44100, 1, ChannelMask::UNDEFINED, 16).unwrap();
    writer.write(&noise(1, 16, 4)).unwrap();
    writer.finalize().unwrap();
    let mut bytes = file.into_inner();
    let comm_end = 12 + 8 + 18;
    bytes.truncate(comm_end);
    bytes[4..8].copy_from_slice(&(comm_end as u32 - 8).to_be_bytes());
    assert!(matches!(
        AiffReader::new(Cursor::new(bytes)),
        Err(Error::InvalidAiff("SSND chunk not found"))
    ));
}

#[test]
fn test_truncated_ssnd() {
    let mut file = Cursor::new(vec![]);
    let mut writer = AiffWriter::new(&mut file, 44100, 2, ChannelMask::UNDEFINED, 16).unwrap();
    writer.write(&noise(2, 16, 50)).unwrap();
    writer.finalize().unwrap();

    let mut bytes = file.into_inner();
    bytes.truncate(bytes.len() - 10);
    assert!(AiffReader::new(Cursor::new(bytes)).is_err());
}

#[test]
fn test_writer_cleanup() {
    struct FailingPcm {
        frames_left: usize,
    }

    impl PcmReader for FailingPcm {
        fn sample_rate(&self) -> u32 {
            44100
        }

        fn channels(&self) -> u16 {
            2
        }

        fn channel_mask(&self) -> ChannelMask {
            ChannelMask::from_channels(2)
        }

        fn bits_per_sample(&self) -> u32 {
            16
        }

        fn read(&mut self, frames: usize) -> Result<Frame, Error> {
            match self.frames_left.checked_sub(frames) {
                Some(left) => {
                    self.frames_left = left;
                    Ok(Frame::from_interleaved(2, 16, &vec![0; frames * 2]))
                }
                None => Err(Error::Decoding("source failed".into())),
            }
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("failed.aiff");

    let result = aiff::from_pcm(
        &path,
        &mut FailingPcm { frames_left: 10 },
        Options::default().frames_per_read(4),
    );
    assert!(matches!(result, Err(Error::Encoding(reason)) if reason == "source failed"));
    assert!(!path.exists());

    // mismatched frames fail without leaving a partial file
    let mut writer = AiffWriter::create(&path, 44100, 2, ChannelMask::UNDEFINED, 16).unwrap();
    assert!(path.exists());
    assert!(matches!(
        writer.write(&Frame::from_interleaved(1, 16, &[0])),
        Err(Error::PcmMismatch)
    ));
    drop(writer);
    assert!(!path.exists());
}

#[test]
fn test_id3v2_chunk() {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tagged.aiff");

    let frame = noise(2, 16, 64);
    aiff::from_pcm(
        &path,
        &mut MemoryPcmReader::new(44100, frame.clone()),
        Options::default(),
    )
    .unwrap();
    assert_eq!(AiffReader::open(&path).unwrap().id3v2().unwrap(), None);

    let mut tag = Id3v2Tag::default();
    tag.set_text("TIT2", "Title");
    tag.set_text("TPE1", "Artist");
    aiff::update_id3v2(&path, Some(&tag), Options::default()).unwrap();

    let reader = AiffReader::open(&path).unwrap();
    let read = reader.id3v2().unwrap().unwrap();
    assert_eq!(read.get_text("TIT2"), Some("Title"));
    assert_eq!(read.get_text("TPE1"), Some("Artist"));
    assert_eq!(
        reader.chunks().iter().filter(|c| c.id == ChunkId::ID3).count(),
        1
    );
    assert_eq!(read_all(&mut reader.to_pcm().unwrap()), frame);

    // replacing the tag keeps a single chunk
    tag.set_text("TIT2", "New Title");
    aiff::update_id3v2(&path, Some(&tag), Options::default()).unwrap();
    let reader = AiffReader::open(&path).unwrap();
    assert_eq!(
        reader.id3v2().unwrap().unwrap().get_text("TIT2"),
        Some("New Title")
    );
    assert_eq!(
        reader.chunks().iter().filter(|c| c.id == ChunkId::ID3).count(),
        1
    );

    aiff::update_id3v2(&path, None, Options::default()).unwrap();
    let reader = AiffReader::open(&path).unwrap();
    assert_eq!(reader.id3v2().unwrap(), None);

    let (digest, frames) = PcmDigest::of_reader(&mut reader.to_pcm().unwrap(), 4096).unwrap();
    let (expected, _) =
        PcmDigest::of_reader(&mut MemoryPcmReader::new(44100, frame), 4096).unwrap();
    assert_eq!(frames, 64);
    assert_eq!(digest, expected);
}
