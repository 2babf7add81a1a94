// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use audio_containers::{
    Error, Options,
    ogg::{self, Codec, OggFile, PacketReader, PageReader, PageWriter, paginate},
    vorbiscomment::VorbisComment,
};

const SERIAL: u32 = 0x0BADCAFE;
const TOTAL_FRAMES: i64 = 4410;

fn identification() -> Vec<u8> {
    let mut packet = b"\x01vorbis".to_vec();
    packet.extend(0u32.to_le_bytes()); // version
    packet.push(2); // channels
    packet.extend(44100u32.to_le_bytes());
    packet.extend(0i32.to_le_bytes()); // maximum bitrate
    packet.extend(128000i32.to_le_bytes()); // nominal bitrate
    packet.extend(0i32.to_le_bytes()); // minimum bitrate
    packet.push(0xB8); // block sizes
    packet.push(1); // framing
    packet
}

fn audio_packets() -> Vec<Vec<u8>> {
    (0..40)
        .map(|i| {
            std::iter::repeat_with(|| fastrand::u8(..))
                .take(100 + i * 37)
                .collect()
        })
        .collect()
}

// a minimal Vorbis stream with headers on their own pages
fn vorbis_stream(comment: &VorbisComment, audio: &[Vec<u8>]) -> Vec<u8> {
    let mut pages = paginate([identification()], SERIAL, 0, 0);
    pages[0].header.beginning_of_stream = true;

    let comment = Codec::Vorbis.build_comment(comment).unwrap();
    let setup = b"\x05vorbis setup".to_vec();
    pages.extend(paginate([comment, setup], SERIAL, 1, 0));

    let (first_half, second_half) = audio.split_at(audio.len() / 2);
    let sequence = pages.len() as u32;
    pages.extend(paginate(first_half, SERIAL, sequence, TOTAL_FRAMES / 2));
    let sequence = pages.len() as u32;
    pages.extend(paginate(second_half, SERIAL, sequence, TOTAL_FRAMES));
    if let Some(last) = pages.last_mut() {
        last.header.end_of_stream = true;
    }

    let mut w = PageWriter::new(Vec::new());
    for page in &pages {
        w.write(page).unwrap();
    }
    w.into_writer().unwrap()
}

fn comment() -> VorbisComment {
    let mut comment = VorbisComment::new("test vendor");
    comment.set("TITLE", "Title");
    comment.set("ARTIST", "Artist");
    comment
}

#[test]
fn test_read_stream() {
    let audio = audio_packets();
    let stream = vorbis_stream(&comment(), &audio);

    let file = OggFile::new(stream.as_slice()).unwrap();
    assert_eq!(file.codec(), Codec::Vorbis);
    assert_eq!(file.serial(), SERIAL);
    assert_eq!(file.descriptor().sample_rate, 44100);
    assert_eq!(file.descriptor().channels, 2);
    assert_eq!(file.descriptor().total_frames, TOTAL_FRAMES as u64);
    assert_eq!(file.comment(), &comment());

    let packets = PacketReader::new(stream.as_slice(), true)
        .skip(3)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(packets, audio);
}

#[test]
fn test_update_comment() {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.ogg");

    let audio = audio_packets();
    std::fs::write(&path, vorbis_stream(&comment(), &audio)).unwrap();

    // large enough to need several pages
    let mut updated = comment();
    updated.set("COMMENT", "x".repeat(100_000));
    updated.remove("ARTIST");
    ogg::update_comment(&path, &updated, Options::default()).unwrap();

    let file = OggFile::open(&path).unwrap();
    assert_eq!(file.comment(), &updated);
    assert_eq!(file.descriptor().total_frames, TOTAL_FRAMES as u64);

    let bytes = std::fs::read(&path).unwrap();

    // pages are renumbered consecutively and all checksums verify
    let pages = PageReader::new(bytes.as_slice(), true)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert!(pages.len() > 4);
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(page.header.sequence, i as u32);
        assert_eq!(page.header.serial, SERIAL);
    }
    assert!(pages[0].header.beginning_of_stream);
    assert!(pages.last().unwrap().header.end_of_stream);

    // setup and audio packets are untouched
    let packets = PacketReader::new(bytes.as_slice(), true)
        .skip(2)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(packets[0], b"\x05vorbis setup");
    assert_eq!(&packets[1..], audio.as_slice());

    // and shrinking the comment again works the same way
    ogg::update_comment(&path, &comment(), Options::default()).unwrap();
    assert_eq!(OggFile::open(&path).unwrap().comment(), &comment());
}

#[test]
fn test_shared_header_page() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.ogg");

    // comment, setup and first audio packet all on one page
    let mut pages = paginate([identification()], SERIAL, 0, 0);
    pages[0].header.beginning_of_stream = true;
    pages.extend(paginate(
        [
            Codec::Vorbis.build_comment(&comment()).unwrap(),
            b"\x05vorbis setup".to_vec(),
            vec![1, 2, 3],
        ],
        SERIAL,
        1,
        100,
    ));
    let mut w = PageWriter::new(Vec::new());
    pages.iter().try_for_each(|p| w.write(p)).unwrap();
    std::fs::write(&path, w.into_writer().unwrap()).unwrap();

    let original = std::fs::read(&path).unwrap();
    assert!(matches!(
        ogg::update_comment(&path, &VorbisComment::default(), Options::default()),
        Err(Error::InvalidOgg(_))
    ));
    assert_eq!(std::fs::read(&path).unwrap(), original);
}

#[test]
fn test_corruption_detected() {
    let stream = vorbis_stream(&comment(), &audio_packets());

    for _ in 0..100 {
        let mut corrupted = stream.clone();
        let byte = fastrand::usize(..corrupted.len());
        corrupted[byte] ^= 1 << fastrand::u8(0..8);

        assert!(
            PageReader::new(corrupted.as_slice(), true)
                .collect::<Result<Vec<_>, _>>()
                .is_err(),
            "corruption at byte {byte} not detected"
        );
    }

    // without verification, a corrupted body still reads
    let mut corrupted = stream.clone();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xFF;
    assert!(matches!(
        PageReader::new(corrupted.as_slice(), true).collect::<Result<Vec<_>, _>>(),
        Err(Error::ChecksumMismatch)
    ));
    assert!(
        PageReader::new(corrupted.as_slice(), false)
            .collect::<Result<Vec<_>, _>>()
            .is_ok()
    );
}

#[test]
fn test_opus_pre_skip() {
    let mut head = b"OpusHead".to_vec();
    head.push(1); // version
    head.push(1); // channels
    head.extend(312u16.to_le_bytes()); // pre-skip
    head.extend(48000u32.to_le_bytes());
    head.extend(0u16.to_le_bytes()); // gain
    head.push(0); // mapping family

    let comment = Codec::Opus { pre_skip: 312 }
        .build_comment(&VorbisComment::new("opus vendor"))
        .unwrap();

    let mut pages = paginate([head], 1, 0, 0);
    pages[0].header.beginning_of_stream = true;
    pages.extend(paginate([comment], 1, 1, 0));
    pages.extend(paginate([vec![0xFC; 50]], 1, 2, 48312));

    let mut w = PageWriter::new(Vec::new());
    pages.iter().try_for_each(|p| w.write(p)).unwrap();
    let stream = w.into_writer().unwrap();

    let file = OggFile::new(stream.as_slice()).unwrap();
    assert_eq!(file.codec(), Codec::Opus { pre_skip: 312 });
    assert_eq!(file.descriptor().sample_rate, 48000);
    assert_eq!(file.descriptor().channels, 1);
    assert_eq!(file.descriptor().total_frames, 48000);
    assert_eq!(file.comment().vendor_string, "opus vendor");
}
