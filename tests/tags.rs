// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use audio_containers::{
    UpdateStrategy,
    apev2::{self, ApeTag},
    id3v1::{self, Id3v1Tag},
    id3v2::{self, Id3v2Tag},
    metadata::{MetaField, Metadata, Tag},
};
use std::fs::File;
use std::path::Path;

fn audio_bytes(len: usize) -> Vec<u8> {
    std::iter::repeat_with(|| fastrand::u8(..)).take(len).collect()
}

fn id3v1_tag() -> Id3v1Tag {
    Id3v1Tag {
        title: "Title".into(),
        artist: "Artist".into(),
        track: Some(3),
        ..Id3v1Tag::default()
    }
}

fn open(path: &Path) -> File {
    File::open(path).unwrap()
}

#[test]
fn test_id3v1() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.mp3");
    let audio = audio_bytes(1000);
    std::fs::write(&path, &audio).unwrap();

    assert_eq!(Id3v1Tag::read(open(&path)).unwrap(), None);
    assert!(!id3v1::delete(&path).unwrap());

    let mut tag = id3v1_tag();
    id3v1::update(&path, &tag).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 1128);
    assert_eq!(Id3v1Tag::read(open(&path)).unwrap(), Some(tag.clone()));

    // overwritten in place
    tag.album = "Album".into();
    id3v1::update(&path, &tag).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 1128);
    assert_eq!(Id3v1Tag::read(open(&path)).unwrap(), Some(tag));

    assert!(id3v1::delete(&path).unwrap());
    assert_eq!(std::fs::read(&path).unwrap(), audio);
}

#[test]
fn test_apev2_update() {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.mp3");
    let audio = audio_bytes(2000);
    std::fs::write(&path, &audio).unwrap();
    id3v1::update(&path, &id3v1_tag()).unwrap();

    assert_eq!(ApeTag::read(open(&path)).unwrap(), None);

    // appended before the ID3v1 tag
    let mut tag = ApeTag::default();
    tag.set_text("Title", "Title").unwrap();
    tag.set_text("Artist", "Artist").unwrap();
    assert_eq!(apev2::update(&path, &tag).unwrap(), UpdateStrategy::Appended);

    let (read, location) = ApeTag::read(open(&path)).unwrap().unwrap();
    assert_eq!(read, tag);
    assert_eq!(location.offset, 2000);
    assert_eq!(location.size, tag.size());
    assert_eq!(Id3v1Tag::read(open(&path)).unwrap(), Some(id3v1_tag()));

    // a larger tag is written over the old one
    tag.set_text("Album", "A Much Longer Album Name").unwrap();
    assert_eq!(apev2::update(&path, &tag).unwrap(), UpdateStrategy::InPlace);
    let (read, location) = ApeTag::read(open(&path)).unwrap().unwrap();
    assert_eq!(read.get_text("Album"), Some("A Much Longer Album Name"));
    assert_eq!(location.offset, 2000);
    assert_eq!(
        std::fs::metadata(&path).unwrap().len(),
        2000 + tag.size() + 128
    );

    // a smaller tag rebuilds the file
    tag.remove("Album");
    tag.remove("Artist");
    assert_eq!(apev2::update(&path, &tag).unwrap(), UpdateStrategy::Rewritten);
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len() as u64, 2000 + tag.size() + 128);
    assert_eq!(&bytes[..2000], audio.as_slice());
    assert_eq!(ApeTag::read(open(&path)).unwrap().unwrap().0, tag);
    assert_eq!(Id3v1Tag::read(open(&path)).unwrap(), Some(id3v1_tag()));

    // deleting moves the ID3v1 tag back against the audio
    assert!(apev2::delete(&path).unwrap());
    assert!(!apev2::delete(&path).unwrap());
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..2000], audio.as_slice());
    assert_eq!(bytes.len(), 2128);
    assert_eq!(Id3v1Tag::read(open(&path)).unwrap(), Some(id3v1_tag()));
}

#[test]
fn test_apev2_delete_keeps_replaygain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.mpc");
    std::fs::write(&path, audio_bytes(500)).unwrap();

    let mut tag = ApeTag::default();
    tag.set_text("Title", "Title").unwrap();
    tag.set_text("REPLAYGAIN_TRACK_GAIN", "-6.00 dB").unwrap();
    apev2::update(&path, &tag).unwrap();

    assert!(apev2::delete(&path).unwrap());
    let (read, _) = ApeTag::read(open(&path)).unwrap().unwrap();
    assert_eq!(read.get_text("Title"), None);
    assert_eq!(read.get_text("REPLAYGAIN_TRACK_GAIN"), Some("-6.00 dB"));
}

#[test]
fn test_id3v2_update() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.mp3");
    let audio = audio_bytes(3000);
    std::fs::write(&path, &audio).unwrap();

    let mut tag = Id3v2Tag::default();
    tag.set_text("TIT2", "Title");
    assert_eq!(
        id3v2::update(&path, &tag, 256).unwrap(),
        UpdateStrategy::Rewritten
    );
    let tagged_len = std::fs::metadata(&path).unwrap().len();
    assert!(tagged_len > 3000 + 256);

    let mut file = open(&path);
    assert_eq!(Id3v2Tag::read(&mut file).unwrap().unwrap().get_text("TIT2"), Some("Title"));

    let mut file = open(&path);
    let skipped = id3v2::skip(&mut file).unwrap();
    assert_eq!(skipped + 3000, tagged_len);

    // a slightly larger tag fits in the padding
    tag.set_text("TPE1", "Artist");
    assert_eq!(
        id3v2::update(&path, &tag, 256).unwrap(),
        UpdateStrategy::InPlace
    );
    assert_eq!(std::fs::metadata(&path).unwrap().len(), tagged_len);
    let read = Id3v2Tag::read(open(&path)).unwrap().unwrap();
    assert_eq!(read.get_text("TPE1"), Some("Artist"));

    // a tag too large for the padding rebuilds the file
    tag.set_comment("x".repeat(1000));
    assert_eq!(
        id3v2::update(&path, &tag, 0).unwrap(),
        UpdateStrategy::Rewritten
    );
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[bytes.len() - 3000..], audio.as_slice());
    let read = Id3v2Tag::read(bytes.as_slice()).unwrap().unwrap();
    assert_eq!(read.comment(), Some("x".repeat(1000).as_str()));
}

#[test]
fn test_metadata_between_tags() {
    let mut metadata = Metadata::default();
    metadata.set(MetaField::TrackName, "Name");
    metadata.set(MetaField::ArtistName, "Artist");
    metadata.set_number(MetaField::TrackNumber, 2);
    metadata.set_number(MetaField::TrackTotal, 10);
    metadata.set(MetaField::Comment, "Comment");

    let mut ape = ApeTag::default();
    ape.update_from(&metadata);
    assert_eq!(ape.get_text("Track"), Some("2/10"));
    assert_eq!(Metadata::from(&ape), metadata);

    let mut id3v2 = Id3v2Tag::default();
    id3v2.update_from(&metadata);
    assert_eq!(id3v2.get_text("TRCK"), Some("2/10"));
    assert_eq!(Metadata::from(&id3v2), metadata);

    // ID3v1 has no room for totals
    let mut id3v1 = Id3v1Tag::default();
    id3v1.update_from(&metadata);
    assert_eq!(id3v1.track, Some(2));
    let mut expected = metadata.clone();
    expected.remove(MetaField::TrackTotal);
    assert_eq!(Metadata::from(&id3v1), expected);
}
