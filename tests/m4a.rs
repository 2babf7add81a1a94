// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use audio_containers::{
    Error, Options,
    atom::{self, Atom, AtomBody, M4aFile},
    metadata::{MetaField, Metadata},
};
use std::io::Cursor;

const MDAT_SIZE: usize = 10_000;

fn mdhd_v1(time_scale: u32, duration: u64) -> Vec<u8> {
    let mut mdhd = vec![1, 0, 0, 0];
    mdhd.extend([0; 16]); // creation and modification times
    mdhd.extend(time_scale.to_be_bytes());
    mdhd.extend(duration.to_be_bytes());
    mdhd.extend([0; 4]); // language and quality
    mdhd
}

fn alac_stsd(channels: u8, bits_per_sample: u8, sample_rate: u32) -> Vec<u8> {
    let mut cookie = vec![0; 4]; // version and flags
    cookie.extend(4096u32.to_be_bytes()); // frame length
    cookie.push(0); // compatible version
    cookie.push(bits_per_sample);
    cookie.extend([40, 10, 14]); // rice parameters
    cookie.push(channels);
    cookie.extend(255u16.to_be_bytes()); // max run
    cookie.extend(0u32.to_be_bytes()); // max frame bytes
    cookie.extend(0u32.to_be_bytes()); // average bit rate
    cookie.extend(sample_rate.to_be_bytes());

    let mut cookie_atom = vec![];
    Atom::leaf(*b"alac", cookie).build(&mut cookie_atom).unwrap();

    let mut entry = vec![];
    entry.extend((36 + cookie_atom.len() as u32).to_be_bytes());
    entry.extend(b"alac");
    entry.extend([0; 6]); // reserved
    entry.extend(1u16.to_be_bytes()); // data reference index
    entry.extend([0; 8]); // version, revision and vendor
    entry.extend(2u16.to_be_bytes()); // placeholder channels
    entry.extend(16u16.to_be_bytes()); // placeholder bits per sample
    entry.extend([0; 4]); // compression ID and packet size
    entry.extend((sample_rate << 16).to_be_bytes());
    entry.extend(cookie_atom);

    let mut stsd = vec![0; 4]; // version and flags
    stsd.extend(1u32.to_be_bytes()); // entry count
    stsd.extend(entry);
    stsd
}

fn metadata() -> Metadata {
    let mut metadata = Metadata::default();
    metadata.set(MetaField::TrackName, "Track Name");
    metadata.set(MetaField::ArtistName, "Artist Name");
    metadata.set(MetaField::AlbumName, "Album Name");
    metadata.set(MetaField::Year, "2024");
    metadata.set_number(MetaField::TrackNumber, 4);
    metadata.set_number(MetaField::TrackTotal, 9);
    metadata.set_number(MetaField::AlbumNumber, 1);
    metadata.set(MetaField::Comment, "Comment");
    metadata
}

fn stco(offsets: &[u32]) -> Vec<u8> {
    let mut stco = vec![0; 4]; // version and flags
    stco.extend((offsets.len() as u32).to_be_bytes());
    offsets.iter().for_each(|o| stco.extend(o.to_be_bytes()));
    stco
}

// an item with no metadata field
fn cover() -> Atom {
    let mut data = 13u32.to_be_bytes().to_vec();
    data.extend([0; 4]);
    data.extend(b"\xFF\xD8\xFF\xE0");
    Atom::container(*b"covr", vec![Atom::leaf(*b"data", data)])
}

fn moov(mdat_offset: u32, udta: bool) -> Atom {
    let trak = |time_scale, minf: Vec<Atom>| {
        Atom::container(
            *b"trak",
            vec![Atom::container(
                *b"mdia",
                [vec![Atom::leaf(*b"mdhd", mdhd_v1(time_scale, 1 << 33))], minf].concat(),
            )],
        )
    };

    let mut ilst = atom::build_ilst(&metadata());
    if let AtomBody::Container { children, .. } = &mut ilst.body {
        children.push(cover());
    }

    let mut children = vec![
        Atom::leaf(*b"mvhd", vec![0; 100]),
        // a track with no sample table is passed over
        trak(1000, vec![]),
        trak(
            96000,
            vec![Atom::container(
                *b"minf",
                vec![Atom::container(
                    *b"stbl",
                    vec![
                        Atom::leaf(*b"stsd", alac_stsd(6, 24, 96000)),
                        Atom::leaf(*b"stts", vec![0; 16]),
                        Atom::leaf(*b"stco", stco(&[mdat_offset, mdat_offset + 5000])),
                    ],
                )],
            )],
        ),
    ];
    if udta {
        children.push(Atom::container(
            *b"udta",
            vec![Atom {
                id: *b"meta",
                body: AtomBody::Container {
                    prefix: vec![0; 4],
                    children: vec![
                        Atom::leaf(*b"hdlr", b"\0\0\0\0\0\0\0\0mdirappl\0\0\0\0\0\0\0\0\0".to_vec()),
                        ilst,
                    ],
                },
            }],
        ));
    }
    Atom::container(*b"moov", children)
}

fn m4a_file_with(udta: bool) -> Vec<u8> {
    let ftyp = Atom::leaf(*b"ftyp", b"M4A \0\0\0\0M4A mp42isom".to_vec());

    // chunk offsets point into the mdat body
    let mdat_offset = (ftyp.size() + moov(0, udta).size() + 8) as u32;

    let mut file = vec![];
    ftyp.build(&mut file).unwrap();
    moov(mdat_offset, udta).build(&mut file).unwrap();
    Atom::leaf(
        *b"mdat",
        std::iter::repeat_with(|| fastrand::u8(..))
            .take(MDAT_SIZE)
            .collect(),
    )
    .build(&mut file)
    .unwrap();
    file
}

fn m4a_file() -> Vec<u8> {
    m4a_file_with(true)
}

fn chunk_offsets(m4a: &M4aFile) -> Vec<u32> {
    let stco = atom::find(m4a.atoms(), &[b"moov"])
        .unwrap()
        .children()
        .iter()
        .find_map(|trak| trak.find(&[b"mdia", b"minf", b"stbl", b"stco"]))
        .unwrap()
        .data()
        .unwrap();
    stco[8..]
        .chunks_exact(4)
        .map(|o| u32::from_be_bytes(o.try_into().unwrap()))
        .collect()
}

#[test]
fn test_alac_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.m4a");
    std::fs::write(&path, m4a_file()).unwrap();

    let m4a = M4aFile::open(&path).unwrap();
    let descriptor = m4a.descriptor();
    assert_eq!(descriptor.sample_rate, 96000);
    assert_eq!(descriptor.channels, 6);
    assert_eq!(descriptor.bits_per_sample, 24);
    assert_eq!(descriptor.total_frames, 1 << 33);
    assert_eq!(m4a.metadata(), &metadata());

    let ids = m4a.atoms().iter().map(|a| a.id).collect::<Vec<_>>();
    assert_eq!(ids, [*b"ftyp", *b"moov", *b"mdat"]);

    let mdat = (std::fs::metadata(&path).unwrap().len() as usize - MDAT_SIZE) as u32;
    assert_eq!(chunk_offsets(&m4a), [mdat, mdat + 5000]);
}

#[test]
fn test_update_metadata() {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.m4a");
    let original = m4a_file();
    std::fs::write(&path, &original).unwrap();

    // a larger ilst grows moov ahead of mdat
    let mut updated = metadata();
    updated.set(MetaField::Comment, "x".repeat(500));
    updated.remove(MetaField::AlbumName);
    atom::update_metadata(&path, &updated).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.len() > original.len());
    assert_eq!(&bytes[bytes.len() - MDAT_SIZE..], &original[original.len() - MDAT_SIZE..]);

    let m4a = M4aFile::open(&path).unwrap();
    assert_eq!(m4a.metadata(), &updated);
    assert_eq!(m4a.descriptor().channels, 6);
    let mdat = (bytes.len() - MDAT_SIZE) as u32;
    assert_eq!(chunk_offsets(&m4a), [mdat, mdat + 5000]);

    // items with no metadata field are kept
    let ilst = atom::find(m4a.atoms(), &[b"moov", b"udta", b"meta", b"ilst"]).unwrap();
    assert_eq!(ilst.find(&[b"covr"]), Some(&cover()));

    // and a smaller one shrinks it again
    atom::update_metadata(&path, &metadata()).unwrap();
    assert_eq!(std::fs::read(&path).unwrap().len(), original.len());
    let m4a = M4aFile::open(&path).unwrap();
    assert_eq!(m4a.metadata(), &metadata());
    let mdat = (original.len() - MDAT_SIZE) as u32;
    assert_eq!(chunk_offsets(&m4a), [mdat, mdat + 5000]);
}

#[test]
fn test_update_metadata_adds_udta() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("untagged.m4a");
    let original = m4a_file_with(false);
    std::fs::write(&path, &original).unwrap();
    assert!(M4aFile::open(&path).unwrap().metadata().is_empty());

    atom::update_metadata(&path, &metadata()).unwrap();

    let m4a = M4aFile::open(&path).unwrap();
    assert_eq!(m4a.metadata(), &metadata());
    let meta = atom::find(m4a.atoms(), &[b"moov", b"udta", b"meta"]).unwrap();
    assert!(meta.find(&[b"hdlr"]).is_some());

    let bytes = std::fs::read(&path).unwrap();
    let mdat = (bytes.len() - MDAT_SIZE) as u32;
    assert_eq!(chunk_offsets(&m4a), [mdat, mdat + 5000]);
    assert_eq!(&bytes[bytes.len() - MDAT_SIZE..], &original[original.len() - MDAT_SIZE..]);
}

#[test]
fn test_large_atoms_skipped() {
    let file = m4a_file();

    let m4a = M4aFile::new_with(
        Cursor::new(file.as_slice()),
        Options::default().in_memory_limit(1000),
    )
    .unwrap();

    let mdat = atom::find(m4a.atoms(), &[b"mdat"]).unwrap();
    assert!(matches!(
        mdat.body,
        AtomBody::Skipped {
            size,
            ..
        } if size == MDAT_SIZE as u64
    ));
    assert_eq!(mdat.data(), None);

    // skipped bodies are copied from the source when rebuilding
    let mut source = Cursor::new(file.as_slice());
    let mut rebuilt = vec![];
    for atom in m4a.atoms() {
        atom.build_from(&mut source, &mut rebuilt).unwrap();
    }
    assert_eq!(rebuilt, file);

    // but not without one
    assert!(mdat.build(&mut vec![]).is_err());
}

#[test]
fn test_invalid_files() {
    assert!(matches!(
        M4aFile::new(Cursor::new(b"RIFF\0\0\0\0WAVE".to_vec())),
        Err(Error::InvalidM4a("not an M4A file"))
    ));

    assert!(matches!(
        M4aFile::new(Cursor::new(b"ftyp".to_vec())),
        Err(Error::InvalidM4a("not an M4A file"))
    ));

    let mut no_moov = vec![];
    Atom::leaf(*b"ftyp", b"M4A \0\0\0\0".to_vec())
        .build(&mut no_moov)
        .unwrap();
    assert!(matches!(
        M4aFile::new(Cursor::new(no_moov.clone())),
        Err(Error::InvalidM4a("moov atom not found"))
    ));

    // atom claiming more bytes than its file holds
    let mut oversized = no_moov;
    oversized.extend(100u32.to_be_bytes());
    oversized.extend(b"free");
    oversized.extend([0; 10]);
    assert!(matches!(
        M4aFile::new(Cursor::new(oversized)),
        Err(Error::InvalidM4a("atom size exceeds its parent"))
    ));
}
