#![allow(clippy::cast_possible_truncation)]
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use voxatlas_core::{AtlasLayout, ImageInfo};
use voxatlas_io::{
    encode_packed_atlas, load_channels, ImageManifest, LoadReport, LoadSource, LoaderConfig,
    SampleFormat,
};
use voxatlas_volume::{Volume, VolumeEvent};

fn layout() -> AtlasLayout {
    AtlasLayout::new(4, 4, 2, 1, 2).unwrap()
}

fn volume(channels: usize) -> Volume {
    Volume::new(ImageInfo::from_layout("load", layout(), channels).unwrap()).unwrap()
}

// Tile 0 holds `a`, tile 1 holds `b`.
fn two_tile_plane(a: u8, b: u8) -> Vec<u8> {
    (0..32).map(|i| if i % 8 < 4 { a } else { b }).collect()
}

fn write_atlas(dir: &Path, name: &str, planes: &[&[u8]]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, encode_packed_atlas(planes, 8, 4).unwrap()).unwrap();
    path
}

#[test]
fn test_packed_atlas_fills_channels() {
    let dir = TempDir::new().unwrap();
    let r = two_tile_plane(10, 200);
    let g = two_tile_plane(30, 40);
    let path = write_atlas(dir.path(), "atlas_0.png", &[&r, &g]);

    let mut volume = volume(2);
    let events = volume.subscribe();
    let session = load_channels(
        &volume,
        vec![LoadSource::Atlas {
            path,
            channels: vec![1, 0],
        }],
        LoaderConfig::default(),
    );
    let report = session.wait(&mut volume);

    assert_eq!(
        report,
        LoadReport {
            applied: 2,
            failed: 0,
            discarded: 0
        }
    );
    assert!(volume.is_loaded());
    assert_eq!(volume.intensity(1, 0, 0, 0), Ok(10));
    assert_eq!(volume.intensity(1, 0, 0, 1), Ok(200));
    assert_eq!(volume.intensity(0, 2, 2, 1), Ok(40));
    assert!(events.try_iter().any(|e| e == VolumeEvent::FullyLoaded));
}

#[test]
fn test_stale_messages_are_discarded() {
    let dir = TempDir::new().unwrap();
    let plane = two_tile_plane(1, 2);
    let path = write_atlas(dir.path(), "atlas.png", &[&plane]);

    let superseded = volume(1);
    let session = load_channels(
        &superseded,
        vec![LoadSource::Atlas {
            path,
            channels: vec![0],
        }],
        LoaderConfig::default(),
    );

    // A new image replaced the old one before the load finished.
    let mut current = volume(1);
    assert_ne!(current.id(), superseded.id());
    let report = session.wait(&mut current);

    assert_eq!(report.discarded, 1);
    assert_eq!(report.applied, 0);
    assert!(!current.is_loaded());
}

#[test]
fn test_cancelled_load_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let plane = two_tile_plane(1, 2);
    let path = write_atlas(dir.path(), "atlas.png", &[&plane]);

    let mut volume = volume(1);
    let session = load_channels(
        &volume,
        vec![LoadSource::Atlas {
            path,
            channels: vec![0],
        }],
        LoaderConfig::default(),
    );
    session.cancel();
    let report = session.wait(&mut volume);
    assert_eq!(report.applied, 0);
    assert!(!volume.is_loaded());
}

#[test]
fn test_failed_source_does_not_block_others() {
    let dir = TempDir::new().unwrap();
    let raw_path = dir.path().join("ch1.raw");
    let samples: Vec<u8> = (0..32u16)
        .flat_map(|v| (v * 100).to_le_bytes())
        .collect();
    std::fs::write(&raw_path, samples).unwrap();

    let mut volume = volume(3);
    let events = volume.subscribe();
    let sources = vec![
        LoadSource::Atlas {
            path: dir.path().join("missing.png"),
            channels: vec![0],
        },
        LoadSource::Volume {
            path: raw_path,
            channel: 1,
            format: SampleFormat::U16,
        },
        LoadSource::Volume {
            path: dir.path().join("short.raw"),
            channel: 2,
            format: SampleFormat::U8,
        },
    ];
    std::fs::write(dir.path().join("short.raw"), [0u8; 3]).unwrap();

    let report = load_channels(&volume, sources, LoaderConfig::default().with_max_workers(2))
        .wait(&mut volume);

    assert_eq!(report.applied, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(volume.is_channel_loaded(0), Ok(false));
    assert_eq!(volume.is_channel_loaded(1), Ok(true));
    assert_eq!(volume.is_channel_loaded(2), Ok(false));
    assert!(!volume.is_loaded());
    assert_eq!(volume.intensity(1, 0, 0, 0), Ok(0));
    assert_eq!(volume.intensity(1, 3, 3, 1), Ok(255));

    let failures = events
        .try_iter()
        .filter(|e| matches!(e, VolumeEvent::ChannelFailed { .. }))
        .count();
    assert_eq!(failures, 2);
}

#[test]
fn test_manifest_drives_load() {
    let dir = TempDir::new().unwrap();
    let dna = two_tile_plane(50, 60);
    let memb = two_tile_plane(0, 255);
    write_atlas(dir.path(), "cell_atlas_0.png", &[&dna, &memb]);

    let manifest_path = dir.path().join("cell.json");
    std::fs::write(
        &manifest_path,
        r#"{
            "name": "cell",
            "width": 4, "height": 4, "channels": 2, "channel_names": ["DNA", "SEG_Memb"],
            "rows": 1, "cols": 2, "tiles": 2, "tile_width": 4, "tile_height": 4,
            "atlas_width": 8, "atlas_height": 4,
            "images": [{ "name": "cell_atlas_0.png", "channels": [0, 1] }]
        }"#,
    )
    .unwrap();

    let manifest = ImageManifest::read(&manifest_path).unwrap();
    let mut volume = Volume::new(manifest.info.clone()).unwrap();
    let sources = manifest.atlas_sources(dir.path());
    let report = load_channels(&volume, sources, LoaderConfig::default()).wait(&mut volume);

    assert_eq!(report.applied, 2);
    assert!(volume.is_loaded());
    assert_eq!(volume.channel_index("SEG_Memb"), Some(1));
    assert_eq!(volume.intensity(1, 0, 0, 1), Ok(255));
}
