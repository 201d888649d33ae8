use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Map};
use std::io::Cursor;
use tempfile::tempdir;
use thumber::{load, read_all, read_one, ContainerError, DecodeMode, Item, ThumberError, ThumbnailConfig, ThumbnailFormat, Thumber};

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, 40]));
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

#[test]
fn test_default_store_produces_every_variant() {
    let thumber = Thumber::new(ThumbnailConfig::default());
    let blob = thumber.create_thumbs_and_index(&png(200, 100), None).unwrap();
    let all = read_all(&blob).unwrap();

    for fmt in ["jpg", "gif", "png"] {
        for (size, real) in [(128, (128, 64)), (64, (64, 32)), (32, (32, 16))] {
            let key = format!("{size}x{size}x{fmt}");
            let bytes = all[&key].as_bytes().unwrap();
            let decoded = image::load_from_memory(bytes).unwrap();
            assert_eq!(decoded.dimensions(), real, "{key}");
        }
    }
    assert_eq!(all["r128x128"], Item::Scalar(json!("128x64")));
    assert_eq!(all["r32x32"], Item::Scalar(json!("32x16")));
    assert_eq!(all.len(), 12);
}

#[test]
fn test_extra_metadata_is_merged() {
    let config = ThumbnailConfig {
        sizes:   vec![(48, 48)],
        formats: vec![ThumbnailFormat::Png],
        ..Default::default()
    };
    let thumber = Thumber::new(config);

    let mut extra = Map::new();
    extra.insert("owner".into(), json!("alice"));
    extra.insert("tags".into(), json!(["cat", "sofa"]));
    let blob = thumber.create_thumbs_and_index(&png(20, 30), Some(&extra)).unwrap();

    let all = read_all(&blob).unwrap();
    assert_eq!(all["owner"], Item::Scalar(json!("alice")));
    assert_eq!(all["tags"], Item::Scalar(json!(["cat", "sofa"])));
    assert_eq!(all["r48x48"], Item::Scalar(json!("20x30")));
    let thumb = image::load_from_memory(read_one(&blob, "DATA.48x48xpng").unwrap()).unwrap();
    assert_eq!(thumb.dimensions(), (20, 30));
}

#[test]
fn test_oversized_image_is_refused() {
    let config = ThumbnailConfig {
        limits: thumber::Limits { max_dimension: 100, max_pixels: 1_000_000 },
        ..Default::default()
    };
    let err = Thumber::new(config).create_thumbs_and_index(&png(101, 10), None).unwrap_err();
    assert!(matches!(err, ThumberError::Generation(thumber::GenerationError::ImageTooLarge { .. })));
}

#[test]
fn test_unreadable_image_is_refused() {
    let err = Thumber::new(ThumbnailConfig::default()).create_thumbs_and_index(b"definitely not an image", None).unwrap_err();
    assert!(matches!(err, ThumberError::Generation(thumber::GenerationError::UnreadableImage(_))));
}

#[test]
fn test_store_then_load_files() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("photo.png");
    let container = dir.path().join("photo.thumbs");
    let out = dir.path().join("small.jpg");
    std::fs::write(&source, png(300, 150)).unwrap();

    let size = Thumber::new(ThumbnailConfig::default()).store(&source, &container, None).unwrap();
    assert_eq!(std::fs::metadata(&container).unwrap().len() as usize, size);

    let n = load(&container, "64x64xjpg", &out, &DecodeMode::Canonical).unwrap();
    let written = std::fs::read(&out).unwrap();
    assert_eq!(written.len(), n);
    assert_eq!(image::load_from_memory(&written).unwrap().dimensions(), (64, 32));
}

#[test]
fn test_load_missing_key_writes_nothing() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("photo.png");
    let container = dir.path().join("photo.thumbs");
    let out = dir.path().join("missing.jpg");
    std::fs::write(&source, png(40, 40)).unwrap();
    Thumber::new(ThumbnailConfig::default()).store(&source, &container, None).unwrap();

    let err = load(&container, "999x999xjpg", &out, &DecodeMode::Canonical).unwrap_err();
    assert!(matches!(err, ThumberError::Container(thumber::ContainerError::UnknownKey(_))));
    assert!(!out.exists());
}

#[test]
fn test_store_unreadable_input_path() {
    let dir = tempdir().unwrap();
    let err = Thumber::new(ThumbnailConfig::default())
        .store(&dir.path().join("nope.png"), &dir.path().join("out"), None)
        .unwrap_err();
    assert!(matches!(err, ThumberError::Io(_)));
}

#[test]
fn test_facade_reads_back_what_it_wrote() {
    let thumber = Thumber::new(ThumbnailConfig {
        sizes:   vec![(32, 32)],
        formats: vec![ThumbnailFormat::Gif, ThumbnailFormat::Png],
        ..Default::default()
    });
    let blob = thumber.create_thumbs_and_index(&png(64, 16), None).unwrap();

    let gif = thumber.read(&blob, "32x32xgif").unwrap();
    assert_eq!(image::load_from_memory(gif).unwrap().dimensions(), (32, 8));
    assert_eq!(thumber.read(&blob, "DATA.32x32xpng").unwrap(), read_one(&blob, "32x32xpng").unwrap());
    assert!(matches!(thumber.read(&blob, "r32x32"), Err(ContainerError::NotASegment(_))));

    let all = thumber.read_all(&blob).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all["r32x32"], Item::Scalar(json!("32x8")));
    assert_eq!(all, read_all(&blob).unwrap());
}

#[test]
fn test_facade_reads_legacy_with_its_mode() {
    let header = serde_json::to_vec(&json!({"64x64xjpg": [0, 2], "owner": "alice"})).unwrap();
    let mut blob = (header.len() as u16).to_le_bytes().to_vec();
    blob.extend_from_slice(&header);
    blob.extend_from_slice(&[0xAA, 0xBB]);

    let thumber = Thumber::new(ThumbnailConfig::default()).with_decode_mode(DecodeMode::legacy(["owner"]));
    assert_eq!(thumber.read(&blob, "64x64xjpg").unwrap(), &[0xAA, 0xBB]);
    assert_eq!(thumber.read_all(&blob).unwrap()["owner"], Item::Scalar(json!("alice")));
}
