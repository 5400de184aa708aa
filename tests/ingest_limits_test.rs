use std::fs;
use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use snapsizes::image_handler::{ImageConfig, ImageError, SizeSet, SizeSpec, Workspace, sniff_image_mime};
use snapsizes::settings::{Settings, load_settings};

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([1, 2, 3, 255])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encode test png failed");
    out.into_inner()
}

#[test]
fn mixed_folder_ingests_only_images() {
    let dir = tempfile::tempdir().expect("tempdir");
    let photo = dir.path().join("photo.png");
    let notes = dir.path().join("notes.txt");
    let missing = dir.path().join("missing.png");
    let nested = dir.path().join("nested");
    fs::write(&photo, png(12, 8)).expect("write photo");
    fs::write(&notes, "hello").expect("write notes");
    fs::create_dir(&nested).expect("create dir");

    let mut workspace = Workspace::new(ImageConfig::default());
    let report = workspace.add_files([&notes, &photo, &missing, &nested]);

    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.rejected.len(), 3);
    assert_eq!(workspace.images()[0].width(), 12);
    assert_eq!(workspace.images()[0].mime(), "image/png");
    assert!(report.rejected.iter().all(|r| !r.message.is_empty()));
}

#[test]
fn oversized_file_is_rejected_before_decode() {
    let config = ImageConfig {
        max_file_size: 64,
        ..ImageConfig::default()
    };
    let mut workspace = Workspace::new(config);
    let result = workspace.add_bytes("big.png", png(64, 64));
    assert!(matches!(result, Err(ImageError::ResourceLimit(_))));
    assert!(workspace.is_empty());
}

#[test]
fn pixel_budget_rejects_huge_images() {
    let config = ImageConfig {
        max_decoded_pixels: 100,
        ..ImageConfig::default()
    };
    let mut workspace = Workspace::new(config);
    let result = workspace.add_bytes("wide.png", png(20, 20));
    assert!(matches!(result, Err(ImageError::ResourceLimit(_))));
}

#[test]
fn sniffing_ignores_extension() {
    assert_eq!(sniff_image_mime(&png(2, 2)).expect("png sniff"), "image/png");
    assert!(matches!(
        sniff_image_mime(b"%PDF-1.5 not an image"),
        Err(ImageError::InvalidFormat(_))
    ));
}

#[test]
fn size_set_is_unique_and_capped() {
    let mut sizes = SizeSet::new(2);
    assert!(sizes.insert(SizeSpec::new(1080, 1080, "a").expect("size")).expect("insert"));
    assert!(!sizes.insert(SizeSpec::new(1080, 1080, "dup").expect("size")).expect("insert"));
    assert!(sizes.insert(SizeSpec::new(1920, 1080, "b").expect("size")).expect("insert"));
    assert!(matches!(
        sizes.insert(SizeSpec::new(500, 500, "c").expect("size")),
        Err(ImageError::ResourceLimit(_))
    ));
    assert!(matches!(SizeSpec::new(0, 10, "zero"), Err(ImageError::InvalidFormat(_))));
}

#[test]
fn settings_file_drives_workspace_limits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("settings.json");
    fs::write(&path, r#"{ "maxFiles": 1, "toolPrefix": "Acme" }"#).expect("write settings");

    let settings: Settings = load_settings(Some(&path)).expect("load settings");
    assert_eq!(settings.tool_prefix, "Acme");

    let mut workspace = Workspace::new(settings.image_config().expect("config"));
    workspace.add_bytes("a.png", png(2, 2)).expect("first image");
    let second = workspace.add_bytes("b.png", png(2, 2));
    assert!(matches!(second, Err(ImageError::ResourceLimit(_))));
}
