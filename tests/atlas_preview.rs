use geode_resources::cache::{BitmapLoader, FsBitmapLoader};
use geode_resources::preview::Preview;
use geode_resources::quality::QualityTier;
use geode_resources::resource::{GameProfile, Source};
use geode_resources::{DatabaseOptions, ErrorKind, ResourceDatabase, ResourceError};
use image::{Rgba, RgbaImage};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

#[derive(Default)]
struct CountingLoader {
    decodes: AtomicUsize,
}

impl BitmapLoader for CountingLoader {
    fn load(&self, path: &Path) -> geode_resources::Result<RgbaImage> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        FsBitmapLoader.load(path)
    }
}

fn atlas_plist(frames: &[(&str, &str, bool)], texture: &str, extra: &str) -> String {
    let mut body = String::new();
    for (name, rect, rotated) in frames {
        let rotated = if *rotated { "<true/>" } else { "<false/>" };
        body.push_str(&format!(
            "<key>{name}</key><dict><key>textureRect</key><string>{rect}</string>\
             <key>textureRotated</key>{rotated}</dict>"
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0"><dict>
<key>frames</key><dict>{body}</dict>
<key>metadata</key><dict><key>format</key><integer>3</integer>
<key>textureFileName</key><string>{texture}</string>{extra}</dict>
</dict></plist>"#
    )
}

// 8x4 atlas: red 4x4 square on the left, a rotated 2x4 blue frame stored as 4x2 top right.
fn write_game(root: &Path) {
    let resources = root.join("Resources");
    fs::create_dir_all(&resources).expect("resources dir");
    let mut atlas = RgbaImage::new(8, 4);
    for (x, y, pixel) in atlas.enumerate_pixels_mut() {
        if x < 4 {
            *pixel = RED;
        } else if y < 2 {
            *pixel = BLUE;
        }
    }
    atlas.save(resources.join("sheet.png")).expect("atlas png");
    let plist = atlas_plist(
        &[("left.png", "{{0,0},{4,4}}", false), ("right.png", "{{4,0},{2,4}}", true)],
        "sheet.png",
        "",
    );
    fs::write(resources.join("sheet.plist"), plist).expect("atlas plist");

    RgbaImage::from_pixel(2, 2, RED).save(resources.join("broken.png")).expect("broken png");
    let broken = atlas_plist(
        &[("fine.png", "{{0,0},{2,2}}", false)],
        "broken.png",
        "<key>comment</key><string>ghost.png</string>",
    );
    fs::write(resources.join("broken.plist"), broken).expect("broken plist");
}

async fn open(root: &Path, loader: Arc<CountingLoader>) -> ResourceDatabase {
    let mut db = ResourceDatabase::with_loader(DatabaseOptions { quality: QualityTier::Low, cover_size: 100 }, loader);
    db.add_source(Source::Game(GameProfile::from_gd_path("Test", &root.join("GeometryDash.exe"))));
    db.reload_all().await;
    db
}

fn image(preview: &Preview) -> &RgbaImage {
    preview.image().expect("image preview")
}

#[tokio::test]
async fn concurrent_frame_previews_share_one_decode() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_game(dir.path());
    let loader = Arc::new(CountingLoader::default());
    let db = open(dir.path(), Arc::clone(&loader)).await;

    let left = db.find("left.png", None).expect("left frame");
    let right = db.find("right.png", None).expect("right frame");
    let (left_preview, right_preview) = tokio::join!(db.fetch_preview(&left), db.fetch_preview(&right));
    let left_preview = left_preview.expect("left preview");
    let right_preview = right_preview.expect("right preview");

    assert_eq!(loader.decodes.load(Ordering::SeqCst), 1, "atlas bitmap must be decoded once");
    assert_eq!(db.cache_stats().atlases, 1);

    assert_eq!(image(&left_preview).dimensions(), (4, 4));
    assert!(image(&left_preview).pixels().all(|pixel| *pixel == RED));
    assert_eq!(image(&right_preview).dimensions(), (2, 4), "rotated frames come back upright");
    assert!(image(&right_preview).pixels().all(|pixel| *pixel == BLUE));

    db.fetch_preview(&left).await.expect("cached preview");
    assert_eq!(loader.decodes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scanned_name_missing_from_atlas_is_a_lookup_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_game(dir.path());
    let db = open(dir.path(), Arc::new(CountingLoader::default())).await;

    let broken = db.find("broken.plist", None).expect("broken sheet");
    let names: Vec<&str> = broken.frames().iter().map(|frame| frame.display_name()).collect();
    assert_eq!(names, vec!["fine.png", "ghost.png"]);

    let ghost = db.find("ghost.png", None).expect("ghost frame");
    let err = db.fetch_preview(&ghost).await.unwrap_err();
    assert!(matches!(err, ResourceError::FrameNotFound { ref frame, .. } if frame == "ghost.png"));
    assert_eq!(err.kind(), ErrorKind::Lookup);
    assert!(db.fetch_preview(&broken).await.is_err(), "a cover over a missing frame fails");
}

#[tokio::test]
async fn physical_sheet_cover_is_composed_once() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_game(dir.path());
    let loader = Arc::new(CountingLoader::default());
    let db = open(dir.path(), Arc::clone(&loader)).await;

    let sheet = db.find("sheet.plist", None).expect("sheet");
    let first = db.fetch_preview(&sheet).await.expect("cover");
    let cover = image(&first);
    assert_eq!(cover.dimensions(), (100, 100));
    assert!(cover.get_pixel(25, 25)[0] > 250, "left frame fills the first quadrant");
    let right = cover.get_pixel(75, 25);
    assert!(right[2] > 200 && right[0] < 50, "rotated frame lands in the second quadrant: {right:?}");
    assert_eq!(cover.get_pixel(55, 25)[3], 0, "narrow frame is centered horizontally");
    assert_eq!(cover.get_pixel(25, 75)[3], 0);

    let second = db.fetch_preview(&sheet).await.expect("cover again");
    assert!(Arc::ptr_eq(first.image().expect("image"), second.image().expect("image")));
    assert_eq!(loader.decodes.load(Ordering::SeqCst), 1);
}
