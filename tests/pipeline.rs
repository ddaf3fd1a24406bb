//! End-to-end tests for cbz-sanitizer.
//!
//! The external tools are replaced by in-process fakes and originals go to a
//! trash folder, so these run anywhere without `unrar`, `pdftoppm` or a
//! desktop trash can.

use cbz_sanitizer::{
    sanitize, sanitize_stream, ArchiveExtractor, BatchStats, Disposition, FileReport, RasterParams,
    Rasterizer, SanitizeConfig, SanitizeProgressCallback, ToolError, TrashPolicy,
};
use futures::future::BoxFuture;
use futures::StreamExt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 120, 200, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 120, 200]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .unwrap();
    buf
}

/// A one-entry zip whose central directory claims the empty entry inflates
/// to `declared` bytes.
fn zip_declaring(path: &Path, name: &str, declared: u64) {
    let name = name.as_bytes();
    let n = (name.len() as u16).to_le_bytes();
    let mut out = Vec::new();

    out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
    out.extend_from_slice(&[45, 0, 0, 0, 0, 0, 0, 0, 0x21, 0]);
    out.extend_from_slice(&[0; 12]);
    out.extend_from_slice(&n);
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(name);

    let cd_start = out.len() as u32;
    out.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
    out.extend_from_slice(&[45, 0, 45, 0, 0, 0, 0, 0, 0, 0, 0x21, 0]);
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(&u32::MAX.to_le_bytes());
    out.extend_from_slice(&n);
    out.extend_from_slice(&12u16.to_le_bytes());
    out.extend_from_slice(&[0; 14]);
    out.extend_from_slice(name);
    out.extend_from_slice(&[1, 0, 8, 0]);
    out.extend_from_slice(&declared.to_le_bytes());
    let cd_len = out.len() as u32 - cd_start;

    out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
    out.extend_from_slice(&[0, 0, 0, 0, 1, 0, 1, 0]);
    out.extend_from_slice(&cd_len.to_le_bytes());
    out.extend_from_slice(&cd_start.to_le_bytes());
    out.extend_from_slice(&[0, 0]);

    std::fs::write(path, out).unwrap();
}

fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, data) in entries {
        zip.start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

fn zip_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut f = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            f.read_to_end(&mut data).unwrap();
            (f.name().to_string(), data)
        })
        .collect()
}

/// Writes three tall PNG pages, out of natural order.
struct FakeUnrar;

impl ArchiveExtractor for FakeUnrar {
    fn extract<'a>(&'a self, _archive: &'a Path, out: &'a Path) -> BoxFuture<'a, Result<(), ToolError>> {
        Box::pin(async move {
            for name in ["page10.png", "page2.png", "page1.png"] {
                tokio::fs::write(out.join(name), png(30, 60)).await.unwrap();
            }
            Ok(())
        })
    }
}

struct BrokenUnrar;

impl ArchiveExtractor for BrokenUnrar {
    fn extract<'a>(&'a self, _archive: &'a Path, _out: &'a Path) -> BoxFuture<'a, Result<(), ToolError>> {
        Box::pin(async {
            Err(ToolError::Failed {
                program: "unrar".into(),
                status: "exit status: 3".into(),
                output: "CRC failed".into(),
            })
        })
    }
}

/// Renders two pages per document, named like `pdftoppm` does.
struct FakePdftoppm;

impl Rasterizer for FakePdftoppm {
    fn rasterize<'a>(
        &'a self,
        document: &'a Path,
        out: &'a Path,
        _params: RasterParams,
    ) -> BoxFuture<'a, Result<(), ToolError>> {
        Box::pin(async move {
            let stem = document.file_stem().unwrap().to_string_lossy().into_owned();
            for i in 1..=2 {
                tokio::fs::write(out.join(format!("{stem}-{i}.png")), png(20, 20))
                    .await
                    .unwrap();
            }
            Ok(())
        })
    }
}

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    managed: PathBuf,
    trash: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("incoming");
        std::fs::create_dir_all(&root).unwrap();
        Self {
            root,
            managed: dir.path().join("managed"),
            trash: dir.path().join("trash"),
            _dir: dir,
        }
    }

    fn config(&self) -> cbz_sanitizer::SanitizeConfigBuilder {
        SanitizeConfig::builder()
            .managed_root(&self.managed)
            .trash(TrashPolicy::Folder(self.trash.clone()))
            .target_height(40)
            .extractor(Arc::new(FakeUnrar))
            .rasterizer(Arc::new(FakePdftoppm))
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cbr_becomes_renumbered_jpeg_zip() {
    let fx = Fixture::new();
    let original = fx.root.join("Series/Book.cbr");
    std::fs::create_dir_all(original.parent().unwrap()).unwrap();
    std::fs::write(&original, b"Rar!\x1a\x07\x00").unwrap();

    let report = sanitize(&fx.config().build().unwrap(), &fx.root)
        .await
        .unwrap();

    assert_eq!(report.stats.succeeded, 1);
    let out = fx.managed.join("success/Series/Book.zip");
    assert_eq!(report.files[0].destination.as_deref(), Some(out.as_path()));

    let entries = zip_entries(&out);
    let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["P00000.jpg", "P00001.jpg", "P00002.jpg"]);
    for (_, data) in &entries {
        let img = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg).unwrap();
        assert_eq!((img.width(), img.height()), (20, 40));
    }

    assert!(!original.exists());
    assert!(fx.trash.join("Series/Book.cbr").exists());
}

#[tokio::test]
async fn pdf_pages_are_rasterized_and_original_trashed() {
    let fx = Fixture::new();
    std::fs::write(fx.root.join("Doc.pdf"), b"%PDF-1.7").unwrap();

    let report = sanitize(&fx.config().build().unwrap(), &fx.root)
        .await
        .unwrap();

    assert!(report.files[0].is_success(), "{:?}", report.files[0]);
    let names: Vec<_> = zip_entries(&fx.managed.join("success/Doc.zip"))
        .into_iter()
        .map(|(n, _)| n)
        .collect();
    assert_eq!(names, vec!["P00000.jpg", "P00001.jpg"]);
    assert!(fx.trash.join("Doc.pdf").exists());
}

#[tokio::test]
async fn failing_stage_routes_to_its_bucket() {
    let fx = Fixture::new();
    std::fs::write(fx.root.join("Broken.cbr"), b"Rar!").unwrap();

    let config = fx.config().extractor(Arc::new(BrokenUnrar)).build().unwrap();
    let report = sanitize(&config, &fx.root).await.unwrap();

    let file = &report.files[0];
    assert_eq!(
        file.disposition,
        Disposition::Failed {
            stage_index: 2,
            stage_name: "unpack_legacy_archive".into()
        }
    );
    assert!(file.error.as_deref().unwrap().contains("CRC failed"));

    let bucket = fx.managed.join("failed/02_unpack_legacy_archive/Broken.cbr");
    assert_eq!(std::fs::read(&bucket).unwrap(), b"Rar!");
    assert!(!fx.managed.join("success").join("Broken.cbr").exists());
    assert!(!fx.managed.join("success").join("Broken.zip").exists());
    assert_eq!(report.stats.failed, 1);
}

#[tokio::test]
async fn unrecognized_files_are_left_alone() {
    let fx = Fixture::new();
    std::fs::write(fx.root.join("notes.txt"), b"keep me").unwrap();
    std::fs::write(fx.root.join("cover.jpg"), b"jpg").unwrap();

    let report = sanitize(&fx.config().build().unwrap(), &fx.root)
        .await
        .unwrap();

    assert!(report.files.is_empty());
    assert_eq!(report.stats.discovered, 0);
    assert_eq!(std::fs::read(fx.root.join("notes.txt")).unwrap(), b"keep me");
    assert!(fx.root.join("cover.jpg").exists());
}

#[tokio::test]
async fn canonical_container_passes_through_unchanged() {
    let fx = Fixture::new();
    write_zip(&fx.root.join("Book #01.cbz"), &[("p1.png", png(30, 60)), ("p2.png", png(30, 60))]);
    let first = sanitize(&fx.config().build().unwrap(), &fx.root)
        .await
        .unwrap();
    assert_eq!(first.stats.succeeded, 1);
    let canonical = fx.managed.join("success/Book #01.zip");
    let bytes = std::fs::read(&canonical).unwrap();

    // Feed the result through a second, independent run.
    let again = Fixture::new();
    std::fs::write(again.root.join("Book #01.zip"), &bytes).unwrap();
    let second = sanitize(&again.config().build().unwrap(), &again.root)
        .await
        .unwrap();

    assert_eq!(second.stats.succeeded, 1);
    assert_eq!(
        std::fs::read(again.managed.join("success/Book #01.zip")).unwrap(),
        bytes
    );
}

#[tokio::test]
async fn foreign_canonical_zip_is_not_reencoded() {
    let fx = Fixture::new();
    let original = fx.root.join("Clean.zip");
    write_zip(&original, &[("P00000.jpg", jpeg(8, 8)), ("P00001.jpg", jpeg(8, 8))]);
    let bytes = std::fs::read(&original).unwrap();

    let report = sanitize(&fx.config().build().unwrap(), &fx.root)
        .await
        .unwrap();

    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(std::fs::read(fx.managed.join("success/Clean.zip")).unwrap(), bytes);
}

#[tokio::test]
async fn epub_passes_every_stage_untouched() {
    let fx = Fixture::new();
    let original = fx.root.join("Shelf/Novel.epub");
    write_zip(&original, &[("mimetype", b"application/epub+zip".to_vec()), ("cover.png", png(30, 60))]);
    let bytes = std::fs::read(&original).unwrap();

    let report = sanitize(&fx.config().build().unwrap(), &fx.root)
        .await
        .unwrap();

    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(
        std::fs::read(fx.managed.join("success/Shelf/Novel.epub")).unwrap(),
        bytes
    );
    assert!(fx.trash.join("Shelf/Novel.epub").exists());
}

#[tokio::test]
async fn lying_entry_size_fails_the_file_not_the_batch() {
    let fx = Fixture::new();
    zip_declaring(&fx.root.join("Huge.zip"), "P00000.jpg", 1 << 46);
    write_zip(&fx.root.join("Fine.cbz"), &[("1.png", png(8, 8))]);

    let report = sanitize(&fx.config().build().unwrap(), &fx.root)
        .await
        .unwrap();

    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(report.stats.failed, 1);
    assert!(fx
        .managed
        .join("failed/05_renumber_pages/Huge.zip")
        .exists());
    let failed = report.files.iter().find(|f| !f.is_success()).unwrap();
    assert!(failed.error.as_deref().unwrap().contains("exceeds"));
}

#[tokio::test]
async fn abandoned_working_dirs_are_swept() {
    let fx = Fixture::new();
    let stale = fx.managed.join(".work-Xy12ab");
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join("Book.zip"), b"half written").unwrap();
    write_zip(&fx.root.join("Book.cbz"), &[("1.png", png(8, 8))]);

    let report = sanitize(&fx.config().build().unwrap(), &fx.root)
        .await
        .unwrap();

    assert_eq!(report.stats.succeeded, 1);
    assert!(!stale.exists());
    let leftovers: Vec<_> = std::fs::read_dir(&fx.managed)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".work-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn colliding_outputs_abort_the_second_file() {
    let fx = Fixture::new();
    write_zip(&fx.root.join("Book.cbz"), &[("1.png", png(8, 8))]);
    write_zip(&fx.root.join("Book.zip"), &[("1.png", png(8, 8))]);

    let config = fx.config().sequential(true).build().unwrap();
    let report = sanitize(&config, &fx.root).await.unwrap();

    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(report.stats.aborted, 1);
    let aborted = report
        .files
        .iter()
        .find(|f| f.disposition == Disposition::Aborted)
        .unwrap();
    assert_eq!(aborted.relative_path, PathBuf::from("Book.zip"));
    assert!(aborted.error.as_deref().unwrap().contains("already exists"));

    // The aborted original is still where it was.
    assert!(fx.root.join("Book.zip").exists());
    assert!(fx.trash.join("Book.cbz").exists());
}

#[tokio::test]
async fn cleanup_removes_junk_only_folders() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.root.join("Series/__MACOSX")).unwrap();
    std::fs::write(fx.root.join("Series/.DS_Store"), b"").unwrap();
    write_zip(&fx.root.join("Series/Book.cbz"), &[("1.png", png(8, 8))]);
    std::fs::create_dir_all(fx.root.join("Other")).unwrap();
    std::fs::write(fx.root.join("Other/readme.txt"), b"x").unwrap();

    let report = sanitize(&fx.config().build().unwrap(), &fx.root)
        .await
        .unwrap();

    assert!(report.stats.directories_removed >= 1);
    assert!(!fx.root.join("Series").exists());
    assert!(fx.root.join("Other/readme.txt").exists());
    assert!(fx.managed.join("success/Series/Book.zip").exists());
}

#[tokio::test]
async fn stream_yields_one_report_per_file() {
    let fx = Fixture::new();
    for i in 0..4 {
        write_zip(&fx.root.join(format!("Book {i}.cbz")), &[("1.png", png(8, 8))]);
    }

    let config = fx.config().concurrency(3).build().unwrap();
    let reports: Vec<FileReport> = sanitize_stream(&config, &fx.root)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(reports.len(), 4);
    assert!(reports.iter().all(|r| r.is_success()));
}

#[derive(Default)]
struct Counting {
    total: AtomicUsize,
    stages: AtomicUsize,
    files: AtomicUsize,
    batches: AtomicUsize,
}

impl SanitizeProgressCallback for Counting {
    fn on_batch_start(&self, total_files: usize) {
        self.total.store(total_files, Ordering::SeqCst);
    }
    fn on_stage_complete(&self, _relative: &Path, _index: usize, _name: &str) {
        self.stages.fetch_add(1, Ordering::SeqCst);
    }
    fn on_file_complete(&self, _report: &FileReport) {
        self.files.fetch_add(1, Ordering::SeqCst);
    }
    fn on_batch_complete(&self, _stats: &BatchStats) {
        self.batches.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_callback_sees_every_stage() {
    let fx = Fixture::new();
    write_zip(&fx.root.join("A.cbz"), &[("1.png", png(8, 8))]);
    write_zip(&fx.root.join("B.cbz"), &[("1.png", png(8, 8))]);

    let counting = Arc::new(Counting::default());
    let config = fx.config().progress_callback(counting.clone()).build().unwrap();
    sanitize(&config, &fx.root).await.unwrap();

    assert_eq!(counting.total.load(Ordering::SeqCst), 2);
    assert_eq!(counting.stages.load(Ordering::SeqCst), 2 * 7);
    assert_eq!(counting.files.load(Ordering::SeqCst), 2);
    assert_eq!(counting.batches.load(Ordering::SeqCst), 1);
}
