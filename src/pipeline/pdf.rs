//! Paged documents: rasterize every page, then pack the pages as JPEGs.
//!
//! Pages come out of the rasterizer as lossless PNGs at print resolution.
//! They are re-encoded here with the same settings the [`super::reencode`]
//! stage uses, and the container is stamped with the encoding marker so the
//! pages are not compressed a second time further down the pipeline.

use super::reencode::{encode_page, is_reencodable};
use super::{blocking, ImageSettings, StageContext};
use crate::archive::{write_archive, EntrySet};
use crate::error::StageError;
use crate::item::{has_suffix, PDF_SUFFIX, ZIP_SUFFIX};
use crate::natural::natural_cmp;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Stage 4: `.pdf` → `.zip` of JPEG pages.
pub async fn rasterize_document(
    path: PathBuf,
    ctx: Arc<StageContext>,
) -> Result<PathBuf, StageError> {
    if !has_suffix(&path, PDF_SUFFIX) {
        return Ok(path);
    }

    let scratch = tempfile::TempDir::new()
        .map_err(|e| StageError::io("create scratch directory", &path, e))?;
    info!("Rasterizing {} into {}", path.display(), scratch.path().display());
    ctx.rasterizer
        .rasterize(&path, scratch.path(), ctx.raster)
        .await?;

    let target = path.with_extension(ZIP_SUFFIX);
    let packed_target = target.clone();
    let document = path.clone();
    let settings = ctx.images;
    let pages = blocking(move || {
        let pages = pack_pages(scratch.path(), &packed_target, settings);
        drop(scratch);
        match pages {
            Ok(0) => Err(StageError::Transform {
                entry: document.display().to_string(),
                detail: "rasterizer produced no pages".into(),
            }),
            other => other,
        }
    })
    .await?;
    info!("Packed {} pages into {}", pages, target.display());

    tokio::fs::remove_file(&path)
        .await
        .map_err(|e| StageError::io("remove source", &path, e))?;
    Ok(target)
}

fn pack_pages(dir: &Path, target: &Path, settings: ImageSettings) -> Result<usize, StageError> {
    let mut pages: Vec<(String, PathBuf)> = std::fs::read_dir(dir)
        .map_err(|e| StageError::io("list rendered pages", dir, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && is_reencodable(&p.to_string_lossy()))
        .filter_map(|p| {
            let name = p.file_name()?.to_str()?.to_string();
            Some((name, p))
        })
        .collect();
    pages.sort_by(|a, b| natural_cmp(&a.0, &b.0));

    let mut set = EntrySet::new();
    for (name, page) in pages {
        let data = std::fs::read(&page).map_err(|e| StageError::io("read rendered page", &page, e))?;
        let jpeg = encode_page(&data, settings).map_err(|source| StageError::Image {
            entry: name.clone(),
            source,
        })?;
        let jpeg_name = Path::new(&name)
            .with_extension("jpg")
            .to_string_lossy()
            .into_owned();
        debug!("Page {} → {} ({} bytes)", name, jpeg_name, jpeg.len());
        set.insert(jpeg_name, jpeg);
    }

    if set.is_empty() {
        return Ok(0);
    }
    write_archive(target, &set, &settings.marker())?;
    Ok(set.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive;
    use crate::error::ToolError;
    use crate::pipeline::test_support::{self, page, Unreachable};
    use crate::tools::{RasterParams, Rasterizer};
    use futures::future::BoxFuture;
    use image::ImageFormat;
    use tempfile::TempDir;

    /// Renders `pages` solid PNGs named like `pdftoppm` does.
    struct FakeRasterizer {
        pages: usize,
    }

    impl Rasterizer for FakeRasterizer {
        fn rasterize<'a>(
            &'a self,
            document: &'a Path,
            out: &'a Path,
            _params: RasterParams,
        ) -> BoxFuture<'a, Result<(), ToolError>> {
            Box::pin(async move {
                let stem = document.file_stem().unwrap().to_string_lossy().into_owned();
                for i in 1..=self.pages {
                    let png = page(30, 60, ImageFormat::Png);
                    std::fs::write(out.join(format!("{stem}-{i}.png")), png).unwrap();
                }
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn pdf_becomes_zip_of_jpegs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Doc.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let ctx = test_support::context_with(Arc::new(Unreachable), Arc::new(FakeRasterizer { pages: 2 }));
        let marker = ctx.images.marker();
        let out = rasterize_document(path.clone(), ctx).await.unwrap();

        assert_eq!(out, dir.path().join("Doc.zip"));
        assert!(!path.exists());
        assert_eq!(archive::archive_comment(&out).unwrap(), marker);

        let entries = archive::read_entries(&out).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Doc-1.jpg", "Doc-2.jpg"]);
        for e in &entries {
            assert_eq!(image::guess_format(&e.data).unwrap(), ImageFormat::Jpeg);
            // 60 px tall pages exceed the 40 px test target height.
            let img = image::load_from_memory(&e.data).unwrap();
            assert_eq!(img.height(), 40);
            assert_eq!(img.width(), 20);
        }
    }

    #[tokio::test]
    async fn empty_render_fails_and_keeps_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Doc.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let ctx = test_support::context_with(Arc::new(Unreachable), Arc::new(FakeRasterizer { pages: 0 }));
        let err = rasterize_document(path.clone(), ctx).await.unwrap_err();
        assert!(matches!(err, StageError::Transform { .. }), "got {err:?}");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn non_pdf_passes_through() {
        let out = rasterize_document(PathBuf::from("x.zip"), test_support::context())
            .await
            .unwrap();
        assert_eq!(out, PathBuf::from("x.zip"));
    }
}
