//! Page encoding: downscale tall pages and store every page as a baseline
//! JPEG with fixed quality and pixel density.

use super::{blocking, ImageSettings, StageContext};
use crate::archive::{archive_comment, entry_names, read_entries, rewrite_archive_with_comment};
use crate::error::StageError;
use crate::item::{has_suffix, ZIP_SUFFIX};
use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageError, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

const REENCODABLE: [&str; 3] = [".jpg", ".jpeg", ".png"];

/// True for entry names this stage decodes and re-encodes.
pub fn is_reencodable(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    REENCODABLE.iter().any(|ext| lower.ends_with(ext))
}

fn jpeg_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.jpg"),
        None => format!("{name}.jpg"),
    }
}

/// True when a page is already stored the way this stage would store it: a
/// `.jpg` entry holding a JPEG no taller than the target. Only the header is
/// decoded.
pub fn is_canonical_page(name: &str, data: &[u8], settings: ImageSettings) -> bool {
    if !name.ends_with(".jpg") || image::guess_format(data).ok() != Some(ImageFormat::Jpeg) {
        return false;
    }
    ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg)
        .into_dimensions()
        .map(|(_, height)| height <= settings.target_height)
        .unwrap_or(false)
}

/// Decode one page, shrink it to the target height if taller, and encode
/// it as RGB JPEG.
pub fn encode_page(data: &[u8], settings: ImageSettings) -> Result<Vec<u8>, ImageError> {
    let mut img = image::load_from_memory(data)?;

    let (width, height) = img.dimensions();
    if height > settings.target_height {
        let scaled = (u64::from(width) * u64::from(settings.target_height) / u64::from(height)).max(1);
        let new_width = u32::try_from(scaled).unwrap_or(u32::MAX);
        debug!(
            "Resizing {}x{} → {}x{}",
            width, height, new_width, settings.target_height
        );
        img = img.resize_exact(new_width, settings.target_height, FilterType::Lanczos3);
    }

    // Alpha and palettes have no JPEG representation.
    let rgb = match img {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => other.to_rgb8(),
    };

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, settings.jpeg_quality);
    encoder.set_pixel_density(PixelDensity::dpi(settings.jpeg_dpi));
    encoder.encode_image(&rgb)?;
    Ok(out)
}

/// Stage 6: re-encode every page of a zip.
///
/// A container whose comment already equals the settings marker was
/// produced with these exact settings and is left alone, as is one whose
/// pages are all canonical already.
pub async fn reencode_pages(
    path: PathBuf,
    ctx: Arc<StageContext>,
) -> Result<PathBuf, StageError> {
    if !has_suffix(&path, ZIP_SUFFIX) {
        return Ok(path);
    }

    let archive = path.clone();
    let settings = ctx.images;
    blocking(move || {
        let marker = settings.marker();
        if archive_comment(&archive)? == marker {
            debug!("{} already encoded with current settings", archive.display());
            return Ok(());
        }
        if !entry_names(&archive)?.iter().any(|n| is_reencodable(n)) {
            return Ok(());
        }
        let pages_canonical = read_entries(&archive)?
            .iter()
            .filter(|e| is_reencodable(&e.name))
            .all(|e| is_canonical_page(&e.name, &e.data, settings));
        if pages_canonical {
            debug!("{} pages are already canonical", archive.display());
            return Ok(());
        }

        info!("Re-encoding pages of {}", archive.display());
        let summary = rewrite_archive_with_comment(&archive, &marker, |name, data| {
            if !is_reencodable(name) {
                return Ok(Some((name.to_string(), data)));
            }
            let jpeg = encode_page(&data, settings).map_err(|source| StageError::Image {
                entry: name.to_string(),
                source,
            })?;
            debug!("{}: {} → {} bytes", name, data.len(), jpeg.len());
            Ok(Some((jpeg_name(name), jpeg)))
        })?;
        info!("Re-encoded {} entries", summary.kept);
        Ok(())
    })
    .await?;

    Ok(path)
}
