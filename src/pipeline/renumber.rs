//! Page naming: `P00000.ext`, `P00001.ext`… in natural order.

use super::{blocking, StageContext};
use crate::archive::{archive_comment, read_entries, write_archive, EntrySet};
use crate::error::StageError;
use crate::item::{has_suffix, ZIP_SUFFIX};
use crate::natural::natural_cmp;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".webp"];

/// The extension (with its dot) when `name` is a page image.
fn image_extension(name: &str) -> Option<&str> {
    let lower = name.to_ascii_lowercase();
    let ext = IMAGE_EXTENSIONS.iter().find(|ext| lower.ends_with(*ext))?;
    Some(&name[name.len() - ext.len()..])
}

/// Canonical name for the page at `index`.
pub fn page_name(index: usize, extension: &str) -> String {
    format!("P{index:05}{extension}")
}

/// Map every image entry to its sequential name; non-images are absent.
fn plan(names: &[String]) -> HashMap<String, String> {
    let mut images: Vec<&String> = names
        .iter()
        .filter(|n| image_extension(n).is_some())
        .collect();
    images.sort_by(|a, b| natural_cmp(a, b));

    images
        .into_iter()
        .enumerate()
        .filter_map(|(i, name)| {
            let ext = image_extension(name)?;
            Some((name.clone(), page_name(i, ext)))
        })
        .collect()
}

/// Stage 5: rename pages sequentially and drop everything that is not a page.
pub async fn renumber_pages(
    path: PathBuf,
    _ctx: Arc<StageContext>,
) -> Result<PathBuf, StageError> {
    if !has_suffix(&path, ZIP_SUFFIX) {
        return Ok(path);
    }

    let archive = path.clone();
    blocking(move || {
        let entries = read_entries(&archive)?;
        let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
        let mapping = plan(&names);
        let in_order = names.windows(2).all(|w| w[0] < w[1]);
        if in_order && mapping.len() == names.len() && mapping.iter().all(|(from, to)| from == to) {
            return Ok(());
        }

        info!("Renumbering {} pages in {}", mapping.len(), archive.display());
        let dropped = names.len() - mapping.len();
        let mut pages: Vec<(String, Vec<u8>)> = entries
            .into_iter()
            .filter_map(|e| Some((mapping.get(&e.name)?.clone(), e.data)))
            .collect();
        pages.sort_by(|a, b| a.0.cmp(&b.0));

        let mut set = EntrySet::new();
        for (name, data) in pages {
            set.insert(name, data);
        }
        write_archive(&archive, &set, &archive_comment(&archive)?)?;
        if dropped > 0 {
            info!("Dropped {} non-image entries", dropped);
        }
        Ok(())
    })
    .await?;

    Ok(path)
}
