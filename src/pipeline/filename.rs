//! Filename cleanup: strip release-group boilerplate and write tome numbers
//! as `#NN`.

use super::StageContext;
use crate::error::StageError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// `Title - T03 - Subtitle`, `Title (Tome 3)`, `Title_T3_`…
static RE_TOME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\s\-._()]+(?:T|tome|Tome)[\s\-._]*(\d+)[\s\-._)]+").unwrap()
});

static RE_JUNK: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^BD ",
        r"  - Complet - $",
        r"One Shot",
        r"^BD-FR-",
        r".FRENCH.HYBRiD.eBook-PRESSECiTRON$",
        r".FRENCH.HYBRiD.COMiC.CBZ.eBook-TONER",
        r" \[Digital\-[0-9]{4}\] \([0-9a-zA-Z_\-]+\)$",
        r"^\[BD Fr OS\] ",
        r"^\[BD Fr\] - ",
        r"^\[BD Fr\] ",
        r"^\[BD\]-* ",
        r"^BD-*\s+",
        r"^BD.FR.-.",
        r"^BDFR -\d*",
        r"\d*\[One-Shot\]",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Upper bound on clean-up passes; each pass only ever shortens the stem.
const MAX_PASSES: usize = 8;

fn clean_once(stem: &str) -> String {
    let mut s = stem.trim().to_string();
    for re in RE_JUNK.iter() {
        s = re.replace_all(&s, "").into_owned();
    }
    s = RE_TOME.replace_all(&s, " #${1} ").into_owned();
    s.trim().to_string()
}

/// Clean a file stem until it stops changing.
///
/// Returns the stem unchanged when cleaning would leave nothing.
pub fn clean_stem(stem: &str) -> String {
    let mut current = stem.to_string();
    for _ in 0..MAX_PASSES {
        let next = clean_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    if current.is_empty() {
        stem.to_string()
    } else {
        current
    }
}

/// Stage 0: rename the working copy to its cleaned name.
pub async fn normalize_filename(
    path: PathBuf,
    _ctx: Arc<StageContext>,
) -> Result<PathBuf, StageError> {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return Ok(path);
    };

    let cleaned = clean_stem(stem);
    if cleaned == stem {
        return Ok(path);
    }

    let file_name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{cleaned}.{ext}"),
        None => cleaned,
    };
    let new_path = path.with_file_name(file_name);

    info!("Renaming {} → {}", path.display(), new_path.display());
    tokio::fs::rename(&path, &new_path)
        .await
        .map_err(|e| StageError::io("rename", &path, e))?;
    Ok(new_path)
}
