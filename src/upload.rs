use std::io::Write;
use std::path::{Path, PathBuf};

use actix_multipart::Field;
use actix_web::web;
use futures_util::StreamExt;
use tempfile::Builder;

use crate::error::ApiError;

pub const TEMP_PREFIX: &str = ".upload-";

/// Reduces a client supplied name to its last path segment.
///
/// Returns `None` when nothing usable is left (`..`, `.`, trailing separators, NUL).
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." || name.contains('\0') {
        return None;
    }
    Some(name.to_string())
}

/// Streams one multipart field into `dir/name`, replacing any previous file.
///
/// Data is written to a `.upload-*` temporary file in the same directory and
/// renamed into place once complete, so a concurrent reader never sees a
/// partial upload. Dotfiles are never served by the static route.
pub async fn save_field(dir: &Path, name: &str, field: &mut Field) -> Result<PathBuf, ApiError> {
    let target = dir.join(name);

    let temp_dir = dir.to_path_buf();
    let mut file = web::block(move || {
        Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(temp_dir)
    })
    .await??;

    while let Some(chunk) = field.next().await {
        let data = chunk.map_err(|e| ApiError::Multipart(e.to_string()))?;
        file = web::block(move || file.write_all(&data).map(|_| file))
            .await??;
    }

    let destination = target.clone();
    web::block(move || file.persist(&destination).map_err(|e| e.error))
        .await??;

    Ok(target)
}
