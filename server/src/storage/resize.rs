use std::io::Cursor;
use std::sync::Arc;

use image::ImageError;
use tokio::task;

/// Longest side kept for event pictures.
pub const EVENT_IMAGE_MAX: u32 = 800;
/// Longest side kept for profile avatars.
pub const AVATAR_MAX: u32 = 300;

/// Shrinks an encoded image to fit `max_side` × `max_side`, keeping its
/// aspect ratio and format. `Ok(None)` means it already fits.
pub fn fit_within(data: &[u8], max_side: u32) -> Result<Option<Vec<u8>>, ImageError> {
    let format = image::guess_format(data)?;
    let img = image::load_from_memory_with_format(data, format)?;
    if img.width() <= max_side && img.height() <= max_side {
        return Ok(None);
    }

    let resized = img.thumbnail(max_side, max_side);
    let mut out = Vec::new();
    resized.write_to(&mut Cursor::new(&mut out), format)?;
    Ok(Some(out))
}

/// Runs [`fit_within`] on the blocking pool and never fails: when the image
/// cannot be decoded, or the task dies, the original bytes are kept and the
/// problem is logged.
pub async fn fit_or_keep_blocking(data: Vec<u8>, max_side: u32, what: &'static str) -> Vec<u8> {
    let data = Arc::new(data);
    let input = Arc::clone(&data);
    let joined = task::spawn_blocking(move || fit_within(&input, max_side)).await;
    let data = Arc::try_unwrap(data).unwrap_or_else(|shared| shared.as_ref().clone());

    match joined {
        Ok(result) => settle(data, result, max_side, what),
        Err(e) => {
            tracing::error!(what, error = %e, "Image resize task failed, storing it unchanged");
            data
        }
    }
}

fn settle(
    data: Vec<u8>,
    result: Result<Option<Vec<u8>>, ImageError>,
    max_side: u32,
    what: &str,
) -> Vec<u8> {
    match result {
        Ok(Some(resized)) => {
            tracing::debug!(
                what,
                max_side,
                before = data.len(),
                after = resized.len(),
                "Resized image"
            );
            resized
        }
        Ok(None) => data,
        Err(e) => {
            tracing::warn!(what, error = %e, "Could not resize image, storing it unchanged");
            data
        }
    }
}
