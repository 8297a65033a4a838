//! Mean-image loading.
//!
//! The mean image is a raw, headerless file of native-endian 32-bit floats,
//! one baseline sample per tensor element. Absence of the file means "no
//! normalization": the loader degrades to an all-zero buffer instead of
//! failing, and the same holds for a read error mid-stream (a partially read
//! buffer is discarded, never used).

use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

/// Loads the mean image at `path`, sized for `expected` tensor elements.
///
/// Returns a zero buffer of `expected` samples when the file is missing or
/// unreadable. When the file exists, its actual sample count is returned as-is
/// (trailing bytes short of a full float are dropped); the codec checks the
/// count against the tensor, so an undersized or oversized file surfaces there
/// as a size mismatch rather than here.
#[must_use]
pub fn load_mean_image(path: &Path, expected: usize) -> Vec<f32> {
    if !path.exists() {
        return vec![0.0; expected];
    }
    match read_floats(path) {
        Ok(samples) => samples,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "mean image read failed, using zero buffer");
            vec![0.0; expected]
        }
    }
}

fn read_floats(path: &Path) -> io::Result<Vec<f32>> {
    // fs::read releases the handle on every exit path.
    let bytes = fs::read(path)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
