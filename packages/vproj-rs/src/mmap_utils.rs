use crate::error::{Result, VprojError};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Open a file and map it into memory (read-only)
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path).map_err(VprojError::Io)?;
    let mmap = unsafe { Mmap::map(&file).map_err(VprojError::Io)? };
    Ok(mmap)
}

/// Decode little-endian f64 values from a byte slice whose length is a
/// multiple of eight.
pub fn f64_le_values(bytes: &[u8]) -> impl Iterator<Item = f64> + '_ {
    bytes.chunks_exact(8).map(|chunk| {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        f64::from_le_bytes(buf)
    })
}
