//! Firmware image loading and the stage-2 transport patch.

use crate::error::{Error, Result};
use log::debug;
use std::fs;
use std::path::PathBuf;

/// Offset of the byte the UART transport corrupts in stage-2 images.
pub const STAGE2_PATCH_OFFSET: usize = 7;

/// Bits that must be set at [`STAGE2_PATCH_OFFSET`] before transmission.
pub const STAGE2_PATCH_BITS: u8 = 0x03;

/// Return a copy of a stage-2 image prepared for UART transmission.
///
/// On the UART link the byte at offset 7 of the stage-2 firmware arrives in
/// RAM with bits 0x03 set, regardless of what was sent. Pre-setting those
/// bits on the host makes the image match what the device will execute; it
/// is not a semantic change to the firmware. The caller's buffer is left
/// untouched, and applying the patch twice is the same as applying it once.
pub fn patch_stage2(image: &[u8]) -> Result<Vec<u8>> {
    if image.len() <= STAGE2_PATCH_OFFSET {
        return Err(Error::ImageTooShort { len: image.len() });
    }
    let mut patched = image.to_vec();
    patched[STAGE2_PATCH_OFFSET] |= STAGE2_PATCH_BITS;
    Ok(patched)
}

/// Load a firmware image by name, searching the given directories.
///
/// The name is tried as-is first, then joined to each search directory in
/// order. The first existing file wins.
pub fn load_image(name: &str, search_dirs: &[PathBuf]) -> Result<Vec<u8>> {
    let mut candidates = vec![PathBuf::from(name)];
    candidates.extend(search_dirs.iter().map(|dir| dir.join(name)));

    for candidate in &candidates {
        if candidate.exists() {
            debug!("Loading firmware image from {}", candidate.display());
            return Ok(fs::read(candidate)?);
        }
    }

    Err(Error::ImageNotFound {
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_sets_low_bits_of_byte_7() {
        let image = vec![0u8; 16];
        let patched = patch_stage2(&image).unwrap();
        assert_eq!(patched[STAGE2_PATCH_OFFSET], 0x03);
        // Everything else untouched
        assert!(patched.iter().enumerate().all(|(i, &b)| i == STAGE2_PATCH_OFFSET || b == 0));
    }

    #[test]
    fn test_patch_does_not_mutate_caller_buffer() {
        let image = vec![0u8; 16];
        let _ = patch_stage2(&image).unwrap();
        assert_eq!(image[STAGE2_PATCH_OFFSET], 0);
    }

    #[test]
    fn test_patch_is_idempotent() {
        let mut image = vec![0xA5u8; 16];
        image[STAGE2_PATCH_OFFSET] = 0xF0;
        let once = patch_stage2(&image).unwrap();
        let twice = patch_stage2(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once[STAGE2_PATCH_OFFSET], 0xF3);
    }

    #[test]
    fn test_patch_rejects_short_image() {
        let image = vec![0u8; STAGE2_PATCH_OFFSET];
        assert!(matches!(
            patch_stage2(&image),
            Err(Error::ImageTooShort { len: 7 })
        ));
    }

    #[test]
    fn test_load_image_searches_directories() {
        let dir = std::env::temp_dir().join("fm3flash_test_image");
        let _ = fs::create_dir_all(&dir);
        fs::write(dir.join("stage2.bin"), [0xAA, 0xBB]).unwrap();

        let loaded = load_image("stage2.bin", std::slice::from_ref(&dir)).unwrap();
        assert_eq!(loaded, vec![0xAA, 0xBB]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_image_missing_reports_name() {
        let err = load_image("does-not-exist.bin", &[]).unwrap_err();
        assert!(matches!(err, Error::ImageNotFound { name } if name == "does-not-exist.bin"));
    }
}
