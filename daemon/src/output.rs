use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Destination that receives finished BGRA frames
pub trait OutputSurface: Send {
    /// Replace the visible pixels with `data` (BGRA, `width * height * 4` bytes)
    fn present(&mut self, data: &[u8], width: u32, height: u32) -> Result<()>;
}

/// Memory-mapped BGRA framebuffer file for an external compositor to read
pub struct MappedOutput {
    path: PathBuf,
    mmap: memmap2::MmapMut,
    width: u32,
    height: u32,
    frames_presented: u64,
}

impl MappedOutput {
    pub fn create(path: impl AsRef<Path>, width: u32, height: u32) -> Result<Self> {
        let path = path.as_ref();
        let stride = width * 4; // 4 bytes per pixel (BGRA)
        let size = u64::from(stride) * u64::from(height);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open output surface: {}", path.display()))?;
        file.set_len(size)?;

        // Memory map the file
        let mmap = unsafe { memmap2::MmapMut::map_mut(&file)? };

        log::info!(
            "Output surface {}x{} mapped at {}",
            width,
            height,
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            width,
            height,
            frames_presented: 0,
        })
    }

}

impl OutputSurface for MappedOutput {
    fn present(&mut self, data: &[u8], width: u32, height: u32) -> Result<()> {
        if width != self.width || height != self.height || data.len() != self.mmap.len() {
            anyhow::bail!(
                "Frame size mismatch: surface is {}x{} ({} bytes), got {}x{} ({} bytes)",
                self.width,
                self.height,
                self.mmap.len(),
                width,
                height,
                data.len()
            );
        }

        self.mmap.copy_from_slice(data);
        self.frames_presented += 1;
        Ok(())
    }
}

impl Drop for MappedOutput {
    fn drop(&mut self) {
        if let Err(e) = self.mmap.flush() {
            log::warn!("Failed to flush output surface: {}", e);
        }
        log::debug!(
            "Output surface {} closed after {} frames",
            self.path.display(),
            self.frames_presented
        );
    }
}

/// Parse a hex color string (e.g., "#FF5733" or "FF5733") to RGBA
pub fn parse_hex_color(color: &str) -> Option<(u8, u8, u8, u8)> {
    let color = color.trim_start_matches('#');

    if color.len() != 6 && color.len() != 8 {
        return None;
    }

    let r = u8::from_str_radix(color.get(0..2)?, 16).ok()?;
    let g = u8::from_str_radix(color.get(2..4)?, 16).ok()?;
    let b = u8::from_str_radix(color.get(4..6)?, 16).ok()?;
    let a = if color.len() == 8 {
        u8::from_str_radix(color.get(6..8)?, 16).ok()?
    } else {
        255
    };

    Some((r, g, b, a))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF5733"), Some((255, 87, 51, 255)));
        assert_eq!(parse_hex_color("FF5733"), Some((255, 87, 51, 255)));
        assert_eq!(parse_hex_color("#FF573380"), Some((255, 87, 51, 128)));
        assert_eq!(parse_hex_color("000000"), Some((0, 0, 0, 255)));
        assert_eq!(parse_hex_color("invalid"), None);
        assert_eq!(parse_hex_color("ÄÄÄ"), None);
    }

    #[test]
    fn test_present_writes_mapped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.bgra");
        let mut output = MappedOutput::create(&path, 2, 2).unwrap();

        let frame: Vec<u8> = (0..16).collect();
        output.present(&frame, 2, 2).unwrap();
        drop(output);

        assert_eq!(std::fs::read(&path).unwrap(), frame);
    }

    #[test]
    fn test_present_rejects_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut output = MappedOutput::create(dir.path().join("frame.bgra"), 4, 4).unwrap();
        assert!(output.present(&[0u8; 16], 2, 2).is_err());
    }
}
