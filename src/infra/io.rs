use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

const MMAP_THRESHOLD: u64 = 1024 * 1024; // 1 MiB

/// File text, either mapped or read into memory
pub enum FileContent {
    Mapped(Mmap),
    Buffered(String),
}

impl FileContent {
    /// Borrow as UTF-8; invalid mapped bytes are replaced lossily
    pub fn to_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            FileContent::Mapped(mmap) => String::from_utf8_lossy(mmap),
            FileContent::Buffered(s) => std::borrow::Cow::Borrowed(s.as_str()),
        }
    }
}

/// Read a source file, memory-mapping anything over 1 MiB.
///
/// Decompiler output is occasionally not valid UTF-8, so small files are
/// decoded lossily as well instead of failing the whole scan.
pub fn read_file_smart<P: AsRef<Path>>(path: P) -> Result<FileContent> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read metadata for {}", path.display()))?;

    if metadata.len() > MMAP_THRESHOLD {
        let file =
            File::open(path).with_context(|| format!("Failed to open file {}", path.display()))?;

        // Safety: the map is read-only and dropped before the scan finishes
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to memory-map {}", path.display()))?;

        Ok(FileContent::Mapped(mmap))
    } else {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read file {}", path.display()))?;
        let content = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };

        Ok(FileContent::Buffered(content))
    }
}
