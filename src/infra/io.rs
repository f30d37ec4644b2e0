use anyhow::{Context, Result};
use memmap2::Mmap;
use std::borrow::Cow;
use std::fs::File;
use std::path::Path;

const MMAP_THRESHOLD: u64 = 1024 * 1024; // 1 MiB

pub enum FileContent {
    Mapped(Mmap),
    Buffered(Vec<u8>),
}

impl FileContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContent::Mapped(mmap) => mmap,
            FileContent::Buffered(buf) => buf,
        }
    }

    /// UTF-8 view; invalid sequences become U+FFFD.
    pub fn text_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

pub fn read_file_smart<P: AsRef<Path>>(path: P) -> Result<FileContent> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read metadata for {}", path.display()))?;

    if metadata.len() > MMAP_THRESHOLD {
        let file =
            File::open(path).with_context(|| format!("Failed to open file {}", path.display()))?;

        // Safety: read-only map of a regular file
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to memory-map {}", path.display()))?;

        Ok(FileContent::Mapped(mmap))
    } else {
        let content =
            std::fs::read(path).with_context(|| format!("Failed to read file {}", path.display()))?;

        Ok(FileContent::Buffered(content))
    }
}

/// Strict UTF-8 read for parsers; non-UTF-8 files are errors.
pub fn read_source(path: &Path) -> Result<String> {
    let content = read_file_smart(path)?;
    let text = std::str::from_utf8(content.as_bytes())
        .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
    Ok(text.to_owned())
}

/// Live-side text for comparisons: a missing or unreadable file is "".
pub fn read_text_or_empty(path: &Path) -> String {
    match read_file_smart(path) {
        Ok(content) => content.text_lossy().into_owned(),
        Err(_) => String::new(),
    }
}
