//! Writer stream buffers that can spill to temp files
//!
//! Temp files are owned by a guard that removes them on drop, so they are
//! cleaned up on every exit path of a dump or merge (including `?` returns).
//! A failed removal is logged, never escalated: the dictionary itself is
//! already durable at that point.

use crate::Result;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::{Builder, NamedTempFile};

/// Removes its file when dropped
#[derive(Debug)]
pub struct TempFile {
    file: Option<NamedTempFile>,
}

impl TempFile {
    pub fn create_in(dir: &Path, label: &str) -> Result<(Self, File)> {
        fs::create_dir_all(dir)?;
        let named = Builder::new()
            .prefix(&format!("{}-", label))
            .suffix(".spill")
            .tempfile_in(dir)?;
        let handle = named.as_file().try_clone()?;
        Ok((Self { file: Some(named) }, handle))
    }

    #[cfg(test)]
    fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let path = file.path().to_path_buf();
            if let Err(e) = file.close() {
                log::warn!("failed to remove temp file {}: {}", path.display(), e);
            }
        }
    }
}

/// Append-only byte stream, in memory or backed by a temp file
pub enum SpillBuffer {
    Memory(Vec<u8>),
    File {
        writer: BufWriter<File>,
        len: u64,
        // dropped after `writer`, so the handle is closed before removal
        guard: TempFile,
    },
}

impl SpillBuffer {
    pub fn new(temp_dir: Option<&Path>, buffer_size: usize, label: &str) -> Result<Self> {
        match temp_dir {
            None => Ok(SpillBuffer::Memory(Vec::new())),
            Some(dir) => {
                let (guard, file) = TempFile::create_in(dir, label)?;
                Ok(SpillBuffer::File {
                    writer: BufWriter::with_capacity(buffer_size, file),
                    len: 0,
                    guard,
                })
            }
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            SpillBuffer::Memory(buf) => buf.len() as u64,
            SpillBuffer::File { len, .. } => *len,
        }
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self, SpillBuffer::File { .. })
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            SpillBuffer::Memory(buf) => buf.extend_from_slice(data),
            SpillBuffer::File { writer, len, .. } => {
                writer.write_all(data)?;
                *len += data.len() as u64;
            }
        }
        Ok(())
    }

    /// Copy the whole stream into `out`
    pub fn copy_to<W: Write>(&mut self, out: &mut W) -> Result<u64> {
        match self {
            SpillBuffer::Memory(buf) => {
                out.write_all(buf)?;
                Ok(buf.len() as u64)
            }
            SpillBuffer::File { writer, len, .. } => {
                writer.flush()?;
                let file = writer.get_mut();
                file.seek(SeekFrom::Start(0))?;
                let copied = io::copy(&mut Read::by_ref(file).take(*len), out)?;
                file.seek(SeekFrom::End(0))?;
                Ok(copied)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_buffer() {
        let mut buf = SpillBuffer::new(None, 16, "names").unwrap();
        buf.write_all(b"hello").unwrap();
        assert_eq!(buf.len(), 5);
        assert!(!buf.is_spilled());

        let mut out = Vec::new();
        assert_eq!(buf.copy_to(&mut out).unwrap(), 5);
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_spilled_buffer_removed_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let path;
        {
            let mut buf = SpillBuffer::new(Some(temp_dir.path()), 4, "info").unwrap();
            buf.write_all(b"abcdefgh").unwrap();
            buf.write_all(b"ij").unwrap();
            path = match &buf {
                SpillBuffer::File { guard, .. } => guard.path().unwrap().to_path_buf(),
                SpillBuffer::Memory(_) => unreachable!(),
            };
            assert!(path.exists());

            let mut out = Vec::new();
            assert_eq!(buf.copy_to(&mut out).unwrap(), 10);
            assert_eq!(out, b"abcdefghij");
        }
        assert!(!path.exists());
    }
}
