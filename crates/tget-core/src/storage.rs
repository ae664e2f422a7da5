//! Output file handling.
//!
//! A transfer writes its body sequentially into one file, either from the
//! start (truncating whatever was there) or from a resume offset. Every
//! chunk goes straight to the file with no user-space buffering, so after a
//! failure the file holds exactly the bytes written so far.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Where writing begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStart {
    /// Create or truncate, write from byte 0.
    Truncate,
    /// Create if missing, keep existing bytes, write from this offset.
    At(u64),
}

/// Sequential writer for one output file; tracks the current offset.
#[derive(Debug)]
pub struct OutputFile {
    file: File,
    path: PathBuf,
    offset: u64,
}

impl OutputFile {
    pub fn open(path: &Path, start: WriteStart) -> io::Result<Self> {
        let (file, offset) = match start {
            WriteStart::Truncate => {
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(path)?;
                (file, 0)
            }
            WriteStart::At(offset) => {
                let mut file = OpenOptions::new().create(true).write(true).open(path)?;
                file.seek(SeekFrom::Start(offset))?;
                (file, offset)
            }
        };
        Ok(Self {
            file,
            path: path.to_path_buf(),
            offset,
        })
    }

    /// Writes `data` at the current offset and advances it.
    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)?;
        self.offset += data.len() as u64;
        Ok(())
    }

    /// Offset of the next byte to be written (= bytes of the file that are valid).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush file data to disk.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_data()
    }
}

/// Size of the file at `path`, or `None` when it does not exist.
pub fn existing_len(path: &Path) -> io::Result<Option<u64>> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
