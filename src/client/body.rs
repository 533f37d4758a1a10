//! Response body capture with spill-to-disk
//!
//! Bytes are buffered in memory up to a threshold. The first chunk that
//! pushes the total past the threshold moves everything read so far into a
//! temporary file, and the rest of the stream is appended there. A
//! mime-specific ceiling is enforced on every chunk, independent of what the
//! `Content-Length` header announced.

use crate::{FetchError, FetchResult};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncWriteExt;
use tracing::{trace, warn};

/// Captured response body
#[derive(Debug)]
pub enum ResponseBody {
    InMemory(Vec<u8>),
    Spilled(TempBody),
}

impl ResponseBody {
    /// Measured length in bytes
    pub fn len(&self) -> u64 {
        match self {
            Self::InMemory(bytes) => bytes.len() as u64,
            Self::Spilled(body) => body.length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self, Self::Spilled(_))
    }

    /// Path of the spill file, if the body lives on disk
    pub fn temp_path(&self) -> Option<&Path> {
        match self {
            Self::InMemory(_) => None,
            Self::Spilled(body) => body.path(),
        }
    }

    /// Opens a blocking reader over the body
    pub fn reader(&self) -> io::Result<Box<dyn Read + '_>> {
        match self {
            Self::InMemory(bytes) => Ok(Box::new(bytes.as_slice())),
            Self::Spilled(body) => Ok(Box::new(body.open()?)),
        }
    }

    /// Reads the complete body
    ///
    /// Spilled bodies are read from disk, so call this from blocking context.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        match self {
            Self::InMemory(bytes) => Ok(bytes.clone()),
            Self::Spilled(body) => std::fs::read(body.path().ok_or_else(deleted)?),
        }
    }
}

fn deleted() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "spilled body was already deleted")
}

/// A body spilled to a temporary file
///
/// The file is removed when this value is dropped. Inside a tokio runtime the
/// removal runs on the blocking pool so the dropping task is never held up by
/// the filesystem.
#[derive(Debug)]
pub struct TempBody {
    path: Option<TempPath>,
    length: u64,
}

impl TempBody {
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn open(&self) -> io::Result<File> {
        File::open(self.path().ok_or_else(deleted)?)
    }
}

impl Drop for TempBody {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let delete = move || {
            let shown_path = path.display().to_string();
            if let Err(e) = path.close() {
                warn!("Could not delete temp file {}: {}", shown_path, e);
            } else {
                trace!("Deleted temp file {}", shown_path);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(delete);
            }
            Err(_) => delete(),
        }
    }
}

/// Size-bounded accumulator for a streamed body
pub struct SpillBuffer {
    url: String,
    threshold: u64,
    max_length: u64,
    temp_dir: PathBuf,
    length: u64,
    memory: Vec<u8>,
    spill: Option<(NamedTempFile, tokio::fs::File)>,
}

impl SpillBuffer {
    /// Creates a buffer
    ///
    /// # Arguments
    ///
    /// * `url` - URL the body belongs to (used in errors)
    /// * `threshold` - Largest body kept in memory
    /// * `max_length` - Largest body accepted at all
    /// * `temp_dir` - Directory receiving spill files
    pub fn new(url: &str, threshold: u64, max_length: u64, temp_dir: PathBuf) -> Self {
        Self {
            url: url.to_string(),
            threshold,
            max_length,
            temp_dir,
            length: 0,
            memory: Vec::new(),
            spill: None,
        }
    }

    /// Bytes accepted so far
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Appends one chunk of the body
    ///
    /// # Errors
    ///
    /// * `FetchError::MaxLengthExceeded` - the total would pass the ceiling;
    ///   any spill file is deleted before returning
    /// * `FetchError::Io` - the spill file could not be written
    pub async fn push(&mut self, chunk: &[u8]) -> FetchResult<()> {
        let next_length = self.length + chunk.len() as u64;
        if next_length > self.max_length {
            // NamedTempFile removes the file synchronously on drop
            self.spill = None;
            self.memory = Vec::new();
            return Err(FetchError::MaxLengthExceeded {
                url: self.url.clone(),
                length: next_length,
                max: self.max_length,
            });
        }

        if self.spill.is_none() && next_length > self.threshold {
            self.start_spill().await?;
        }

        match self.spill.as_mut() {
            Some((_, file)) => file.write_all(chunk).await.map_err(|source| FetchError::Io {
                url: self.url.clone(),
                source,
            })?,
            None => self.memory.extend_from_slice(chunk),
        }

        self.length = next_length;
        Ok(())
    }

    async fn start_spill(&mut self) -> FetchResult<()> {
        let io_error = |source| FetchError::Io {
            url: self.url.clone(),
            source,
        };

        let named = NamedTempFile::new_in(&self.temp_dir).map_err(io_error)?;
        let std_file = named.as_file().try_clone().map_err(io_error)?;
        let mut file = tokio::fs::File::from_std(std_file);
        file.write_all(&self.memory).await.map_err(io_error)?;

        trace!(
            "Spilling {} to {} after {} bytes",
            self.url,
            named.path().display(),
            self.memory.len()
        );
        self.memory = Vec::new();
        self.spill = Some((named, file));
        Ok(())
    }

    /// Completes the capture
    pub async fn finish(self) -> FetchResult<ResponseBody> {
        match self.spill {
            None => Ok(ResponseBody::InMemory(self.memory)),
            Some((named, mut file)) => {
                let url = self.url;
                file.flush().await.map_err(|source| FetchError::Io {
                    url: url.clone(),
                    source,
                })?;
                drop(file);
                Ok(ResponseBody::Spilled(TempBody {
                    path: Some(named.into_temp_path()),
                    length: self.length,
                }))
            }
        }
    }
}
