//! Streaming access to stored payloads.
//!
//! A [`BlobWriter`] buffers in memory until the payload outgrows the inline
//! threshold, then spills to a staging file in the store root. Nothing is
//! visible to readers until [`BlobWriter::close`] commits; an aborted or
//! dropped writer leaves the store exactly as it was.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Write};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::entry::EntryKey;
use crate::error::{StoreError, StoreResult};
use crate::overflow::STAGING_EXTENSION;
use crate::store::BlobStore;

const STAGING_PREFIX: &str = ".staging-";

enum Sink {
    Buffer(Vec<u8>),
    File(BufWriter<NamedTempFile>),
    /// Closed, aborted, or poisoned by an earlier I/O error.
    Done,
}

/// Write handle for one entry.
pub struct BlobWriter<'a> {
    store: &'a BlobStore,
    entry: EntryKey,
    replace: bool,
    sink: Sink,
    written: u64,
    failed: bool,
}

impl<'a> BlobWriter<'a> {
    pub(crate) fn new(store: &'a BlobStore, entry: EntryKey, replace: bool) -> StoreResult<Self> {
        Ok(Self {
            store,
            entry,
            replace,
            sink: Sink::Buffer(Vec::new()),
            written: 0,
            failed: false,
        })
    }

    /// Entry this writer commits to.
    pub fn entry(&self) -> &EntryKey {
        &self.entry
    }

    /// Bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Returns `true` once the payload has spilled to a staging file.
    pub fn is_overflow(&self) -> bool {
        matches!(self.sink, Sink::File(_))
    }

    /// Commit the payload.
    ///
    /// On failure the entry is removed from the store before the error is
    /// returned, so a failed write never leaves a partial entry behind.
    pub fn close(mut self) -> StoreResult<()> {
        let sink = std::mem::replace(&mut self.sink, Sink::Done);
        let result = if self.failed {
            Err(StoreError::Io(io::Error::new(
                io::ErrorKind::Other,
                "write stream failed before close",
            )))
        } else {
            self.commit(sink)
        };

        match result {
            Ok(committed) => {
                if committed {
                    debug!(entry = %self.entry, len = self.written, "closed write stream");
                } else {
                    debug!(entry = %self.entry, "entry already cached; write discarded");
                }
                Ok(())
            }
            Err(e) => {
                warn!(entry = %self.entry, error = %e, "write stream failed; removing entry");
                self.store.remove_entry_quietly(&self.entry);
                Err(e)
            }
        }
    }

    /// Discard everything written so far.
    pub fn abort(mut self) {
        self.sink = Sink::Done;
        debug!(entry = %self.entry, "aborted write stream");
    }

    fn commit(&self, sink: Sink) -> StoreResult<bool> {
        match sink {
            Sink::Buffer(data) => self.store.commit_inline(&self.entry, &data, self.replace),
            Sink::File(writer) => {
                let staged = writer.into_inner().map_err(|e| StoreError::Io(e.into_error()))?;
                if self.store.config().write_sync {
                    staged.as_file().sync_all()?;
                }
                self.store.commit_overflow(&self.entry, staged, self.replace)
            }
            Sink::Done => Err(StoreError::Io(io::Error::new(
                io::ErrorKind::Other,
                "write stream already finished",
            ))),
        }
    }

    /// Move buffered bytes into a fresh staging file.
    fn promote(&self, buffered: &[u8]) -> io::Result<BufWriter<NamedTempFile>> {
        let staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(&format!(".{STAGING_EXTENSION}"))
            .tempfile_in(self.store.root())?;
        let mut writer = BufWriter::new(staged);
        writer.write_all(buffered)?;
        info!(
            entry = %self.entry,
            buffered = buffered.len(),
            "payload exceeds inline threshold; spilling to overflow file"
        );
        Ok(writer)
    }

    fn write_inner(&mut self, buf: &[u8]) -> io::Result<()> {
        let threshold = self.store.inline_threshold();
        match &mut self.sink {
            Sink::Buffer(buffer) if buffer.len() + buf.len() <= threshold => {
                buffer.extend_from_slice(buf);
            }
            Sink::Buffer(buffer) => {
                let buffered = std::mem::take(buffer);
                let mut writer = self.promote(&buffered)?;
                writer.write_all(buf)?;
                self.sink = Sink::File(writer);
            }
            Sink::File(writer) => writer.write_all(buf)?,
            Sink::Done => {
                return Err(io::Error::new(io::ErrorKind::Other, "write stream is closed"));
            }
        }
        Ok(())
    }
}

impl Write for BlobWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failed {
            return Err(io::Error::new(io::ErrorKind::Other, "write stream failed"));
        }
        match self.write_inner(buf) {
            Ok(()) => {
                self.written += buf.len() as u64;
                Ok(buf.len())
            }
            Err(e) => {
                // The staging file, if any, is deleted when the sink drops.
                self.failed = true;
                self.sink = Sink::Done;
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::File(writer) => writer.flush(),
            _ => Ok(()),
        }
    }
}

impl Drop for BlobWriter<'_> {
    fn drop(&mut self) {
        if !matches!(self.sink, Sink::Done) {
            debug!(entry = %self.entry, "write stream dropped without close; discarding");
        }
    }
}

impl std::fmt::Debug for BlobWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobWriter")
            .field("entry", &self.entry)
            .field("written", &self.written)
            .field("overflow", &self.is_overflow())
            .finish()
    }
}

/// Read handle over one stored payload.
#[derive(Debug)]
pub struct BlobReader {
    source: Source,
    len: u64,
}

#[derive(Debug)]
enum Source {
    Inline(Cursor<Vec<u8>>),
    Overflow(BufReader<File>),
}

impl BlobReader {
    pub(crate) fn inline(data: Vec<u8>) -> Self {
        Self {
            len: data.len() as u64,
            source: Source::Inline(Cursor::new(data)),
        }
    }

    pub(crate) fn overflow(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            len,
            source: Source::Overflow(BufReader::new(file)),
        })
    }

    /// Total payload length.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if the payload is served from an overflow file.
    pub fn is_overflow(&self) -> bool {
        matches!(self.source, Source::Overflow(_))
    }
}

impl Read for BlobReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.source {
            Source::Inline(cursor) => cursor.read(buf),
            Source::Overflow(reader) => reader.read(buf),
        }
    }
}
