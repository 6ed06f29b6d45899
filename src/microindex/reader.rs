use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{IndexError, Trailer};
use crate::error::{Error, Result};
use crate::value::TypeContext;
use crate::zngio;

/// Value stream over one section, or the tail of one section
pub type SectionReader = zngio::Reader<BufReader<Section>>;

#[derive(Debug)]
struct Handle {
    path: PathBuf,
    // None once the owning reader is closed
    file: Mutex<Option<File>>,
}

/// A byte window of an index file, read through its reader's handle
#[derive(Debug)]
pub struct Section {
    handle: Arc<Handle>,
    pos: u64,
    end: u64,
}

impl Read for Section {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.end || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min((self.end - self.pos) as usize);
        let mut guard = self.handle.file.lock();
        let file = guard.as_mut().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("microindex {} is closed", self.handle.path.display()),
            )
        })?;
        file.seek(SeekFrom::Start(self.pos))?;
        let n = file.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

/// Read access to the sections of a microindex file.
///
/// Level 0 is the base section holding the indexed records; levels
/// `1..=levels()` are the index levels, with the highest number at the top
/// of the tree. The reader owns the file handle and every section reader
/// it returns reads through it, so several may be live at once. After
/// [`Reader::close`] those section readers fail on their next read.
#[derive(Debug)]
pub struct Reader {
    handle: Arc<Handle>,
    zctx: TypeContext,
    trailer: Trailer,
}

impl Reader {
    /// Open `path` and read its trailer.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if the file does not exist and an
    /// `Invalid` error if it is not a readable microindex.
    pub fn open(path: impl AsRef<Path>, zctx: &TypeContext) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let op = || format!("microindex {}", path.display());
        let mut file = File::open(&path).map_err(|e| Error::wrap(op(), e.into()))?;
        let len = file.metadata().map_err(|e| Error::wrap(op(), e.into()))?.len();
        let trailer = Trailer::read(&mut file, len, zctx).map_err(|e| Error::wrap(op(), e))?;
        Ok(Self {
            zctx: zctx.clone(),
            trailer,
            handle: Arc::new(Handle {
                path,
                file: Mutex::new(Some(file)),
            }),
        })
    }

    /// Release the file handle. Section readers derived from this reader
    /// return an error from then on.
    pub fn close(self) {
        if self.handle.file.lock().take().is_some() {
            tracing::trace!(path = %self.handle.path.display(), "microindex closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.handle.file.lock().is_none()
    }

    pub fn path(&self) -> &Path {
        &self.handle.path
    }

    pub fn type_context(&self) -> &TypeContext {
        &self.zctx
    }

    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    /// True for an index built from no records
    pub fn is_empty(&self) -> bool {
        self.trailer.sections.first().copied().unwrap_or(0) == 0
    }

    /// Number of index levels above the base
    pub fn levels(&self) -> usize {
        self.trailer.levels()
    }

    /// Byte offset and length of a level's section within the file
    pub fn section_bounds(&self, level: usize) -> Result<(u64, u64)> {
        let sections = &self.trailer.sections;
        if sections.is_empty() || level > self.levels() {
            return Err(Error::not_found(format!(
                "microindex {} has no level {}",
                self.path().display(),
                level
            )));
        }
        let idx = if level == 0 { 0 } else { sections.len() - level };
        let start = sections[..idx].iter().sum();
        Ok((start, sections[idx]))
    }

    /// Values of a whole level, in order
    pub fn section_reader(&self, level: usize) -> Result<SectionReader> {
        self.frame_reader(level, 0)
    }

    /// Values of a level starting at the frame at `offset` within the
    /// section and running to the end of the section
    pub fn frame_reader(&self, level: usize, offset: u64) -> Result<SectionReader> {
        let (start, len) = self.section_bounds(level)?;
        if offset > len {
            return Err(IndexError::Corrupt(format!(
                "frame offset {} beyond level {} of {} bytes",
                offset, level, len
            ))
            .into());
        }
        if self.is_closed() {
            return Err(Error::other(format!("microindex {} is closed", self.path().display())));
        }
        let section = Section {
            handle: Arc::clone(&self.handle),
            pos: start + offset,
            end: start + len,
        };
        Ok(zngio::Reader::new(BufReader::new(section), self.zctx.clone()))
    }
}
