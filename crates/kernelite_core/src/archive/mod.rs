//! Gzip-compressed tar extraction.
//!
//! # Responsibility
//! - Unpack a `.tar.gz` archive into a target directory, entry by entry.
//! - Stream entry bodies in fixed-size blocks so memory use does not grow
//!   with entry size.
//!
//! # Invariants
//! - Entries are processed in archive order; the first failure aborts and
//!   entries fully written before it remain on disk. A regular file whose
//!   body or finalization failed is removed.
//! - No entry is written outside the target directory, either by its own
//!   path or through a link extracted earlier.
//! - Archive reader and disk writer are closed on every exit path.

mod error;
mod writer;

pub use error::{ExtractError, ExtractErrorKind};

use flate2::bufread::GzDecoder;
use log::{info, warn};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::time::Instant;
use tar::{Archive, Entry};
use writer::DiskWriter;

/// Read buffer size for the compressed stream.
pub const READ_BLOCK_SIZE: usize = 10240;
/// Block size used when streaming entry bodies to disk.
pub const COPY_BLOCK_SIZE: usize = 10240;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Counters for one successful extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub entries: u64,
    pub files: u64,
    pub directories: u64,
    /// Symbolic and hard links.
    pub links: u64,
    /// Devices, fifos and other entry kinds that were not written.
    pub skipped: u64,
    pub bytes_written: u64,
}

/// Extracts the gzip-compressed tar archive at `archive_path` into `target_dir`.
///
/// `target_dir` is created when missing. Re-extracting into the same
/// directory overwrites regular files.
///
/// # Errors
/// - `Open` when the archive is missing, unreadable or not gzip data, or the
///   target directory cannot be created.
/// - `HeaderRead` when an entry header cannot be decoded.
/// - `HeaderWrite` when an entry cannot be created on disk or its path
///   escapes the target directory, directly or through a link.
/// - `BodyCopy` when an entry body fails to stream or is truncated.
/// - `EntryFinish` when an entry cannot be finalized.
pub fn extract(
    archive_path: impl AsRef<Path>,
    target_dir: impl AsRef<Path>,
) -> Result<ExtractSummary, ExtractError> {
    let archive_path = archive_path.as_ref();
    let target_dir = target_dir.as_ref();
    let started_at = Instant::now();
    info!(
        "event=archive_extract module=archive status=start archive={} target={}",
        archive_path.display(),
        target_dir.display()
    );

    let result = Extraction::new(archive_path, target_dir).run();
    match &result {
        Ok(summary) => info!(
            "event=archive_extract module=archive status=ok archive={} entries={} files={} directories={} links={} skipped={} bytes={} duration_ms={}",
            archive_path.display(),
            summary.entries,
            summary.files,
            summary.directories,
            summary.links,
            summary.skipped,
            summary.bytes_written,
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event=archive_extract module=archive status=error archive={} kind={} duration_ms={} error={}",
            archive_path.display(),
            err.kind().as_str(),
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

struct Extraction<'p> {
    archive: &'p Path,
    target: &'p Path,
    summary: ExtractSummary,
}

impl<'p> Extraction<'p> {
    fn new(archive: &'p Path, target: &'p Path) -> Self {
        Self {
            archive,
            target,
            summary: ExtractSummary::default(),
        }
    }

    fn run(mut self) -> Result<ExtractSummary, ExtractError> {
        let reader = self.open().map_err(|source| self.open_error(source))?;
        std::fs::create_dir_all(self.target).map_err(|source| self.open_error(source))?;

        let writer = DiskWriter::new(self.target).map_err(|source| self.open_error(source))?;
        let mut archive = Archive::new(reader);
        let entries = archive
            .entries()
            .map_err(|source| self.header_read_error(source))?;

        for entry in entries {
            let entry = entry.map_err(|source| self.header_read_error(source))?;
            self.extract_entry(&writer, entry)?;
        }
        Ok(self.summary)
    }

    fn open(&self) -> io::Result<GzDecoder<BufReader<File>>> {
        let file = File::open(self.archive)?;
        let mut reader = BufReader::with_capacity(READ_BLOCK_SIZE, file);
        if !reader.fill_buf()?.starts_with(&GZIP_MAGIC) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "not a gzip-compressed archive",
            ));
        }
        Ok(GzDecoder::new(reader))
    }

    fn extract_entry<R: Read>(
        &mut self,
        writer: &DiskWriter<'_>,
        mut entry: Entry<'_, R>,
    ) -> Result<(), ExtractError> {
        let stored = entry
            .path()
            .map_err(|source| self.header_read_error(source))?
            .into_owned();
        self.summary.entries += 1;

        let destination = writer
            .resolve(&stored)
            .map_err(|source| self.header_write_error(&stored, source))?;
        let entry_type = entry.header().entry_type();

        if entry_type.is_dir() {
            writer
                .create_directory(&destination)
                .map_err(|source| self.header_write_error(&stored, source))?;
            self.summary.directories += 1;
            return Ok(());
        }

        if entry_type.is_symlink() || entry_type.is_hard_link() {
            return self.extract_link(writer, entry, &stored, &destination);
        }

        if !entry_type.is_file() {
            warn!(
                "event=archive_entry module=archive status=skipped archive={} entry={} entry_type={:?}",
                self.archive.display(),
                stored.display(),
                entry_type
            );
            self.summary.skipped += 1;
            return Ok(());
        }

        let mut file = writer
            .create_file(&destination)
            .map_err(|source| self.header_write_error(&stored, source))?;

        let expected = entry.size();
        if expected > 0 {
            if let Err(source) = copy_body(&mut entry, &mut file, expected) {
                file.discard();
                return Err(self.body_copy_error(&stored, source));
            }
        }
        let written = file.written();

        let mode = entry.header().mode().ok();
        file.finish(mode)
            .map_err(|source| self.entry_finish_error(&stored, source))?;
        self.summary.bytes_written += written;
        self.summary.files += 1;
        Ok(())
    }

    /// Links go through tar's own unpacking, which refuses link sources and
    /// parents resolving outside the target.
    fn extract_link<R: Read>(
        &mut self,
        writer: &DiskWriter<'_>,
        mut entry: Entry<'_, R>,
        stored: &Path,
        destination: &Path,
    ) -> Result<(), ExtractError> {
        if let Some(parent) = destination.parent() {
            writer
                .create_directory(parent)
                .map_err(|source| self.header_write_error(stored, source))?;
        }
        let unpacked = entry
            .unpack_in(writer.target())
            .map_err(|source| self.header_write_error(stored, source))?;
        if !unpacked {
            return Err(self.header_write_error(
                stored,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("entry path escapes target directory: {}", stored.display()),
                ),
            ));
        }
        self.summary.links += 1;
        Ok(())
    }

    fn open_error(&self, source: io::Error) -> ExtractError {
        ExtractError::Open {
            archive: self.archive.to_path_buf(),
            target: self.target.to_path_buf(),
            source,
        }
    }

    fn header_read_error(&self, source: io::Error) -> ExtractError {
        ExtractError::HeaderRead {
            archive: self.archive.to_path_buf(),
            target: self.target.to_path_buf(),
            source,
        }
    }

    fn header_write_error(&self, entry: &Path, source: io::Error) -> ExtractError {
        ExtractError::HeaderWrite {
            archive: self.archive.to_path_buf(),
            target: self.target.to_path_buf(),
            entry: entry.to_path_buf(),
            source,
        }
    }

    fn body_copy_error(&self, entry: &Path, source: io::Error) -> ExtractError {
        ExtractError::BodyCopy {
            archive: self.archive.to_path_buf(),
            target: self.target.to_path_buf(),
            entry: entry.to_path_buf(),
            source,
        }
    }

    fn entry_finish_error(&self, entry: &Path, source: io::Error) -> ExtractError {
        ExtractError::EntryFinish {
            archive: self.archive.to_path_buf(),
            target: self.target.to_path_buf(),
            entry: entry.to_path_buf(),
            source,
        }
    }
}

fn copy_body<R: Read>(
    body: &mut R,
    file: &mut writer::EntryFile,
    expected: u64,
) -> io::Result<()> {
    let mut block = vec![0u8; COPY_BLOCK_SIZE];
    loop {
        let read = match body.read(&mut block) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        file.write_block(&block[..read])?;
    }

    if file.written() < expected {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "entry body truncated: expected {expected} bytes, got {}",
                file.written()
            ),
        ));
    }
    Ok(())
}
