//! Disk side of extraction: destination resolution and entry writing.

use log::warn;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

/// Writes extracted entries below one target directory.
pub(crate) struct DiskWriter<'t> {
    target: &'t Path,
    /// Canonical form of `target`, the bound for link resolution.
    root: PathBuf,
}

impl<'t> DiskWriter<'t> {
    /// Binds a writer to an existing target directory.
    pub(crate) fn new(target: &'t Path) -> io::Result<Self> {
        let root = fs::canonicalize(target)?;
        Ok(Self { target, root })
    }

    pub(crate) fn target(&self) -> &Path {
        self.target
    }

    /// Maps a stored entry path to its destination under the target.
    ///
    /// Absolute paths and `..` components are rejected; `.` is ignored.
    pub(crate) fn resolve(&self, stored: &Path) -> io::Result<PathBuf> {
        let mut destination = self.target.to_path_buf();
        for component in stored.components() {
            match component {
                Component::Normal(part) => destination.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(escape_error(stored));
                }
            }
        }
        Ok(destination)
    }

    pub(crate) fn create_directory(&self, destination: &Path) -> io::Result<()> {
        self.check_links(destination)?;
        fs::create_dir_all(destination)
    }

    /// Creates (or truncates) a regular file, creating parents first.
    ///
    /// A link already sitting at `destination` is replaced, never followed.
    pub(crate) fn create_file(&self, destination: &Path) -> io::Result<EntryFile> {
        if destination == self.target {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "file entry has an empty path",
            ));
        }
        if let Some(parent) = destination.parent() {
            self.check_links(parent)?;
            fs::create_dir_all(parent)?;
        }
        if is_symlink(destination)? {
            fs::remove_file(destination)?;
        }
        let file = File::create(destination)?;
        Ok(EntryFile {
            path: destination.to_path_buf(),
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Rejects `path` when an existing link on the way to it leads outside
    /// the target directory.
    fn check_links(&self, path: &Path) -> io::Result<()> {
        let Ok(relative) = path.strip_prefix(self.target) else {
            return Err(escape_error(path));
        };
        let mut current = self.target.to_path_buf();
        for component in relative.components() {
            current.push(component);
            if !is_symlink(&current)? {
                continue;
            }
            if !fs::canonicalize(&current)?.starts_with(&self.root) {
                return Err(escape_error(path));
            }
        }
        Ok(())
    }
}

/// `Ok(false)` for missing paths; links are not followed.
fn is_symlink(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(metadata) => Ok(metadata.file_type().is_symlink()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

fn escape_error(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("entry path escapes target directory: {}", path.display()),
    )
}

/// Open destination file for one regular entry.
///
/// Only [`EntryFile::finish`] keeps the file; every failure path removes it.
pub(crate) struct EntryFile {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl EntryFile {
    pub(crate) fn write_block(&mut self, block: &[u8]) -> io::Result<()> {
        self.writer.write_all(block)?;
        self.written += block.len() as u64;
        Ok(())
    }

    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    /// Flushes the body and applies the stored permission bits.
    pub(crate) fn finish(self, mode: Option<u32>) -> io::Result<()> {
        let Self { path, writer, .. } = self;
        let result = writer
            .into_inner()
            .map_err(|err| err.into_error())
            .and_then(|file| match mode {
                Some(mode) => apply_mode(&file, mode),
                None => Ok(()),
            });
        if result.is_err() {
            remove_partial(&path);
        }
        result
    }

    /// Closes and deletes a file whose body could not be completed.
    pub(crate) fn discard(self) {
        let Self { path, writer, .. } = self;
        // Buffered bytes are dropped unwritten.
        let (file, _) = writer.into_parts();
        drop(file);
        remove_partial(&path);
    }
}

fn remove_partial(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!(
            "event=archive_entry module=archive status=error action=remove_partial entry={} error={}",
            path.display(),
            err
        );
    }
}

#[cfg(unix)]
fn apply_mode(file: &File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode & 0o777))
}

#[cfg(not(unix))]
fn apply_mode(_file: &File, _mode: u32) -> io::Result<()> {
    Ok(())
}
