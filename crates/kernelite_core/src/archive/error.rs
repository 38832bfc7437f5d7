//! Extraction failure taxonomy.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};

/// Stage at which an extraction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractErrorKind {
    Open,
    HeaderRead,
    HeaderWrite,
    BodyCopy,
    EntryFinish,
}

impl ExtractErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::HeaderRead => "header_read",
            Self::HeaderWrite => "header_write",
            Self::BodyCopy => "body_copy",
            Self::EntryFinish => "entry_finish",
        }
    }
}

/// Extraction failure with the archive, target and (when known) entry.
#[derive(Debug)]
pub enum ExtractError {
    Open {
        archive: PathBuf,
        target: PathBuf,
        source: io::Error,
    },
    HeaderRead {
        archive: PathBuf,
        target: PathBuf,
        source: io::Error,
    },
    HeaderWrite {
        archive: PathBuf,
        target: PathBuf,
        entry: PathBuf,
        source: io::Error,
    },
    BodyCopy {
        archive: PathBuf,
        target: PathBuf,
        entry: PathBuf,
        source: io::Error,
    },
    EntryFinish {
        archive: PathBuf,
        target: PathBuf,
        entry: PathBuf,
        source: io::Error,
    },
}

impl ExtractError {
    pub fn kind(&self) -> ExtractErrorKind {
        match self {
            Self::Open { .. } => ExtractErrorKind::Open,
            Self::HeaderRead { .. } => ExtractErrorKind::HeaderRead,
            Self::HeaderWrite { .. } => ExtractErrorKind::HeaderWrite,
            Self::BodyCopy { .. } => ExtractErrorKind::BodyCopy,
            Self::EntryFinish { .. } => ExtractErrorKind::EntryFinish,
        }
    }

    pub fn archive(&self) -> &Path {
        match self {
            Self::Open { archive, .. }
            | Self::HeaderRead { archive, .. }
            | Self::HeaderWrite { archive, .. }
            | Self::BodyCopy { archive, .. }
            | Self::EntryFinish { archive, .. } => archive,
        }
    }

    pub fn target(&self) -> &Path {
        match self {
            Self::Open { target, .. }
            | Self::HeaderRead { target, .. }
            | Self::HeaderWrite { target, .. }
            | Self::BodyCopy { target, .. }
            | Self::EntryFinish { target, .. } => target,
        }
    }

    /// Stored path of the entry being processed, once its header was read.
    pub fn entry(&self) -> Option<&Path> {
        match self {
            Self::Open { .. } | Self::HeaderRead { .. } => None,
            Self::HeaderWrite { entry, .. }
            | Self::BodyCopy { entry, .. }
            | Self::EntryFinish { entry, .. } => Some(entry),
        }
    }

    /// Underlying decoder or filesystem diagnostic.
    pub fn io_error(&self) -> &io::Error {
        match self {
            Self::Open { source, .. }
            | Self::HeaderRead { source, .. }
            | Self::HeaderWrite { source, .. }
            | Self::BodyCopy { source, .. }
            | Self::EntryFinish { source, .. } => source,
        }
    }
}

impl Display for ExtractError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "untar error ({}): {} while extracting {}",
            self.kind().as_str(),
            self.io_error(),
            self.archive().display()
        )?;
        if let Some(entry) = self.entry() {
            write!(f, " while writing {}", entry.display())?;
        }
        write!(f, " to {}", self.target().display())
    }
}

impl Error for ExtractError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.io_error())
    }
}
