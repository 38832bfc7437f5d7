use crate::host::ConversionError;
use crate::kernel::history::HistoryError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type KernelResult<T> = Result<T, KernelError>;

/// Kernel construction and lifecycle errors.
#[derive(Debug)]
pub enum KernelError {
    AlreadyStarted,
    NotStarted,
    ShutDown,
    History(HistoryError),
    Conversion(ConversionError),
}

impl Display for KernelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "kernel already started"),
            Self::NotStarted => write!(f, "kernel has not been started"),
            Self::ShutDown => write!(f, "kernel has shut down"),
            Self::History(err) => write!(f, "{err}"),
            Self::Conversion(err) => write!(f, "{err}"),
        }
    }
}

impl Error for KernelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::History(err) => Some(err),
            Self::Conversion(err) => Some(err),
            Self::AlreadyStarted | Self::NotStarted | Self::ShutDown => None,
        }
    }
}

impl From<HistoryError> for KernelError {
    fn from(value: HistoryError) -> Self {
        Self::History(value)
    }
}

impl From<ConversionError> for KernelError {
    fn from(value: ConversionError) -> Self {
        Self::Conversion(value)
    }
}
