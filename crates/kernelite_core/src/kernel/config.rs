//! Kernel configuration.
//!
//! Mirrors the connection-file shape used by kernel launchers. The host
//! transport ignores the socket fields; they are carried so a kernel built
//! here reports the same configuration its launcher handed it.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Transport name of the host-runtime transport.
pub const HOST_TRANSPORT: &str = "host";

/// Kernel configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub transport: String,
    pub ip: String,
    pub control_port: String,
    pub shell_port: String,
    pub stdin_port: String,
    pub iopub_port: String,
    pub hb_port: String,
    pub signature_scheme: String,
    pub key: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            transport: HOST_TRANSPORT.to_string(),
            ip: String::new(),
            control_port: String::new(),
            shell_port: String::new(),
            stdin_port: String::new(),
            iopub_port: String::new(),
            hb_port: String::new(),
            signature_scheme: String::new(),
            key: String::new(),
        }
    }
}

impl KernelConfig {
    /// Parses a JSON connection document; missing keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: None,
            source,
        })
    }

    /// Loads a JSON connection file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })
    }
}

/// Configuration loading failure.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read kernel config `{}`: {source}", path.display())
            }
            Self::Parse {
                path: Some(path),
                source,
            } => write!(f, "invalid kernel config `{}`: {source}", path.display()),
            Self::Parse { path: None, source } => write!(f, "invalid kernel config: {source}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, KernelConfig, HOST_TRANSPORT};

    #[test]
    fn partial_document_keeps_defaults() {
        let config = KernelConfig::from_json(r#"{"key": "secret", "signature_scheme": "hmac-sha256"}"#)
            .expect("partial config parses");
        assert_eq!(config.transport, HOST_TRANSPORT);
        assert_eq!(config.key, "secret");
        assert_eq!(config.signature_scheme, "hmac-sha256");
        assert!(config.shell_port.is_empty());
    }

    #[test]
    fn from_file_reports_missing_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = KernelConfig::from_file(dir.path().join("missing.json"))
            .expect_err("missing file must fail");
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn from_file_reads_connection_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("kernel.json");
        std::fs::write(&path, r#"{"transport": "tcp", "ip": "127.0.0.1", "shell_port": "5555"}"#)
            .expect("write config");

        let config = KernelConfig::from_file(&path).expect("config loads");
        assert_eq!(config.transport, "tcp");
        assert_eq!(config.ip, "127.0.0.1");
        assert_eq!(config.shell_port, "5555");
    }
}
