use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors produced while resolving the hardware topology of a block device.
///
/// Callers building firmware device paths should treat every variant as "no usable topology".
/// [`TopologyError::UnsupportedDevice`] is an expected outcome for device classes the resolver
/// does not model, not a crash path.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("unsupported block device {major}:{minor}")]
    UnsupportedDevice { major: u64, minor: u64 },

    /// A sysfs link target did not match the expected grammar, either at the PCI root or after a
    /// bus-family prefix committed the parse to that family.
    #[error("malformed sysfs topology {path:?}: {reason}")]
    MalformedTopology { path: String, reason: &'static str },

    /// An auxiliary sysfs attribute needed after the primary path matched could not be opened,
    /// read or parsed.
    #[error("failed to look up {attribute}: {reason}")]
    TopologyLookupFailed { attribute: String, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl TopologyError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: &str, reason: &'static str) -> Self {
        Self::MalformedTopology {
            path: path.to_string(),
            reason,
        }
    }

    pub(crate) fn lookup(attribute: impl Into<String>, reason: impl ToString) -> Self {
        Self::TopologyLookupFailed {
            attribute: attribute.into(),
            reason: reason.to_string(),
        }
    }

    /// The OS error code of the failed syscall or ioctl, if this error came from one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}
