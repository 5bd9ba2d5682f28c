///
/// Context provider error types.
///
/// Every variant wrapping `std::io::Error` carries the `errno` observed
/// right after the failing libc call.
///

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Stack size {size} is below the minimum of {min} bytes")]
    InvalidStackSize { size: usize, min: usize },

    #[error("Failed to allocate a {size} byte stack: {source}")]
    StackAlloc {
        size: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to protect stack guard page: {0}")]
    GuardPage(#[source] std::io::Error),

    #[error("Failed to capture execution context: {0}")]
    Capture(#[source] std::io::Error),

    #[error("Failed to switch execution context: {0}")]
    Switch(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display_messages() {
        let err = ContextError::InvalidStackSize { size: 1024, min: 16384 };
        assert!(err.to_string().contains("1024"));
        assert!(err.to_string().contains("16384"));

        let err = ContextError::StackAlloc {
            size: 4096,
            source: io::Error::from_raw_os_error(libc::ENOMEM),
        };
        assert!(err.to_string().contains("Failed to allocate"));
        assert!(err.to_string().contains("4096"));

        let err = ContextError::GuardPage(io::Error::from_raw_os_error(libc::EACCES));
        assert!(err.to_string().contains("guard page"));

        let err = ContextError::Capture(io::Error::from_raw_os_error(libc::EINVAL));
        assert!(err.to_string().contains("capture"));

        let err = ContextError::Switch(io::Error::from_raw_os_error(libc::EINVAL));
        assert!(err.to_string().contains("switch"));
    }
}
