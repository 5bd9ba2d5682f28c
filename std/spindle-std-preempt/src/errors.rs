///
/// Preemption trigger error types.
///

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreemptError {
    #[error("Preemption period must be greater than zero")]
    InvalidPeriod,

    #[error("Failed to install preemption signal handler: {0}")]
    InstallHandler(#[source] std::io::Error),

    #[error("Failed to spawn preemption ticker thread: {0}")]
    Ticker(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display_messages() {
        let err = PreemptError::InvalidPeriod;
        assert!(err.to_string().contains("greater than zero"));

        let err = PreemptError::InstallHandler(io::Error::from_raw_os_error(libc::EINVAL));
        assert!(err.to_string().contains("signal handler"));

        let err = PreemptError::Ticker(io::Error::from_raw_os_error(libc::EAGAIN));
        assert!(err.to_string().contains("ticker thread"));
    }
}
