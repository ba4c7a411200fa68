//! Tracing bootstrap for binaries and test harnesses embedding the core

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{Result, TransferError};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set. A second call fails
/// with `Configuration` instead of replacing the installed subscriber.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter).map_err(|e| {
            TransferError::Configuration(format!("invalid log filter '{default_filter}': {e}"))
        })?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| TransferError::Configuration(format!("tracing already initialised: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        // Another test in this binary may already have installed one.
        let _ = init_tracing("info");
        assert!(matches!(
            init_tracing("debug"),
            Err(TransferError::Configuration(_))
        ));
    }
}
