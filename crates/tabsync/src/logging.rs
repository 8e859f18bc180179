//! Tracing setup for hosts that do not install their own subscriber.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Result, TabsyncError};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `filter` is used, e.g.
/// `"tabsync_sync=debug,info"`. Fails if the filter does not parse or a
/// global subscriber is already installed.
pub fn init_tracing(filter: &str) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => EnvFilter::try_new(filter).map_err(|e| TabsyncError::Logging(e.to_string()))?,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| TabsyncError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let _ = init_tracing("info");
        assert!(matches!(init_tracing("info"), Err(TabsyncError::Logging(_))));
    }
}
