use crate::client::Logger;
use crate::layer::ShipLayer;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// How [`init_tracing_with_config`] assembles the global subscriber.
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is
///   stacked on top of [`ShipLayer`] so events, including the client's
///   own diagnostics, are also printed locally.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    pub enable_stdout: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enable_stdout: true,
        }
    }
}

/// Install a [`Registry`] with [`ShipLayer`] as the global default
/// subscriber, so every `tracing` event in the process at or above the
/// logger's minimum level is shipped.
///
/// **Returns**
/// - `Err(..)` if a global subscriber was already installed.
pub fn init_tracing_with_config(
    logger: Logger,
    config: TracingConfig,
) -> Result<(), SetGlobalDefaultError> {
    let layer = ShipLayer::new(logger);

    // The two stacks have different types, so each is installed on its own.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Equivalent to [`init_tracing_with_config`] with [`TracingConfig::default`].
pub fn init_tracing(logger: Logger) -> Result<(), SetGlobalDefaultError> {
    init_tracing_with_config(logger, TracingConfig::default())
}
