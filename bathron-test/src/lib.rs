//! Shared test bootstrap for the BATHRON workspace.
//!
//! Call [`init`] at the top of every test: it installs a tracing subscriber
//! with span-aware error context and a color-eyre panic/report handler,
//! exactly once per process.

use std::sync::Once;

use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub mod vectors;

static INIT: Once = Once::new();

/// Initialize global test context: tracing subscriber + color-eyre hooks.
///
/// Idempotent; safe to call from every test in a binary.
pub fn init() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer().with_target(false);
        let filter_layer =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(ErrorLayer::default())
            .init();

        color_eyre::install().expect("color-eyre hooks install once");
    })
}
