//! Structured logging initialization.
//!
//! Call [`init`] once, early, from whatever process embeds this library.
//! Respects `RUST_LOG`; defaults the quorum crates to `info` otherwise.

use anyhow::Result;

/// Initialize a JSON-formatted `tracing` subscriber for the quorum crates.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bft_quorum=info".parse()?)
                .add_directive("qbft_security=info".parse()?)
                .add_directive("qbft_consensus=info".parse()?)
                .add_directive("qbft_audit=info".parse()?)
                .add_directive("qbft_strategy=info".parse()?),
        )
        .json()
        .init();
    Ok(())
}
