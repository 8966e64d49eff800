//! Tracing subscriber setup.
//!
//! Logs go to stderr so CLI output on stdout stays machine-readable. The
//! filter honours `RUST_LOG` and defaults to `info` for this crate.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "knowledge_center=info,knowledge_center_core=info,tower_http=info";

/// Install the global subscriber. `json` selects structured output.
pub fn init(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_DIRECTIVES))
        .map_err(|e| anyhow!("invalid log filter: {}", e))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}
