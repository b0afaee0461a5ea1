//! Runs the blob storage benchmark described by a configuration file.
//!
//! See [`blobbench::config`] for all configuration options.

use anyhow::Result;

fn main() -> Result<()> {
    blobbench::cli::execute()
}
