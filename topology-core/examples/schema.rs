//! Print the JSON schemas of the persisted documents.
//!
//! Run with `cargo run --example schema` whenever a model changes, to refresh the published schemas.

use anyhow::{Context, Result};
use topology_core::model::{LocalConfig, RemoteConfig};

fn main() -> Result<()> {
    let remote = schemars::schema_for!(RemoteConfig);
    let remote_json = serde_json::to_string_pretty(&remote).context("error serializing RemoteConfig schema to json")?;
    println!("{}", remote_json);

    let local = schemars::schema_for!(LocalConfig);
    let local_json = serde_json::to_string_pretty(&local).context("error serializing LocalConfig schema to json")?;
    println!("{}", local_json);

    Ok(())
}
