//! The `sync` stage: timecamp_users.json → TimeCamp API.

use anyhow::{bail, Context, Result};

use campsync_pipeline::SyncArgs;

pub fn run(dry_run: bool, input: &str) -> Result<()> {
    let report = campsync_pipeline::run_sync(&SyncArgs {
        dry_run,
        input: input.to_string(),
    })
    .context("sync stage failed")?;

    if report.has_errors() {
        bail!("{} records failed to sync", report.errors.len());
    }
    Ok(())
}
