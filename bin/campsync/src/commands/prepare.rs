//! The `prepare` stage: users.json → timecamp_users.json.

use anyhow::{Context, Result};

use campsync_pipeline::PrepareArgs;

pub fn run(dry_run: bool, input: &str, output: &str) -> Result<()> {
    campsync_pipeline::run_prepare(&PrepareArgs {
        dry_run,
        input: input.to_string(),
        output: output.to_string(),
    })
    .context("prepare stage failed")?;
    Ok(())
}
