use anyhow::Result;
use clap::Parser;

use crate::cli::{SubCommandExtend, pipeline};
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct ReportCommand {}

impl SubCommandExtend for ReportCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        pipeline(opts).report()?;
        Ok(())
    }
}
