use anyhow::Result;
use clap::Parser;

use crate::cli::{SubCommandExtend, pipeline};
use crate::config::{EnhanceOptions, Opts};

#[derive(Parser, Debug, Clone)]
pub struct EnhanceCommand {
    #[command(flatten)]
    pub enhance: EnhanceOptions,
}

impl SubCommandExtend for EnhanceCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        pipeline(opts).enhance(&self.enhance)?;
        Ok(())
    }
}
