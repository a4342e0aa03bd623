use anyhow::Result;
use clap::Parser;

use crate::cli::{SubCommandExtend, pipeline};
use crate::config::{Opts, UmapOptions};

#[derive(Parser, Debug, Clone)]
pub struct ProjectCommand {
    #[command(flatten)]
    pub umap: UmapOptions,
}

impl SubCommandExtend for ProjectCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        pipeline(opts).project(&self.umap)?;
        Ok(())
    }
}
