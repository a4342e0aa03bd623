use anyhow::Result;
use clap::Parser;

use crate::cli::{SubCommandExtend, pipeline};
use crate::config::{BackboneOptions, Opts};

#[derive(Parser, Debug, Clone)]
pub struct EmbedCommand {
    #[command(flatten)]
    pub backbone: BackboneOptions,
}

impl SubCommandExtend for EmbedCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let set = pipeline(opts).embed(&self.backbone)?;
        println!("{} 个嵌入向量，维度 {}", set.len(), set.vectors.ncols());
        Ok(())
    }
}
