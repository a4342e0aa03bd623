use anyhow::Result;
use clap::Parser;

use crate::cli::{SubCommandExtend, pipeline};
use crate::config::{MapperOptions, Opts};

#[derive(Parser, Debug, Clone)]
pub struct MapperCommand {
    #[command(flatten)]
    pub mapper: MapperOptions,
}

impl SubCommandExtend for MapperCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let (graph, _) = pipeline(opts).mapper(&self.mapper)?;
        println!("{} 个节点，{} 条边", graph.nodes.len(), graph.links.len());
        Ok(())
    }
}
