use anyhow::Result;
use clap::Parser;
use env_logger::Env;

use fingermapper::cli::SubCommandExtend;
use fingermapper::config::{Opts, SubCommand};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Ingest(config) => config.run(&opts),
        SubCommand::Enhance(config) => config.run(&opts),
        SubCommand::Embed(config) => config.run(&opts),
        SubCommand::Project(config) => config.run(&opts),
        SubCommand::Mapper(config) => config.run(&opts),
        SubCommand::Report(config) => config.run(&opts),
        SubCommand::Run(config) => config.run(&opts),
    }
}
