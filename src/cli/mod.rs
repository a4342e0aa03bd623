mod embed;
mod enhance;
mod ingest;
mod mapper;
mod project;
mod report;
mod run;

pub use embed::*;
pub use enhance::*;
pub use ingest::*;
pub use mapper::*;
pub use project::*;
pub use report::*;
pub use run::*;

use crate::config::Opts;
use crate::pipeline::Pipeline;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> anyhow::Result<()>;
}

fn pipeline(opts: &Opts) -> Pipeline {
    Pipeline::new(opts.data_dir.clone(), opts.results_dir.clone())
}
