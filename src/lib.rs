pub mod backbone;
pub mod cli;
pub mod config;
pub mod embed;
pub mod enhance;
pub mod ingest;
pub mod knn;
pub mod mapper;
pub mod pipeline;
pub mod plot;
pub mod report;
pub mod schema;
pub mod umap;
pub mod utils;

pub use config::Opts;
pub use pipeline::Pipeline;
