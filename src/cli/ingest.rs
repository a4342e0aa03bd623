use anyhow::Result;
use clap::Parser;

use crate::cli::{SubCommandExtend, pipeline};
use crate::config::Opts;
use crate::utils;

#[derive(Parser, Debug, Clone)]
pub struct IngestCommand {
    /// 扫描的文件后缀名，多个后缀用逗号分隔，不区分大小写
    #[arg(short, long, default_value = "tif,tiff,png,bmp,jpg")]
    pub suffix: String,
}

impl SubCommandExtend for IngestCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let re = utils::suffix_regex(&self.suffix)?;
        let summary = pipeline(opts).ingest(&re)?;
        println!("{} 位受试者，{} 张图片", summary.subject_count(), summary.samples.len());
        Ok(())
    }
}
