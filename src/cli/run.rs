use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::{SubCommandExtend, pipeline};
use crate::config::{BackboneOptions, EnhanceOptions, MapperOptions, Opts, UmapOptions};
use crate::utils;

#[derive(Parser, Debug, Clone)]
pub struct RunCommand {
    /// 扫描的文件后缀名，多个后缀用逗号分隔，不区分大小写
    #[arg(short, long, default_value = "tif,tiff,png,bmp,jpg")]
    pub suffix: String,
    #[command(flatten)]
    pub enhance: EnhanceOptions,
    #[command(flatten)]
    pub backbone: BackboneOptions,
    #[command(flatten)]
    pub umap: UmapOptions,
    #[command(flatten)]
    pub mapper: MapperOptions,
}

impl SubCommandExtend for RunCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let pipeline = pipeline(opts);
        let re = utils::suffix_regex(&self.suffix)?;

        info!("[1/6] 整理数据集");
        pipeline.ingest(&re)?;
        info!("[2/6] 对比度增强");
        pipeline.enhance(&self.enhance)?;
        info!("[3/6] 提取嵌入向量");
        pipeline.embed(&self.backbone)?;
        info!("[4/6] UMAP 投影");
        pipeline.project(&self.umap)?;
        info!("[5/6] 构建 Mapper 图");
        pipeline.mapper(&self.mapper)?;
        info!("[6/6] 生成报告");
        pipeline.report()?;
        Ok(())
    }
}
