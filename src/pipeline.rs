//! 各阶段的入口
//!
//! 每个阶段只通过数据目录中的文件与其他阶段交互，开始前检查上一阶段的产物是否存在。

use std::fs;

use anyhow::{Context, Result, bail};
use chrono::Local;
use log::{info, warn};
use ndarray::Array2;
use regex::Regex;

use crate::config::{
    BackboneOptions, ClusterSpace, DataDir, EnhanceOptions, MapperOptions, ResultsDir, UmapOptions,
};
use crate::embed::{EmbeddingSet, FeatureExtractor, ResNetExtractor, extract_dir};
use crate::enhance::{Clahe, enhance_dir};
use crate::ingest::{IngestSummary, ingest};
use crate::mapper::{Mapper, MapperGraph, graph_purity, visualize};
use crate::report::analysis::{MapperReport, subject_summaries};
use crate::report::html::HtmlMetadata;
use crate::report::thesis;
use crate::schema::{self, MetaRecord, NodePurity};
use crate::umap::Umap;
use crate::{plot, utils};

#[derive(Debug, Clone)]
pub struct Pipeline {
    pub data_dir: DataDir,
    pub results_dir: ResultsDir,
}

impl Pipeline {
    pub fn new(data_dir: DataDir, results_dir: ResultsDir) -> Self {
        Self { data_dir, results_dir }
    }

    pub fn ingest(&self, suffix: &Regex) -> Result<IngestSummary> {
        ingest(&self.data_dir.raw(), &self.data_dir.processed(), suffix)
    }

    pub fn enhance(&self, opts: &EnhanceOptions) -> Result<usize> {
        let input = self.data_dir.processed();
        utils::require(&input, "ingest")?;
        enhance_dir(&input, &self.data_dir.enhanced(), &Clahe::new(opts))
    }

    /// 使用 ResNet-18 提取嵌入向量
    pub fn embed(&self, opts: &BackboneOptions) -> Result<EmbeddingSet> {
        utils::require(&self.data_dir.enhanced(), "enhance")?;
        let extractor = ResNetExtractor::load(opts)?;
        self.embed_with(&extractor)
    }

    pub fn embed_with(&self, extractor: &impl FeatureExtractor) -> Result<EmbeddingSet> {
        let input = self.data_dir.enhanced();
        utils::require(&input, "enhance")?;
        let set = extract_dir(&input, extractor)?;
        set.save(&self.data_dir.embeddings_x(), &self.data_dir.meta_csv())?;
        info!("嵌入向量已保存到 {}", self.data_dir.embeddings().display());
        Ok(set)
    }

    pub fn project(&self, opts: &UmapOptions) -> Result<Array2<f32>> {
        let (x_path, meta_path) = (self.data_dir.embeddings_x(), self.data_dir.meta_csv());
        utils::require(&x_path, "embed")?;
        utils::require(&meta_path, "embed")?;
        let set = EmbeddingSet::load(&x_path, &meta_path)?;
        info!("读取嵌入向量 {:?}", set.vectors.dim());

        let projection = Umap::new(opts.clone()).fit_transform(set.vectors.view())?;

        fs::create_dir_all(self.data_dir.umap())?;
        schema::write_matrix(&self.data_dir.umap_x(), &projection)?;
        plot::save_scatter(&self.data_dir.umap_plot(), projection.view(), &set.meta, "UMAP of fingerprint embeddings")?;
        info!("二维投影已保存到 {}", self.data_dir.umap().display());
        Ok(projection)
    }

    pub fn mapper(&self, opts: &MapperOptions) -> Result<(MapperGraph, Vec<NodePurity>)> {
        let (umap_x, meta_path) = (self.data_dir.umap_x(), self.data_dir.meta_csv());
        utils::require(&umap_x, "project")?;
        utils::require(&meta_path, "embed")?;
        let (lens, meta) = schema::read_aligned(&umap_x, &meta_path, Some(2))?;

        let space = match opts.cluster_space {
            ClusterSpace::Projection => lens.clone(),
            ClusterSpace::Embedding => {
                let x_path = self.data_dir.embeddings_x();
                utils::require(&x_path, "embed")?;
                let x = schema::read_matrix(&x_path, None)?;
                if x.nrows() != lens.nrows() {
                    bail!("{} 有 {} 行，而二维投影有 {} 行", x_path.display(), x.nrows(), lens.nrows());
                }
                x
            }
        };

        let graph = Mapper::new(opts).map(lens.view(), space.view())?;
        if graph.nodes.is_empty() {
            warn!("Mapper 图中没有节点，可以尝试增大 eps 或减少 n_cubes");
        }
        let purity = graph_purity(&graph, &meta)?;

        fs::create_dir_all(self.data_dir.mapper())?;
        schema::write_csv(&self.data_dir.node_purity(), &purity)?;
        graph.save(&self.data_dir.mapper_graph())?;
        visualize::save(&self.data_dir.mapper_html(), &graph, &purity, meta.len())?;
        info!("Mapper 结果已保存到 {}", self.data_dir.mapper().display());
        Ok((graph, purity))
    }

    /// 依次生成分析报告、页面元数据和论文汇总
    pub fn report(&self) -> Result<MapperReport> {
        let d = &self.data_dir;
        let r = &self.results_dir;
        for (path, stage) in [
            (d.node_purity(), "mapper"),
            (d.mapper_graph(), "mapper"),
            (d.mapper_html(), "mapper"),
            (d.meta_csv(), "embed"),
        ] {
            utils::require(&path, stage)?;
        }
        fs::create_dir_all(r.path()).with_context(|| format!("无法创建 {}", r.path().display()))?;

        let purity = schema::read_csv::<NodePurity>(&d.node_purity())?;
        let meta = schema::read_csv::<MetaRecord>(&d.meta_csv())?;
        let graph = MapperGraph::load(&d.mapper_graph())?;
        if purity.is_empty() {
            warn!("{} 中没有节点", d.node_purity().display());
        }

        let report = MapperReport::build(&purity, &meta, &graph, Local::now());
        println!("{}", report.render(&purity));
        report.save(&r.mapper_report())?;
        schema::write_csv(&r.node_analysis(), &purity)?;
        schema::write_csv(&r.subject_analysis(), &subject_summaries(&purity))?;
        info!("分析报告已保存到 {}", r.mapper_report().display());

        let html = HtmlMetadata::from_file(&d.mapper_html())?;
        println!("{}", html.render());
        html.save(&r.html_metadata())?;
        info!("页面元数据已保存到 {}", r.html_metadata().display());

        let nodes = schema::read_csv::<NodePurity>(&r.node_analysis())?;
        let summary = thesis::render(&nodes, &meta, &graph.params, Local::now());
        fs::write(r.thesis_summary(), summary)
            .with_context(|| format!("无法写入 {}", r.thesis_summary().display()))?;
        info!("论文汇总已保存到 {}", r.thesis_summary().display());

        Ok(report)
    }
}
