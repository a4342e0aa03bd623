use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use candle_core::Device;
use clap::{Parser, Subcommand, ValueEnum};

use crate::cli::*;

#[derive(Parser, Debug, Clone)]
pub struct EnhanceOptions {
    /// CLAHE 对比度裁剪阈值，越大局部对比度增强越明显
    #[arg(long, value_name = "LIMIT", default_value_t = 2.0)]
    pub clip_limit: f64,
    /// CLAHE 分块网格大小
    #[arg(long, value_name = "ROWSxCOLS", value_parser = parse_size, default_value = "8x8")]
    pub tile_grid: (i32, i32),
}

#[derive(Parser, Debug, Clone)]
pub struct BackboneOptions {
    /// ResNet-18 权重文件，safetensors 格式，使用 torchvision 的参数命名
    #[arg(long, value_name = "FILE", default_value = "models/resnet18.safetensors")]
    pub weights: PathBuf,
    /// 推理设备
    #[arg(long, value_enum, default_value_t = DeviceKind::Auto)]
    pub device: DeviceKind,
    /// 输入网络前缩放到的边长
    #[arg(long, value_name = "PIXELS", default_value_t = 224)]
    pub input_size: i32,
}

#[derive(Parser, Debug, Clone)]
pub struct UmapOptions {
    /// 构建近邻图时每个点的邻居数量（包括自身）
    #[arg(long, value_name = "K", default_value_t = 10)]
    pub n_neighbors: usize,
    /// 低维空间中点之间的最小距离
    #[arg(long, value_name = "DIST", default_value_t = 0.1)]
    pub min_dist: f32,
    /// 低维空间中点的分布尺度
    #[arg(long, value_name = "SPREAD", default_value_t = 1.0)]
    pub spread: f32,
    /// 优化轮数，不填则按样本数量自动选择
    #[arg(long, value_name = "N")]
    pub n_epochs: Option<usize>,
    /// 每个正样本对应的负采样数量
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub negative_sample_rate: usize,
    /// 随机种子
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Parser, Debug, Clone)]
pub struct MapperOptions {
    /// 每个维度上的区间数量
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub n_cubes: usize,
    /// 相邻区间的重叠比例，范围 [0, 1)
    #[arg(long, value_name = "RATIO", value_parser = parse_overlap, default_value = "0.3")]
    pub perc_overlap: f32,
    /// DBSCAN 邻域半径
    #[arg(long, value_name = "EPS", value_parser = parse_eps, default_value = "0.5")]
    pub eps: f32,
    /// DBSCAN 核心点所需的最少样本数（包括自身）
    #[arg(long, value_name = "N", value_parser = parse_min_samples, default_value = "3")]
    pub min_samples: usize,
    /// 聚类所在的空间
    #[arg(long, value_enum, default_value_t = ClusterSpace::Projection)]
    pub cluster_space: ClusterSpace,
    /// 可视化页面标题
    #[arg(long, default_value = "Fingerprint Mapper (UMAP lens)")]
    pub title: String,
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self::parse_from(["enhance"])
    }
}

impl Default for BackboneOptions {
    fn default() -> Self {
        Self::parse_from(["embed"])
    }
}

impl Default for UmapOptions {
    fn default() -> Self {
        Self::parse_from(["project"])
    }
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self::parse_from(["mapper"])
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "fingermapper", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 数据目录，各阶段的输入输出都位于其中
    #[arg(short, long, global = true, default_value = "data")]
    pub data_dir: DataDir,
    /// 分析报告的输出目录
    #[arg(short, long, global = true, default_value = "results")]
    pub results_dir: ResultsDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 按受试者整理原始指纹图片并转换为灰度 PNG
    Ingest(IngestCommand),
    /// 使用 CLAHE 增强图片对比度
    Enhance(EnhanceCommand),
    /// 使用预训练 ResNet-18 提取嵌入向量
    Embed(EmbedCommand),
    /// 使用 UMAP 将嵌入向量投影到二维
    Project(ProjectCommand),
    /// 在二维投影上构建 Mapper 图并计算节点纯度
    Mapper(MapperCommand),
    /// 生成分析报告
    Report(ReportCommand),
    /// 按顺序执行全部阶段
    Run(RunCommand),
}

/// 数据目录，统一管理各阶段产物的路径
#[derive(Debug, Clone)]
pub struct DataDir {
    path: PathBuf,
}

impl DataDir {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 原始图片目录
    pub fn raw(&self) -> PathBuf {
        self.path.join("raw")
    }

    /// 按受试者整理后的灰度图片目录
    pub fn processed(&self) -> PathBuf {
        self.path.join("processed")
    }

    /// CLAHE 增强后的图片目录
    pub fn enhanced(&self) -> PathBuf {
        self.path.join("enhanced")
    }

    pub fn embeddings(&self) -> PathBuf {
        self.path.join("embeddings")
    }

    /// 嵌入矩阵，N×512
    pub fn embeddings_x(&self) -> PathBuf {
        self.embeddings().join("X.npy")
    }

    /// 与嵌入矩阵逐行对应的元数据
    pub fn meta_csv(&self) -> PathBuf {
        self.embeddings().join("meta.csv")
    }

    pub fn umap(&self) -> PathBuf {
        self.path.join("umap")
    }

    /// 二维投影，N×2
    pub fn umap_x(&self) -> PathBuf {
        self.umap().join("X_umap.npy")
    }

    pub fn umap_plot(&self) -> PathBuf {
        self.umap().join("umap_plot.png")
    }

    pub fn mapper(&self) -> PathBuf {
        self.path.join("mapper")
    }

    pub fn mapper_html(&self) -> PathBuf {
        self.mapper().join("mapper.html")
    }

    /// Mapper 图结构（节点、成员、边）
    pub fn mapper_graph(&self) -> PathBuf {
        self.mapper().join("graph.json")
    }

    pub fn node_purity(&self) -> PathBuf {
        self.mapper().join("node_purity.csv")
    }
}

impl FromStr for DataDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// 报告目录
#[derive(Debug, Clone)]
pub struct ResultsDir {
    path: PathBuf,
}

impl ResultsDir {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn mapper_report(&self) -> PathBuf {
        self.path.join("mapper_analysis_report.json")
    }

    pub fn node_analysis(&self) -> PathBuf {
        self.path.join("node_analysis_detailed.csv")
    }

    pub fn subject_analysis(&self) -> PathBuf {
        self.path.join("subject_analysis.csv")
    }

    pub fn html_metadata(&self) -> PathBuf {
        self.path.join("html_visualization_metadata.json")
    }

    pub fn thesis_summary(&self) -> PathBuf {
        self.path.join("THESIS_SUMMARY.txt")
    }
}

impl FromStr for ResultsDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

fn parse_size(s: &str) -> anyhow::Result<(i32, i32)> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!("无效的尺寸: {}", s));
    }
    let size: (i32, i32) = (parts[0].parse()?, parts[1].parse()?);
    if size.0 <= 0 || size.1 <= 0 {
        return Err(anyhow::anyhow!("尺寸必须为正数: {}", s));
    }
    Ok(size)
}

fn parse_overlap(s: &str) -> Result<f32, String> {
    let v: f32 = s.parse().map_err(|_| format!("无效的重叠比例: {}", s))?;
    if (0.0..1.0).contains(&v) { Ok(v) } else { Err(format!("重叠比例必须位于 [0, 1): {}", s)) }
}

fn parse_eps(s: &str) -> Result<f32, String> {
    let v: f32 = s.parse().map_err(|_| format!("无效的邻域半径: {}", s))?;
    if v > 0.0 && v.is_finite() { Ok(v) } else { Err(format!("邻域半径必须为正数: {}", s)) }
}

fn parse_min_samples(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(v) if v >= 1 => Ok(v),
        _ => Err(format!("最少样本数必须为正整数: {}", s)),
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// 有 CUDA 时使用 GPU，否则使用 CPU
    Auto,
    Cpu,
    Cuda,
}

impl DeviceKind {
    /// 解析为实际的推理设备，只应在阶段开始时调用一次
    pub fn resolve(self) -> candle_core::Result<Device> {
        match self {
            Self::Auto => Device::cuda_if_available(0),
            Self::Cpu => Ok(Device::Cpu),
            Self::Cuda => Device::new_cuda(0),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterSpace {
    /// 在二维投影上聚类
    Projection,
    /// 在原始嵌入向量上聚类
    Embedding,
}

impl fmt::Display for ClusterSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Projection => write!(f, "projection"),
            Self::Embedding => write!(f, "embedding"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let umap = UmapOptions::default();
        assert_eq!(umap.n_neighbors, 10);
        assert_eq!(umap.seed, 42);
        let mapper = MapperOptions::default();
        assert_eq!(mapper.n_cubes, 10);
        assert_eq!(mapper.perc_overlap, 0.3);
        assert_eq!(mapper.min_samples, 3);
        assert_eq!(EnhanceOptions::default().tile_grid, (8, 8));
    }

    #[test]
    fn test_parse_overlap() {
        assert!(parse_overlap("0.45").is_ok());
        assert!(parse_overlap("1.0").is_err());
        assert!(parse_overlap("-0.1").is_err());
    }

    #[test]
    fn test_dbscan_options_validated() {
        assert!(parse_eps("0.25").is_ok());
        assert!(parse_eps("0").is_err());
        assert!(parse_eps("-0.5").is_err());
        assert!(MapperOptions::try_parse_from(["mapper", "--min-samples", "0"]).is_err());
        assert_eq!(MapperOptions::try_parse_from(["mapper", "--min-samples", "1"]).unwrap().min_samples, 1);
        assert!(MapperOptions::try_parse_from(["mapper", "--eps=-1"]).is_err());
    }

    #[test]
    fn test_data_dir_layout() {
        let dir = DataDir::new("data");
        assert_eq!(dir.meta_csv(), Path::new("data/embeddings/meta.csv"));
        assert_eq!(dir.node_purity(), Path::new("data/mapper/node_purity.csv"));
        assert_eq!(dir.umap_x(), Path::new("data/umap/X_umap.npy"));
    }
}
