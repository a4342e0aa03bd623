use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::schema::SCHEMA_VERSION;

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<title>(.*?)</title>").unwrap());
static GENERATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<meta name="generator" content="(.*?)""#).unwrap());
static META_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<div id="meta_content">(.*?)</div>"#).unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static NODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""node_id":\s*"([^"]+)""#).unwrap());
static EDGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)"source":\s*"([^"]+)".*?"target":\s*"([^"]+)""#).unwrap());

/// 页面中可以检测到的交互功能，按关键字匹配
const FEATURES: &[(&[&str], &str)] = &[
    (&["hover"], "Hover tooltips enabled"),
    (&["click"], "Click interactions available"),
    (&["zoom", "d3"], "Zoom/Pan capabilities"),
    (&["legend"], "Legend included"),
    (&["color"], "Color-coded visualization"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlAnalysis {
    pub title: Option<String>,
    pub generator: Option<String>,
    pub meta: Option<String>,
    pub nodes_detected: usize,
    pub edges_detected: usize,
    pub features: Vec<String>,
    pub visualization_type: String,
    pub lens: String,
    pub clustering_method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    pub what_it_shows: String,
    pub node_meaning: String,
    pub edge_meaning: String,
    pub color_meaning: String,
    pub size_meaning: String,
}

impl Default for Interpretation {
    fn default() -> Self {
        Self {
            what_it_shows: "How fingerprint embeddings organize topologically in the feature space".into(),
            node_meaning: "A cluster of fingerprints in a local region of embedding space".into(),
            edge_meaning: "Topological connectivity between clusters that share samples".into(),
            color_meaning: "Node purity: share of the dominant subject in each node".into(),
            size_meaning: "Number of samples in each topological region".into(),
        }
    }
}

/// html_visualization_metadata.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlMetadata {
    pub schema_version: u32,
    pub file: String,
    pub analysis: HtmlAnalysis,
    pub interpretation: Interpretation,
}

pub fn analyze(html: &str) -> HtmlAnalysis {
    let capture = |re: &Regex| re.captures(html).map(|c| c[1].to_owned());

    let meta = META_RE.captures(html).map(|c| {
        let text = TAG_RE.replace_all(&c[1], " ");
        SPACE_RE.replace_all(&text, " ").trim().to_owned()
    });
    let nodes: BTreeSet<&str> = NODE_RE.captures_iter(html).filter_map(|c| c.get(1)).map(|m| m.as_str()).collect();
    let edges = EDGE_RE.captures_iter(html).count();

    let lower = html.to_lowercase();
    let features = FEATURES
        .iter()
        .filter(|(keys, _)| keys.iter().any(|k| lower.contains(k)))
        .map(|(_, name)| name.to_string())
        .collect();

    HtmlAnalysis {
        title: capture(&TITLE_RE),
        generator: capture(&GENERATOR_RE),
        meta,
        nodes_detected: nodes.len(),
        edges_detected: edges,
        features,
        visualization_type: "Mapper - Topological Data Analysis".into(),
        lens: "UMAP 2D projection".into(),
        clustering_method: "DBSCAN".into(),
    }
}

impl HtmlMetadata {
    pub fn from_file(path: &Path) -> Result<Self> {
        let html = fs::read_to_string(path).with_context(|| format!("无法读取 {}", path.display()))?;
        Ok(Self {
            schema_version: SCHEMA_VERSION,
            file: path.display().to_string(),
            analysis: analyze(&html),
            interpretation: Interpretation::default(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("无法创建 {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn render(&self) -> String {
        let a = &self.analysis;
        let mut lines = vec![
            "ANALYZING MAPPER.HTML VISUALIZATION".to_owned(),
            format!("Title: {}", a.title.as_deref().unwrap_or("-")),
            format!("Generator: {}", a.generator.as_deref().unwrap_or("-")),
            format!("Meta: {}", a.meta.as_deref().unwrap_or("-")),
            format!("Total nodes in visualization: {}", a.nodes_detected),
            format!("Total edges in graph: {}", a.edges_detected),
            "Interactive features detected:".to_owned(),
        ];
        lines.extend(a.features.iter().map(|f| format!("  + {}", f)));
        lines.join("\n")
    }
}
