use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::config::MapperOptions;
use crate::schema::{SCHEMA_VERSION, check_version};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperNode {
    /// 形如 `cube3_cluster0`
    pub id: String,
    /// 样本行号，升序
    pub members: Vec<usize>,
}

impl MapperNode {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// 两个节点是否有共同的样本，成员列表均为升序
    pub fn intersects(&self, other: &MapperNode) -> bool {
        let (mut i, mut j) = (0, 0);
        while i < self.members.len() && j < other.members.len() {
            match self.members[i].cmp(&other.members[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => return true,
            }
        }
        false
    }
}

/// 无向边，source 在节点列表中位于 target 之前
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source: String,
    pub target: String,
}

/// 构建图时使用的参数，报告阶段会读取
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperParams {
    pub n_cubes: usize,
    pub perc_overlap: f32,
    pub eps: f32,
    pub min_samples: usize,
    pub cluster_space: String,
    pub title: String,
}

impl From<&MapperOptions> for MapperParams {
    fn from(opts: &MapperOptions) -> Self {
        Self {
            n_cubes: opts.n_cubes,
            perc_overlap: opts.perc_overlap,
            eps: opts.eps,
            min_samples: opts.min_samples,
            cluster_space: opts.cluster_space.to_string(),
            title: opts.title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperGraph {
    pub schema_version: u32,
    pub params: MapperParams,
    pub nodes: Vec<MapperNode>,
    pub links: Vec<Link>,
}

impl MapperGraph {
    pub fn new(params: MapperParams, nodes: Vec<MapperNode>) -> Self {
        let links = nerve(&nodes);
        Self { schema_version: SCHEMA_VERSION, params, nodes, links }
    }

    /// 至少属于一个节点的样本数量
    pub fn covered_samples(&self) -> usize {
        self.nodes.iter().flat_map(|n| n.members.iter()).unique().count()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("无法创建 {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("无法读取 {}", path.display()))?;
        let graph: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("{} 格式错误", path.display()))?;
        check_version(graph.schema_version, path)?;
        Ok(graph)
    }
}

/// 所有成员有交集的节点对
pub fn nerve(nodes: &[MapperNode]) -> Vec<Link> {
    nodes
        .iter()
        .tuple_combinations()
        .filter(|(a, b)| a.intersects(b))
        .map(|(a, b)| Link { source: a.id.clone(), target: b.id.clone() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, members: &[usize]) -> MapperNode {
        MapperNode { id: id.into(), members: members.to_vec() }
    }

    #[test]
    fn test_nerve() {
        let nodes = vec![node("a", &[0, 1, 2]), node("b", &[2, 3]), node("c", &[4]), node("d", &[1, 4])];
        let links = nerve(&nodes);
        let pairs: Vec<_> = links.iter().map(|l| (l.source.as_str(), l.target.as_str())).collect();
        assert_eq!(pairs, [("a", "b"), ("a", "d"), ("c", "d")]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        let graph = MapperGraph::new(
            MapperParams::from(&MapperOptions::default()),
            vec![node("cube0_cluster0", &[0, 1]), node("cube1_cluster0", &[1, 2])],
        );
        graph.save(&path).unwrap();
        assert_eq!(MapperGraph::load(&path).unwrap(), graph);
        assert_eq!(graph.covered_samples(), 3);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        let mut graph = MapperGraph::new(MapperParams::from(&MapperOptions::default()), vec![]);
        graph.schema_version = 99;
        graph.save(&path).unwrap();
        assert!(MapperGraph::load(&path).is_err());
    }
}
