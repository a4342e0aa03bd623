//! Mapper 图
//!
//! 以二维投影为透镜，用重叠的超立方体覆盖，再在每个超立方体内用 DBSCAN 聚类，
//! 每个簇成为一个节点，有共同样本的节点之间连边。

mod cover;
mod dbscan;
mod graph;
mod purity;
pub mod visualize;

pub use cover::{Cover, Hypercube};
pub use dbscan::Dbscan;
pub use graph::{Link, MapperGraph, MapperNode, MapperParams, nerve};
pub use purity::{graph_purity, node_purity};

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use log::{debug, info};
use ndarray::{ArrayView2, Axis};

use crate::config::MapperOptions;

pub struct Mapper {
    cover: Cover,
    clusterer: Dbscan,
    params: MapperParams,
}

impl Mapper {
    pub fn new(opts: &MapperOptions) -> Self {
        Self {
            cover: Cover::new(opts.n_cubes, opts.perc_overlap),
            clusterer: Dbscan::new(opts.eps, opts.min_samples),
            params: MapperParams::from(opts),
        }
    }

    /// 以 lens 划分覆盖，在 space 的对应行上聚类
    pub fn map(&self, lens: ArrayView2<f32>, space: ArrayView2<f32>) -> Result<MapperGraph> {
        if lens.nrows() != space.nrows() {
            bail!("透镜有 {} 行，而聚类空间有 {} 行", lens.nrows(), space.nrows());
        }

        let cubes = self.cover.fit_transform(lens);
        info!("覆盖共 {} 个非空超立方体", cubes.len());

        let mut nodes = vec![];
        for (i, members) in cubes.iter().enumerate() {
            if members.len() < self.clusterer.min_samples {
                debug!("超立方体 {} 只有 {} 个样本，跳过", i, members.len());
                continue;
            }
            let sub = space.select(Axis(0), members);
            let labels = self.clusterer.fit(sub.view());

            let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
            for (row, label) in members.iter().zip(labels) {
                if let Some(label) = label {
                    clusters.entry(label).or_default().push(*row);
                }
            }
            debug!("超立方体 {}: {} 个样本，{} 个簇", i, members.len(), clusters.len());

            nodes.extend(
                clusters
                    .into_iter()
                    .map(|(label, members)| MapperNode { id: format!("cube{}_cluster{}", i, label), members }),
            );
        }

        let graph = MapperGraph::new(self.params.clone(), nodes);
        info!("Mapper 图构建完成，共 {} 个节点，{} 条边", graph.nodes.len(), graph.links.len());
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use super::*;

    fn opts(n_cubes: usize, eps: f32) -> MapperOptions {
        MapperOptions { n_cubes, perc_overlap: 0.3, eps, min_samples: 2, ..MapperOptions::default() }
    }

    #[test]
    fn test_single_cube_clusters() {
        let lens = array![[0.0f32, 0.0], [0.1, 0.0], [5.0, 5.0], [5.1, 5.0], [9.0, 0.0]];
        let graph = Mapper::new(&opts(1, 0.5)).map(lens.view(), lens.view()).unwrap();
        let ids: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["cube0_cluster0", "cube0_cluster1"]);
        assert_eq!(graph.nodes[0].members, [0, 1]);
        assert_eq!(graph.nodes[1].members, [2, 3]);
        assert!(graph.links.is_empty());
    }

    #[test]
    fn test_overlap_creates_links() {
        let lens: Array2<f32> = Array2::from_shape_fn((21, 2), |(i, d)| if d == 0 { i as f32 * 0.5 } else { 0.0 });
        let graph = Mapper::new(&opts(3, 0.6)).map(lens.view(), lens.view()).unwrap();
        assert!(graph.nodes.len() >= 3);
        assert!(!graph.links.is_empty());
        for link in &graph.links {
            let a = graph.nodes.iter().find(|n| n.id == link.source).unwrap();
            let b = graph.nodes.iter().find(|n| n.id == link.target).unwrap();
            assert!(a.intersects(b));
        }
    }

    #[test]
    fn test_cluster_in_embedding_space() {
        // 透镜上重合，但原始空间中分成两簇
        let lens = array![[0.0f32, 0.0], [0.0, 0.0], [0.0, 0.0], [0.0, 0.0]];
        let space = array![[0.0f32, 0.0, 0.0], [0.1, 0.0, 0.0], [9.0, 9.0, 9.0], [9.1, 9.0, 9.0]];
        let graph = Mapper::new(&opts(1, 0.5)).map(lens.view(), space.view()).unwrap();
        assert_eq!(graph.nodes.len(), 2);
    }

    #[test]
    fn test_misaligned_space_rejected() {
        let lens = array![[0.0f32, 0.0]];
        let space = array![[0.0f32], [1.0]];
        assert!(Mapper::new(&opts(1, 0.5)).map(lens.view(), space.view()).is_err());
    }
}
