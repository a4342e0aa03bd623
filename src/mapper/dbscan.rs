use ndarray::ArrayView2;

use crate::knn::radius_neighbors;

/// 基于密度的聚类，标签分配顺序与 scikit-learn 相同
#[derive(Debug, Clone)]
pub struct Dbscan {
    pub eps: f32,
    /// 核心点邻域内的最少样本数，包括自身
    pub min_samples: usize,
}

impl Dbscan {
    pub fn new(eps: f32, min_samples: usize) -> Self {
        Self { eps, min_samples }
    }

    /// 返回每一行的簇标签，噪声点为 None
    pub fn fit(&self, data: ArrayView2<f32>) -> Vec<Option<usize>> {
        let n = data.nrows();
        let neighborhoods: Vec<Vec<usize>> = (0..n).map(|i| radius_neighbors(data, i, self.eps)).collect();
        let is_core: Vec<bool> = neighborhoods.iter().map(|nb| nb.len() >= self.min_samples).collect();

        let mut labels = vec![None; n];
        let mut label = 0;
        let mut stack = vec![];

        for start in 0..n {
            if labels[start].is_some() || !is_core[start] {
                continue;
            }
            let mut i = start;
            loop {
                if labels[i].is_none() {
                    labels[i] = Some(label);
                    if is_core[i] {
                        stack.extend(neighborhoods[i].iter().copied().filter(|&v| labels[v].is_none()));
                    }
                }
                match stack.pop() {
                    Some(next) => i = next,
                    None => break,
                }
            }
            label += 1;
        }

        labels
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_two_clusters_and_noise() {
        let data = array![[0.0f32], [0.2], [0.4], [5.0], [5.2], [5.4], [20.0]];
        let labels = Dbscan::new(0.5, 3).fit(data.view());
        assert_eq!(labels, [Some(0), Some(0), Some(0), Some(1), Some(1), Some(1), None]);
    }

    #[test]
    fn test_labels_follow_first_core_point() {
        let data = array![[10.0f32], [0.0], [10.1], [0.1], [10.2], [0.2]];
        let labels = Dbscan::new(0.5, 3).fit(data.view());
        assert_eq!(labels, [Some(0), Some(1), Some(0), Some(1), Some(0), Some(1)]);
    }

    #[test]
    fn test_border_point_joins_cluster() {
        // 0.9 不是核心点，但位于核心点 0.5 的邻域内
        let data = array![[0.0f32], [0.25], [0.5], [0.9]];
        let labels = Dbscan::new(0.5, 3).fit(data.view());
        assert_eq!(labels, [Some(0); 4]);
    }

    #[test]
    fn test_min_samples_counts_self() {
        let data = array![[0.0f32], [0.1], [9.0]];
        assert_eq!(Dbscan::new(0.5, 2).fit(data.view()), [Some(0), Some(0), None]);
        assert_eq!(Dbscan::new(0.5, 3).fit(data.view()), [None, None, None]);
    }
}
