//! UMAP 降维
//!
//! 流程与 umap-learn 一致：
//! 1. 暴力求出每个点的 k 近邻（包括自身）
//! 2. 二分搜索每个点的平滑半径，得到有向的模糊隶属度
//! 3. 取模糊并集 A + Aᵀ - A∘Aᵀ 得到无向图
//! 4. 在二维空间中随机初始化，用带负采样的 SGD 优化交叉熵
//!
//! 所有随机数都来自同一个带种子的 StdRng，相同输入和参数的结果逐位一致。

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use indicatif::{ProgressBar, ProgressIterator};
use log::{debug, info, warn};
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::UmapOptions;
use crate::knn::batch_knn_euclidean;
use crate::utils::pb_style;

/// 输出维度
pub const N_COMPONENTS: usize = 2;

const SMOOTH_K_TOLERANCE: f32 = 1e-5;
const MIN_K_DIST_SCALE: f32 = 1e-3;
const SMOOTH_ITERATIONS: usize = 64;
const GRADIENT_CLIP: f32 = 4.0;

/// 求每个点的 (sigma, rho)
///
/// rho 为到最近的非零距离邻居的距离，sigma 使得
/// `sum(exp(-(d - rho) / sigma)) = log2(k)`。
/// distances 的每一行按升序排列，第一列是自身。
pub fn smooth_knn_dist(distances: &[Vec<f32>], k: usize) -> (Vec<f32>, Vec<f32>) {
    let target = (k as f32).log2();
    let n = distances.len();
    let mean_distances = distances.iter().flatten().sum::<f32>() / (n * k).max(1) as f32;

    let mut sigmas = vec![0.0; n];
    let mut rhos = vec![0.0; n];

    for (i, row) in distances.iter().enumerate() {
        let (mut lo, mut hi, mut mid) = (0.0f32, f32::INFINITY, 1.0f32);

        rhos[i] = row.iter().copied().find(|d| *d > 0.0).unwrap_or(0.0);

        for _ in 0..SMOOTH_ITERATIONS {
            let psum: f32 = row[1..]
                .iter()
                .map(|d| {
                    let d = d - rhos[i];
                    if d > 0.0 { (-d / mid).exp() } else { 1.0 }
                })
                .sum();

            if (psum - target).abs() < SMOOTH_K_TOLERANCE {
                break;
            }
            if psum > target {
                hi = mid;
                mid = (lo + hi) / 2.0;
            } else {
                lo = mid;
                if hi == f32::INFINITY {
                    mid *= 2.0;
                } else {
                    mid = (lo + hi) / 2.0;
                }
            }
        }

        // 避免 sigma 过小导致隶属度退化
        let floor = if rhos[i] > 0.0 {
            MIN_K_DIST_SCALE * row.iter().sum::<f32>() / row.len() as f32
        } else {
            MIN_K_DIST_SCALE * mean_distances
        };
        sigmas[i] = mid.max(floor);
    }

    (sigmas, rhos)
}

/// 对称的带权 k 近邻图
#[derive(Debug, Clone, Default)]
pub struct FuzzyGraph {
    pub n_vertices: usize,
    /// (i, j) -> 权重，i 与 j 两个方向都会存储
    pub edges: BTreeMap<(usize, usize), f32>,
}

impl FuzzyGraph {
    pub fn weight(&self, i: usize, j: usize) -> f32 {
        self.edges.get(&(i, j)).copied().unwrap_or(0.0)
    }

    pub fn max_weight(&self) -> f32 {
        self.edges.values().copied().fold(0.0, f32::max)
    }
}

/// 根据 k 近邻结果构建模糊单纯集
pub fn fuzzy_simplicial_set(indices: &[Vec<usize>], distances: &[Vec<f32>], k: usize) -> FuzzyGraph {
    let (sigmas, rhos) = smooth_knn_dist(distances, k);

    let mut directed: BTreeMap<(usize, usize), f32> = BTreeMap::new();
    for (i, (row_idx, row_dis)) in indices.iter().zip(distances).enumerate() {
        for (&j, &d) in row_idx.iter().zip(row_dis) {
            if j == i {
                continue;
            }
            let w = if d - rhos[i] <= 0.0 || sigmas[i] == 0.0 {
                1.0
            } else {
                (-(d - rhos[i]) / sigmas[i]).exp()
            };
            directed.insert((i, j), w);
        }
    }

    let mut edges = BTreeMap::new();
    for (&(i, j), &w) in &directed {
        let wt = directed.get(&(j, i)).copied().unwrap_or(0.0);
        let union = w + wt - w * wt;
        if union > 0.0 {
            edges.insert((i, j), union);
            edges.insert((j, i), union);
        }
    }

    FuzzyGraph { n_vertices: indices.len(), edges }
}

/// 拟合低维相似度曲线 `1 / (1 + a * x^(2b))` 的参数 a、b
///
/// 目标曲线在 x < min_dist 时为 1，之后以 spread 为尺度指数衰减。
/// 使用 Levenberg-Marquardt 求最小二乘解。
pub fn find_ab_params(spread: f32, min_dist: f32) -> (f32, f32) {
    let (spread, min_dist) = (spread as f64, min_dist as f64);
    let n = 300;
    let xs: Vec<f64> = (0..n).map(|i| 3.0 * spread * i as f64 / (n - 1) as f64).collect();
    let ys: Vec<f64> =
        xs.iter().map(|&x| if x < min_dist { 1.0 } else { (-(x - min_dist) / spread).exp() }).collect();

    let curve = |a: f64, b: f64, x: f64| 1.0 / (1.0 + a * x.powf(2.0 * b));
    let sse = |a: f64, b: f64| xs.iter().zip(&ys).map(|(&x, &y)| (curve(a, b, x) - y).powi(2)).sum::<f64>();

    let (mut a, mut b) = (1.0f64, 1.0f64);
    let mut lambda = 1e-3;
    let mut err = sse(a, b);

    for _ in 0..200 {
        // 构建 JᵀJ 与 Jᵀr
        let (mut jaa, mut jab, mut jbb, mut ga, mut gb) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for (&x, &y) in xs.iter().zip(&ys) {
            if x <= 0.0 {
                continue;
            }
            let u = x.powf(2.0 * b);
            let denom = (1.0 + a * u).powi(2);
            let da = -u / denom;
            let db = -a * u * 2.0 * x.ln() / denom;
            let r = y - curve(a, b, x);
            jaa += da * da;
            jab += da * db;
            jbb += db * db;
            ga += da * r;
            gb += db * r;
        }

        let mut improved = false;
        while lambda < 1e10 {
            let (maa, mbb) = (jaa * (1.0 + lambda), jbb * (1.0 + lambda));
            let det = maa * mbb - jab * jab;
            if det.abs() < f64::EPSILON {
                lambda *= 10.0;
                continue;
            }
            let step_a = (mbb * ga - jab * gb) / det;
            let step_b = (maa * gb - jab * ga) / det;
            let (na, nb) = (a + step_a, b + step_b);
            let new_err = if na > 0.0 && nb > 0.0 { sse(na, nb) } else { f64::INFINITY };
            if new_err < err {
                let converged = (err - new_err) <= 1e-12 * err.max(1e-300);
                a = na;
                b = nb;
                err = new_err;
                lambda = (lambda / 10.0).max(1e-12);
                improved = !converged;
                break;
            }
            lambda *= 10.0;
        }
        if !improved {
            break;
        }
    }

    (a as f32, b as f32)
}

/// 图上的一条有向边及其采样调度
#[derive(Debug, Clone, Copy)]
struct Edge {
    head: usize,
    tail: usize,
    epochs_per_sample: f32,
}

/// 用 SGD 优化嵌入
///
/// 每条边每隔 epochs_per_sample 轮被采样一次，同时进行
/// negative_sample_rate 次负采样；学习率从 1 线性衰减到 0。
#[allow(clippy::too_many_arguments)]
fn optimize_layout(
    embedding: &mut [[f32; N_COMPONENTS]],
    edges: &[Edge],
    n_epochs: usize,
    a: f32,
    b: f32,
    negative_sample_rate: usize,
    rng: &mut StdRng,
) {
    let n_vertices = embedding.len();
    let gamma = 1.0f32;
    let neg_rate = negative_sample_rate.max(1) as f32;

    let epochs_per_negative_sample: Vec<f32> = edges.iter().map(|e| e.epochs_per_sample / neg_rate).collect();
    let mut epoch_of_next_negative_sample = epochs_per_negative_sample.clone();
    let mut epoch_of_next_sample: Vec<f32> = edges.iter().map(|e| e.epochs_per_sample).collect();

    let clip = |v: f32| v.clamp(-GRADIENT_CLIP, GRADIENT_CLIP);
    let rdist = |x: &[f32; N_COMPONENTS], y: &[f32; N_COMPONENTS]| {
        x.iter().zip(y).map(|(a, b)| (a - b) * (a - b)).sum::<f32>()
    };

    let pb = ProgressBar::new(n_epochs as u64).with_style(pb_style());
    for epoch in (0..n_epochs).progress_with(pb.clone()) {
        let alpha = 1.0 - epoch as f32 / n_epochs as f32;
        let epoch_f = epoch as f32;

        for (i, edge) in edges.iter().enumerate() {
            if epoch_of_next_sample[i] > epoch_f {
                continue;
            }
            let (j, k) = (edge.head, edge.tail);

            let mut current = embedding[j];
            let mut other = embedding[k];
            let dist_squared = rdist(&current, &other);
            let grad_coeff = if dist_squared > 0.0 {
                -2.0 * a * b * dist_squared.powf(b - 1.0) / (a * dist_squared.powf(b) + 1.0)
            } else {
                0.0
            };
            for d in 0..N_COMPONENTS {
                let grad = clip(grad_coeff * (current[d] - other[d]));
                current[d] += grad * alpha;
                other[d] -= grad * alpha;
            }
            embedding[k] = other;
            embedding[j] = current;

            epoch_of_next_sample[i] += edge.epochs_per_sample;

            let n_neg = ((epoch_f - epoch_of_next_negative_sample[i]) / epochs_per_negative_sample[i]).max(0.0)
                as usize;
            for _ in 0..n_neg {
                let k = rng.random_range(0..n_vertices);
                let other = embedding[k];
                let dist_squared = rdist(&current, &other);
                let grad_coeff = if dist_squared > 0.0 {
                    2.0 * gamma * b / ((0.001 + dist_squared) * (a * dist_squared.powf(b) + 1.0))
                } else if j == k {
                    continue;
                } else {
                    0.0
                };
                for d in 0..N_COMPONENTS {
                    let grad =
                        if grad_coeff > 0.0 { clip(grad_coeff * (current[d] - other[d])) } else { GRADIENT_CLIP };
                    current[d] += grad * alpha;
                }
            }
            embedding[j] = current;
            epoch_of_next_negative_sample[i] += n_neg as f32 * epochs_per_negative_sample[i];
        }
    }
    pb.finish_and_clear();
}

pub struct Umap {
    opts: UmapOptions,
}

impl Umap {
    pub fn new(opts: UmapOptions) -> Self {
        Self { opts }
    }

    /// 默认的优化轮数，与 umap-learn 相同
    pub fn default_epochs(n: usize) -> usize {
        if n <= 10000 { 500 } else { 200 }
    }

    /// 将 N×D 的矩阵投影为 N×2
    pub fn fit_transform(&self, data: ArrayView2<f32>) -> Result<Array2<f32>> {
        let n = data.nrows();
        if n == 0 {
            bail!("没有可以投影的样本");
        }
        if n == 1 {
            info!("只有一个样本，投影到原点");
            return Ok(Array2::zeros((1, N_COMPONENTS)));
        }

        let k = self.opts.n_neighbors.clamp(2, n);
        if k != self.opts.n_neighbors {
            warn!("邻居数量 {} 调整为 {}", self.opts.n_neighbors, k);
        }
        let n_epochs = self.opts.n_epochs.unwrap_or_else(|| Self::default_epochs(n));

        info!("计算 {} 个样本的 {} 近邻", n, k);
        let (indices, distances) = batch_knn_euclidean(data, data, k);
        let graph = fuzzy_simplicial_set(&indices, &distances, k);

        let max_weight = graph.max_weight();
        let edges: Vec<Edge> = graph
            .edges
            .iter()
            .filter(|&(_, &w)| w > 0.0 && w >= max_weight / n_epochs as f32)
            .map(|(&(head, tail), &w)| Edge { head, tail, epochs_per_sample: max_weight / w })
            .collect();
        debug!("近邻图共 {} 条有向边，保留 {} 条", graph.edges.len(), edges.len());

        let (a, b) = find_ab_params(self.opts.spread, self.opts.min_dist);
        debug!("曲线参数 a = {:.4}, b = {:.4}", a, b);

        let mut rng = StdRng::seed_from_u64(self.opts.seed);
        let mut embedding: Vec<[f32; N_COMPONENTS]> =
            (0..n).map(|_| [rng.random_range(-10.0..10.0), rng.random_range(-10.0..10.0)]).collect();
        rescale(&mut embedding);

        info!("优化嵌入，共 {} 轮", n_epochs);
        optimize_layout(&mut embedding, &edges, n_epochs, a, b, self.opts.negative_sample_rate, &mut rng);

        let flat: Vec<f32> = embedding.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((n, N_COMPONENTS), flat)?)
    }
}

/// 将每一维线性缩放到 [0, 10]
fn rescale(embedding: &mut [[f32; N_COMPONENTS]]) {
    for d in 0..N_COMPONENTS {
        let min = embedding.iter().map(|p| p[d]).fold(f32::INFINITY, f32::min);
        let max = embedding.iter().map(|p| p[d]).fold(f32::NEG_INFINITY, f32::max);
        let range = max - min;
        for p in embedding.iter_mut() {
            p[d] = if range > 0.0 { 10.0 * (p[d] - min) / range } else { 0.0 };
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn blobs(per_blob: usize) -> Array2<f32> {
        let mut rng = StdRng::seed_from_u64(7);
        let centers = [[0.0f32; 8], [20.0; 8]];
        let mut data = Array2::zeros((per_blob * 2, 8));
        for (i, mut row) in data.rows_mut().into_iter().enumerate() {
            let c = &centers[i / per_blob];
            for (d, v) in row.iter_mut().enumerate() {
                *v = c[d] + rng.random_range(-1.0..1.0);
            }
        }
        data
    }

    fn opts(n_epochs: usize) -> UmapOptions {
        UmapOptions { n_neighbors: 5, n_epochs: Some(n_epochs), ..UmapOptions::default() }
    }

    #[test]
    fn test_find_ab_params() {
        let (a, b) = find_ab_params(1.0, 0.1);
        assert!((a - 1.577).abs() < 0.01, "a = {}", a);
        assert!((b - 0.895).abs() < 0.01, "b = {}", b);
    }

    #[test]
    fn test_smooth_knn_dist_hits_target() {
        let distances = vec![vec![0.0, 1.0, 2.0, 3.0]];
        let (sigmas, rhos) = smooth_knn_dist(&distances, 4);
        assert_eq!(rhos[0], 1.0);
        let psum: f32 = distances[0][1..].iter().map(|d| (-(d - rhos[0]).max(0.0) / sigmas[0]).exp()).sum();
        assert!((psum - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_graph_is_symmetric() {
        let data = blobs(10);
        let (indices, distances) = batch_knn_euclidean(data.view(), data.view(), 5);
        let graph = fuzzy_simplicial_set(&indices, &distances, 5);
        for (&(i, j), &w) in &graph.edges {
            assert_ne!(i, j);
            assert_eq!(graph.weight(j, i), w);
            assert!(w > 0.0 && w <= 1.0);
        }
    }

    #[test]
    fn test_shape_and_determinism() {
        let data = blobs(10);
        let a = Umap::new(opts(50)).fit_transform(data.view()).unwrap();
        let b = Umap::new(opts(50)).fit_transform(data.view()).unwrap();
        assert_eq!(a.dim(), (20, 2));
        assert_eq!(a, b);
        assert!(a.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_seed_changes_layout() {
        let data = blobs(10);
        let a = Umap::new(opts(20)).fit_transform(data.view()).unwrap();
        let b = Umap::new(UmapOptions { seed: 1, ..opts(20) }).fit_transform(data.view()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_degenerate_inputs() {
        let one = Array2::<f32>::ones((1, 4));
        assert_eq!(Umap::new(opts(10)).fit_transform(one.view()).unwrap(), Array2::zeros((1, 2)));
        let empty = Array2::<f32>::zeros((0, 4));
        assert!(Umap::new(opts(10)).fit_transform(empty.view()).is_err());
    }

    #[test]
    fn test_n_neighbors_clamped() {
        let data = blobs(2);
        let embedding = Umap::new(UmapOptions { n_neighbors: 50, ..opts(10) }).fit_transform(data.view()).unwrap();
        assert_eq!(embedding.dim(), (4, 2));
    }

    #[test]
    fn test_blobs_are_separated() {
        let data = blobs(15);
        let embedding = Umap::new(UmapOptions { n_neighbors: 10, ..opts(200) }).fit_transform(data.view()).unwrap();
        // 投影后每个点的最近邻应来自同一个簇
        let (indices, _) = batch_knn_euclidean(embedding.view(), embedding.view(), 2);
        let same = indices.iter().enumerate().filter(|(i, row)| row.iter().all(|j| j / 15 == i / 15)).count();
        assert!(same >= 27, "{} / 30", same);
    }
}
