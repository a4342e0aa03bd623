use ndarray::{ArrayView1, ArrayView2};

#[inline(always)]
pub fn squared_euclidean(va: ArrayView1<f32>, vb: ArrayView1<f32>) -> f32 {
    va.iter().zip(vb.iter()).map(|(a, b)| (a - b) * (a - b)).sum()
}

/// 计算向量 va 到 data 中每一行的欧氏距离，并返回距离最小的 k 个索引和距离
///
/// 结果按距离升序排列，距离相同时索引较小的在前。
/// va 本身若在 data 中，也会出现在结果里。
pub fn knn_euclidean(va: ArrayView1<f32>, data: ArrayView2<f32>, k: usize) -> (Vec<usize>, Vec<f32>) {
    let k = k.min(data.nrows());
    let mut dis = vec![f32::INFINITY; k];
    let mut idx = vec![usize::MAX; k];
    if k == 0 {
        return (idx, dis);
    }
    for (i, row) in data.rows().into_iter().enumerate() {
        let d = squared_euclidean(va, row);
        if d >= dis[k - 1] {
            continue;
        }
        // 维护长度为 k 的单调递增数组，从后往前寻找插入点
        let mut j = k - 1;
        while j > 0 && d < dis[j - 1] {
            dis[j] = dis[j - 1];
            idx[j] = idx[j - 1];
            j -= 1;
        }
        dis[j] = d;
        idx[j] = i;
    }
    dis.iter_mut().for_each(|d| *d = d.sqrt());
    (idx, dis)
}

/// 对 queries 中的每一行调用 knn_euclidean
///
/// 返回 (索引, 距离)，均为 queries.nrows() 行，每行 min(k, data.nrows()) 个
pub fn batch_knn_euclidean(
    queries: ArrayView2<f32>,
    data: ArrayView2<f32>,
    k: usize,
) -> (Vec<Vec<usize>>, Vec<Vec<f32>>) {
    queries.rows().into_iter().map(|q| knn_euclidean(q, data, k)).unzip()
}

/// 返回 data 中与第 i 行距离不超过 eps 的所有行（包括自身），按索引升序
pub fn radius_neighbors(data: ArrayView2<f32>, i: usize, eps: f32) -> Vec<usize> {
    let eps2 = eps * eps;
    let va = data.row(i);
    data.rows()
        .into_iter()
        .enumerate()
        .filter(|(_, row)| squared_euclidean(va, *row) <= eps2)
        .map(|(j, _)| j)
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_squared_euclidean() {
        let a = array![0.0f32, 0.0];
        let b = array![3.0f32, 4.0];
        assert_eq!(squared_euclidean(a.view(), b.view()), 25.0);
    }

    #[test]
    fn test_knn_includes_self_and_sorted() {
        let data = array![[0.0f32], [5.0], [1.0], [2.0], [1.0]];
        let (idx, dis) = knn_euclidean(data.row(0), data.view(), 4);
        assert_eq!(idx, [0, 2, 4, 3]);
        assert_eq!(dis, [0.0, 1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_knn_k_clamped() {
        let data = array![[0.0f32], [1.0]];
        let (idx, dis) = knn_euclidean(data.row(1), data.view(), 10);
        assert_eq!(idx, [1, 0]);
        assert_eq!(dis.len(), 2);
    }

    #[test]
    fn test_batch_knn() {
        let data = array![[0.0f32, 0.0], [0.0, 1.0], [10.0, 10.0]];
        let (idx, _) = batch_knn_euclidean(data.view(), data.view(), 2);
        assert_eq!(idx, vec![vec![0, 1], vec![1, 0], vec![2, 1]]);
    }

    #[test]
    fn test_radius_neighbors_inclusive() {
        let data = array![[0.0f32], [0.5], [1.0], [3.0]];
        assert_eq!(radius_neighbors(data.view(), 0, 0.5), [0, 1]);
        assert_eq!(radius_neighbors(data.view(), 3, 0.5), [3]);
    }
}
