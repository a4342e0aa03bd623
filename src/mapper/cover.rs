use itertools::Itertools;
use ndarray::ArrayView2;

/// 均匀重叠的超立方体覆盖
#[derive(Debug, Clone)]
pub struct Cover {
    pub n_cubes: usize,
    pub perc_overlap: f32,
}

/// 一个超立方体，每个维度上为闭区间 [center - radius, center + radius]
#[derive(Debug, Clone, PartialEq)]
pub struct Hypercube {
    pub center: Vec<f32>,
    pub radius: Vec<f32>,
}

impl Hypercube {
    pub fn contains(&self, point: &[f32]) -> bool {
        point
            .iter()
            .zip(&self.center)
            .zip(&self.radius)
            .all(|((x, c), r)| *x >= c - r && *x <= c + r)
    }
}

fn linspace(start: f32, end: f32, n: usize) -> Vec<f32> {
    match n {
        0 => vec![],
        1 => vec![start],
        _ => (0..n).map(|i| start + (end - start) * i as f32 / (n - 1) as f32).collect(),
    }
}

impl Cover {
    pub fn new(n_cubes: usize, perc_overlap: f32) -> Self {
        Self { n_cubes, perc_overlap }
    }

    /// 根据数据范围生成所有超立方体，第 0 维变化最慢
    pub fn fit(&self, data: ArrayView2<f32>) -> Vec<Hypercube> {
        let n = self.n_cubes;
        if n == 0 || data.nrows() == 0 {
            return vec![];
        }
        let mut centers = vec![];
        let mut radius = vec![];
        for col in data.columns() {
            let min = col.iter().copied().fold(f32::INFINITY, f32::min);
            let max = col.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let range = max - min;
            let inset = range / (2 * n) as f32;
            centers.push(linspace(min + inset, max - inset, n));
            radius.push(range / (2 * n) as f32 / (1.0 - self.perc_overlap));
        }
        centers
            .into_iter()
            .multi_cartesian_product()
            .map(|center| Hypercube { center, radius: radius.clone() })
            .collect()
    }

    /// 返回每个非空超立方体包含的行号，行号升序
    pub fn fit_transform(&self, data: ArrayView2<f32>) -> Vec<Vec<usize>> {
        let rows: Vec<Vec<f32>> = data.rows().into_iter().map(|r| r.to_vec()).collect();
        self.fit(data)
            .iter()
            .map(|cube| rows.iter().enumerate().filter(|(_, p)| cube.contains(p)).map(|(i, _)| i).collect_vec())
            .filter(|members| !members.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_centers_and_radius() {
        let data = array![[0.0f32], [10.0]];
        let cubes = Cover::new(5, 0.0).fit(data.view());
        let centers: Vec<f32> = cubes.iter().map(|c| c.center[0]).collect();
        assert_eq!(centers, [1.0, 3.0, 5.0, 7.0, 9.0]);
        assert!(cubes.iter().all(|c| c.radius[0] == 1.0));
    }

    #[test]
    fn test_axis_zero_outer() {
        let data = array![[0.0f32, 0.0], [1.0, 1.0]];
        let cubes = Cover::new(2, 0.5).fit(data.view());
        let centers: Vec<Vec<f32>> = cubes.into_iter().map(|c| c.center).collect();
        assert_eq!(centers, vec![vec![0.25, 0.25], vec![0.25, 0.75], vec![0.75, 0.25], vec![0.75, 0.75]]);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        // 重叠为 0 时，相邻区间在 5.0 处相接
        let data = array![[0.0f32], [5.0], [10.0]];
        let members = Cover::new(2, 0.0).fit_transform(data.view());
        assert_eq!(members, vec![vec![0, 1], vec![1, 2]]);
    }

    #[test]
    fn test_empty_cubes_dropped() {
        let data = array![[0.0f32], [0.1], [10.0]];
        let members = Cover::new(5, 0.1).fit_transform(data.view());
        assert_eq!(members, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_constant_data() {
        let data = array![[3.0f32], [3.0]];
        let members = Cover::new(3, 0.3).fit_transform(data.view());
        assert_eq!(members, vec![vec![0, 1]; 3]);
    }
}
