//! 分析报告
//!
//! 所有报告都只读取前面阶段的产物，聚合后写入结果目录。

pub mod analysis;
pub mod html;
pub mod thesis;

use serde::{Deserialize, Serialize};

/// 按纯度划分的置信度等级，每个节点只属于其中一个
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// purity = 1.0
    Perfect,
    /// 0.75 ≤ purity < 1.0
    High,
    /// 0.5 ≤ purity < 0.75
    Medium,
    /// 0.4 ≤ purity < 0.5
    Low,
    /// purity < 0.4
    VeryLow,
}

impl Tier {
    pub fn of(purity: f64) -> Self {
        if purity >= 1.0 {
            Self::Perfect
        } else if purity >= 0.75 {
            Self::High
        } else if purity >= 0.5 {
            Self::Medium
        } else if purity >= 0.4 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub perfect: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub very_low: usize,
}

impl TierCounts {
    pub fn from_purity(purity: &[f64]) -> Self {
        let mut counts = Self::default();
        for &p in purity {
            match Tier::of(p) {
                Tier::Perfect => counts.perfect += 1,
                Tier::High => counts.high += 1,
                Tier::Medium => counts.medium += 1,
                Tier::Low => counts.low += 1,
                Tier::VeryLow => counts.very_low += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.perfect + self.high + self.medium + self.low + self.very_low
    }

    /// purity ≥ 0.75 的节点，包括完全纯净的节点
    pub fn high_or_better(&self) -> usize {
        self.perfect + self.high
    }
}

/// 纯度不低于阈值的节点数量
pub fn count_at_least(purity: &[f64], threshold: f64) -> usize {
    purity.iter().filter(|&&p| p >= threshold).count()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 { (sorted[mid - 1] + sorted[mid]) / 2.0 } else { sorted[mid] }
}

/// 样本标准差（除以 n - 1），少于两个值时为 0
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// 百分比，分母为 0 时为 0
pub fn percent(part: usize, total: usize) -> f64 {
    if total == 0 { 0.0 } else { part as f64 * 100.0 / total as f64 }
}
