use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::{TierCounts, count_at_least, mean, median, percent, sample_std};
use crate::mapper::{MapperGraph, MapperParams};
use crate::schema::{MetaRecord, NodePurity, SCHEMA_VERSION, Schema};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSection {
    pub total_samples: usize,
    pub total_subjects: usize,
    pub samples_per_subject_min: usize,
    pub samples_per_subject_max: usize,
    pub samples_per_subject_mean: f64,
    /// 没有在任何节点中占多数的受试者
    pub under_represented_subjects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySection {
    pub total_nodes: usize,
    pub total_edges: usize,
    /// 各节点大小之和，同一样本可能被计入多次
    pub total_samples_in_nodes: usize,
    /// 至少属于一个节点的样本数量
    pub covered_samples: usize,
    pub avg_node_size: f64,
    pub node_size_range: [usize; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurityMetrics {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub perfect_separation_count: usize,
    pub high_confidence_count: usize,
    pub medium_confidence_count: usize,
    pub low_confidence_count: usize,
    pub very_low_confidence_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecuritySection {
    pub contamination_rate_percent: f64,
    pub nodes_available_at_07_threshold: usize,
    pub nodes_available_at_08_threshold: usize,
    pub nodes_available_at_09_threshold: usize,
}

/// mapper_analysis_report.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperReport {
    pub schema_version: u32,
    pub timestamp: String,
    pub dataset: DatasetSection,
    pub topology: TopologySection,
    pub purity_metrics: PurityMetrics,
    pub security: SecuritySection,
    pub configuration: MapperParams,
}

/// subject_analysis.csv 的一行，按占多数的受试者汇总节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub subject: String,
    pub nodes: usize,
    pub samples: usize,
    pub avg_purity: f64,
    pub max_purity: f64,
    pub perfect_nodes: usize,
}

impl Schema for SubjectSummary {
    const HEADER: &'static [&'static str] =
        &["subject", "nodes", "samples", "avg_purity", "max_purity", "perfect_nodes"];
}

pub fn subject_summaries(purity: &[NodePurity]) -> Vec<SubjectSummary> {
    let mut groups: BTreeMap<&str, Vec<&NodePurity>> = BTreeMap::new();
    for node in purity {
        groups.entry(&node.dominant_subject).or_default().push(node);
    }
    groups
        .into_iter()
        .map(|(subject, nodes)| {
            let values: Vec<f64> = nodes.iter().map(|n| n.purity).collect();
            SubjectSummary {
                subject: subject.to_owned(),
                nodes: nodes.len(),
                samples: nodes.iter().map(|n| n.size).sum(),
                avg_purity: mean(&values),
                max_purity: values.iter().copied().fold(0.0, f64::max),
                perfect_nodes: values.iter().filter(|&&p| p >= 1.0).count(),
            }
        })
        .collect()
}

/// 纯度最低的 n 个节点，纯度相同时保持原顺序
pub fn worst_nodes(purity: &[NodePurity], n: usize) -> Vec<&NodePurity> {
    let mut nodes: Vec<&NodePurity> = purity.iter().collect();
    nodes.sort_by(|a, b| a.purity.total_cmp(&b.purity));
    nodes.truncate(n);
    nodes
}

impl MapperReport {
    pub fn build(purity: &[NodePurity], meta: &[MetaRecord], graph: &MapperGraph, timestamp: DateTime<Local>) -> Self {
        let mut per_subject: BTreeMap<&str, usize> = BTreeMap::new();
        for record in meta {
            *per_subject.entry(&record.subject).or_default() += 1;
        }
        let counts: Vec<usize> = per_subject.values().copied().collect();
        let dominant: BTreeSet<&str> = purity.iter().map(|p| p.dominant_subject.as_str()).collect();
        let under_represented =
            per_subject.keys().filter(|s| !dominant.contains(*s)).map(|s| s.to_string()).collect();

        let dataset = DatasetSection {
            total_samples: meta.len(),
            total_subjects: per_subject.len(),
            samples_per_subject_min: counts.iter().copied().min().unwrap_or(0),
            samples_per_subject_max: counts.iter().copied().max().unwrap_or(0),
            samples_per_subject_mean: if counts.is_empty() { 0.0 } else { meta.len() as f64 / counts.len() as f64 },
            under_represented_subjects: under_represented,
        };

        let sizes: Vec<usize> = purity.iter().map(|p| p.size).collect();
        let total_size: usize = sizes.iter().sum();
        let topology = TopologySection {
            total_nodes: purity.len(),
            total_edges: graph.links.len(),
            total_samples_in_nodes: total_size,
            covered_samples: graph.covered_samples(),
            avg_node_size: if sizes.is_empty() { 0.0 } else { total_size as f64 / sizes.len() as f64 },
            node_size_range: [sizes.iter().copied().min().unwrap_or(0), sizes.iter().copied().max().unwrap_or(0)],
        };

        let values: Vec<f64> = purity.iter().map(|p| p.purity).collect();
        let tiers = TierCounts::from_purity(&values);
        let (min, max) = if values.is_empty() {
            (0.0, 0.0)
        } else {
            (values.iter().copied().fold(f64::INFINITY, f64::min), values.iter().copied().fold(0.0, f64::max))
        };
        let purity_metrics = PurityMetrics {
            mean: mean(&values),
            median: median(&values),
            std: sample_std(&values),
            min,
            max,
            perfect_separation_count: tiers.perfect,
            high_confidence_count: tiers.high,
            medium_confidence_count: tiers.medium,
            low_confidence_count: tiers.low,
            very_low_confidence_count: tiers.very_low,
        };

        let mixed = values.len() - tiers.perfect;
        let security = SecuritySection {
            contamination_rate_percent: percent(mixed, values.len()),
            nodes_available_at_07_threshold: count_at_least(&values, 0.7),
            nodes_available_at_08_threshold: count_at_least(&values, 0.8),
            nodes_available_at_09_threshold: count_at_least(&values, 0.9),
        };

        Self {
            schema_version: SCHEMA_VERSION,
            timestamp: timestamp.to_rfc3339(),
            dataset,
            topology,
            purity_metrics,
            security,
            configuration: graph.params.clone(),
        }
    }

    pub fn tiers(&self) -> TierCounts {
        let m = &self.purity_metrics;
        TierCounts {
            perfect: m.perfect_separation_count,
            high: m.high_confidence_count,
            medium: m.medium_confidence_count,
            low: m.low_confidence_count,
            very_low: m.very_low_confidence_count,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("无法创建 {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// 分节的文本报告
    pub fn render(&self, purity: &[NodePurity]) -> String {
        let mut out = String::new();
        // 写入 String 不会失败
        let _ = self.write_text(&mut out, purity);
        out
    }

    fn write_text(&self, out: &mut String, purity: &[NodePurity]) -> std::fmt::Result {
        let rule = "=".repeat(70);
        let sub = "-".repeat(70);
        let d = &self.dataset;
        let t = &self.topology;
        let m = &self.purity_metrics;
        let s = &self.security;
        let tiers = self.tiers();
        let n = t.total_nodes;

        writeln!(out, "{rule}")?;
        writeln!(out, "TOPOLOGICAL DATA ANALYSIS: FINGERPRINT MAPPER REPORT")?;
        writeln!(out, "{rule}")?;
        writeln!(out, "Generated: {}\n", self.timestamp)?;

        writeln!(out, "1. DATASET OVERVIEW\n{sub}")?;
        writeln!(out, "Total fingerprint samples: {}", d.total_samples)?;
        writeln!(out, "Total unique subjects: {}", d.total_subjects)?;
        writeln!(out, "Samples per subject: {}-{}", d.samples_per_subject_min, d.samples_per_subject_max)?;
        writeln!(out, "Average samples/subject: {:.1}\n", d.samples_per_subject_mean)?;

        writeln!(out, "2. TOPOLOGICAL MAPPER STRUCTURE\n{sub}")?;
        if n == 0 {
            writeln!(out, "WARNING: the Mapper graph has no nodes; try a larger eps or fewer cubes.\n")?;
        }
        writeln!(out, "Total topological nodes: {}", n)?;
        writeln!(out, "Total edges: {}", t.total_edges)?;
        writeln!(out, "Total samples covered: {} ({} distinct)", t.total_samples_in_nodes, t.covered_samples)?;
        writeln!(out, "Average node size: {:.2} samples", t.avg_node_size)?;
        writeln!(out, "Node size range: {}-{}\n", t.node_size_range[0], t.node_size_range[1])?;

        writeln!(out, "3. NODE PURITY ANALYSIS (SECURITY METRICS)\n{sub}")?;
        writeln!(out, "Average purity (separability): {:.2}%", m.mean * 100.0)?;
        writeln!(out, "Median purity: {:.2}%", m.median * 100.0)?;
        writeln!(out, "Purity standard deviation: {:.2}%", m.std * 100.0)?;
        writeln!(out, "Purity range: {:.2}% - {:.2}%\n", m.min * 100.0, m.max * 100.0)?;

        writeln!(out, "4. SEPARATION QUALITY TIERS\n{sub}")?;
        for (label, count) in [
            ("Perfect separation (purity = 1.0):", tiers.perfect),
            ("High confidence (0.75 <= purity < 1.0):", tiers.high),
            ("Medium confidence (0.5 <= purity < 0.75):", tiers.medium),
            ("Low confidence (0.4 <= purity < 0.5):", tiers.low),
            ("Very low confidence (purity < 0.4):", tiers.very_low),
        ] {
            writeln!(out, "{:<44}{:>4} nodes ({:5.1}%)", label, count, percent(count, n))?;
        }
        writeln!(out)?;

        writeln!(out, "5. PER-SUBJECT TOPOLOGICAL ANALYSIS\n{sub}")?;
        for summary in subject_summaries(purity) {
            writeln!(
                out,
                "{:<15} | Nodes: {:>2} | Samples: {:>3} | Avg Purity: {:.2}% | Perfect: {}",
                summary.subject,
                summary.nodes,
                summary.samples,
                summary.avg_purity * 100.0,
                summary.perfect_nodes
            )?;
        }
        if !d.under_represented_subjects.is_empty() {
            writeln!(out, "Under-represented subjects (dominant in no node): {}", d.under_represented_subjects.join(", "))?;
        }
        writeln!(out)?;

        writeln!(out, "6. CONFUSION ANALYSIS (Inter-Subject Contamination)\n{sub}")?;
        let mixed: Vec<&NodePurity> = purity.iter().filter(|p| p.purity < 1.0).collect();
        writeln!(out, "Nodes with subject contamination: {} ({:.1}%)", mixed.len(), s.contamination_rate_percent)?;
        writeln!(out, "Average contamination per node: {:.1}%", if n == 0 { 0.0 } else { (1.0 - m.mean) * 100.0 })?;
        writeln!(out, "Max samples in mixed node: {}", mixed.iter().map(|p| p.size).max().unwrap_or(0))?;
        writeln!(out, "Top 5 most contaminated nodes (lowest purity):")?;
        for node in worst_nodes(purity, 5) {
            writeln!(
                out,
                "  {:<20} | Size: {} | Purity: {:.2}% | Dominant: {}",
                node.node,
                node.size,
                node.purity * 100.0,
                node.dominant_subject
            )?;
        }
        writeln!(out)?;

        writeln!(out, "7. SECURITY ASSESSMENT FOR BIOMETRIC SYSTEM\n{sub}")?;
        let high = percent(tiers.high_or_better(), n);
        let medium = percent(tiers.medium, n);
        let low = percent(tiers.low + tiers.very_low, n);
        writeln!(out, "High security nodes (purity >= 0.75): {:.1}% - Use for authentication", high)?;
        writeln!(out, "Medium security nodes (0.5-0.75):     {:.1}% - Use with caution", medium)?;
        writeln!(out, "Low security nodes (< 0.5):           {:.1}% - Flag for manual review", low)?;
        for (threshold, count) in [
            ("0.7", s.nodes_available_at_07_threshold),
            ("0.8", s.nodes_available_at_08_threshold),
            ("0.9", s.nodes_available_at_09_threshold),
        ] {
            writeln!(out, "At threshold purity >= {}: {} nodes ({:.1}%) available", threshold, count, percent(count, n))?;
        }
        writeln!(out)?;

        let c = &self.configuration;
        writeln!(out, "8. MAPPER CONFIGURATION\n{sub}")?;
        writeln!(out, "  n_cubes: {} (cover granularity)", c.n_cubes)?;
        writeln!(out, "  perc_overlap: {} ({:.0}% overlap between cubes)", c.perc_overlap, c.perc_overlap * 100.0)?;
        writeln!(out, "  DBSCAN eps: {} (clustering distance threshold)", c.eps)?;
        writeln!(out, "  DBSCAN min_samples: {} (minimum cluster size)", c.min_samples)?;
        writeln!(out, "  Cluster space: {}\n", c.cluster_space)?;

        writeln!(out, "9. SUMMARY & CONCLUSIONS\n{sub}")?;
        writeln!(out, "+ System achieves {:.0}% average topological separability", m.mean * 100.0)?;
        writeln!(
            out,
            "+ {} nodes ({:.0}%) achieve perfect subject separation",
            tiers.perfect,
            percent(tiers.perfect, n)
        )?;
        writeln!(
            out,
            "+ {} nodes ({:.0}%) are suitable for high-confidence authentication",
            tiers.high_or_better(),
            high
        )?;
        writeln!(
            out,
            "! {} nodes ({:.0}%) show poor separation (purity < 0.4)",
            tiers.very_low,
            percent(tiers.very_low, n)
        )?;
        writeln!(out, "! {:.0}% of topological space contains inter-subject mixing", s.contamination_rate_percent)?;
        writeln!(out, "! Dataset size ({} subjects) limits real-world generalization", d.total_subjects)?;
        writeln!(out, "{rule}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::config::MapperOptions;
    use crate::mapper::MapperNode;

    fn purity(node: &str, size: usize, subject: &str, purity: f64) -> NodePurity {
        NodePurity { node: node.into(), size, dominant_subject: subject.into(), purity }
    }

    fn meta() -> Vec<MetaRecord> {
        ["s1", "s1", "s2", "s2", "s3"]
            .iter()
            .map(|s| MetaRecord { subject: s.to_string(), filename: "img_001.png".into() })
            .collect()
    }

    fn graph() -> MapperGraph {
        let nodes = vec![
            MapperNode { id: "cube0_cluster0".into(), members: vec![0, 1] },
            MapperNode { id: "cube1_cluster0".into(), members: vec![1, 2, 3] },
        ];
        MapperGraph::new(MapperParams::from(&MapperOptions::default()), nodes)
    }

    fn timestamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_build_report() {
        let nodes = vec![purity("cube0_cluster0", 2, "s1", 1.0), purity("cube1_cluster0", 3, "s2", 2.0 / 3.0)];
        let report = MapperReport::build(&nodes, &meta(), &graph(), timestamp());
        assert_eq!(report.dataset.total_samples, 5);
        assert_eq!(report.dataset.total_subjects, 3);
        assert_eq!(report.dataset.under_represented_subjects, ["s3"]);
        assert_eq!(report.topology.total_edges, 1);
        assert_eq!(report.topology.covered_samples, 4);
        assert_eq!(report.topology.node_size_range, [2, 3]);
        assert_eq!(report.purity_metrics.perfect_separation_count, 1);
        assert_eq!(report.purity_metrics.medium_confidence_count, 1);
        assert_eq!(report.security.contamination_rate_percent, 50.0);
        assert_eq!(report.tiers().total(), 2);
        let text = report.render(&nodes);
        assert!(text.contains("Under-represented subjects (dominant in no node): s3"));
    }

    #[test]
    fn test_empty_graph_is_reported() {
        let empty = MapperGraph::new(MapperParams::from(&MapperOptions::default()), vec![]);
        let report = MapperReport::build(&[], &meta(), &empty, timestamp());
        assert_eq!(report.topology.total_nodes, 0);
        assert_eq!(report.purity_metrics.std, 0.0);
        assert_eq!(report.security.contamination_rate_percent, 0.0);
        assert!(report.render(&[]).contains("WARNING"));
    }

    #[test]
    fn test_subject_summaries() {
        let nodes = vec![
            purity("a", 3, "s2", 1.0),
            purity("b", 4, "s1", 0.5),
            purity("c", 2, "s2", 0.5),
        ];
        let summaries = subject_summaries(&nodes);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].subject, "s1");
        assert_eq!(summaries[1], SubjectSummary {
            subject: "s2".into(),
            nodes: 2,
            samples: 5,
            avg_purity: 0.75,
            max_purity: 1.0,
            perfect_nodes: 1,
        });
    }

    #[test]
    fn test_worst_nodes_stable() {
        let nodes = vec![purity("a", 3, "s1", 0.5), purity("b", 3, "s1", 0.3), purity("c", 3, "s1", 0.5)];
        let worst: Vec<_> = worst_nodes(&nodes, 2).iter().map(|n| n.node.as_str()).collect();
        assert_eq!(worst, ["b", "a"]);
    }
}
