use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Local};

use super::{TierCounts, mean, median, percent, sample_std};
use crate::mapper::MapperParams;
use crate::schema::{MetaRecord, NodePurity};

/// 生成论文用的汇总文本，所有数值都由输入计算得出
pub fn render(purity: &[NodePurity], meta: &[MetaRecord], params: &MapperParams, timestamp: DateTime<Local>) -> String {
    let mut out = String::new();
    // 写入 String 不会失败
    let _ = write_summary(&mut out, purity, meta, params, timestamp);
    out
}

fn write_summary(
    out: &mut String,
    purity: &[NodePurity],
    meta: &[MetaRecord],
    params: &MapperParams,
    timestamp: DateTime<Local>,
) -> std::fmt::Result {
    let rule = "=".repeat(80);
    let sub = "-".repeat(80);

    let mut per_subject: BTreeMap<&str, usize> = BTreeMap::new();
    for record in meta {
        *per_subject.entry(&record.subject).or_default() += 1;
    }
    let min_per_subject = per_subject.values().copied().min().unwrap_or(0);
    let max_per_subject = per_subject.values().copied().max().unwrap_or(0);

    let values: Vec<f64> = purity.iter().map(|p| p.purity).collect();
    let sizes: Vec<usize> = purity.iter().map(|p| p.size).collect();
    let n = values.len();
    let tiers = TierCounts::from_purity(&values);
    let avg = mean(&values);
    let (min, max) = if values.is_empty() {
        (0.0, 0.0)
    } else {
        (values.iter().copied().fold(f64::INFINITY, f64::min), values.iter().copied().fold(0.0, f64::max))
    };
    let mixed = n - tiers.perfect;
    let balanced = tiers.high_or_better() + tiers.medium;
    let review = tiers.low + tiers.very_low;

    writeln!(out, "{rule}")?;
    writeln!(out, "TOPOLOGICAL DATA ANALYSIS OF FINGERPRINTS FOR BIOMETRIC AUTHENTICATION")?;
    writeln!(out, "THESIS ANALYSIS REPORT")?;
    writeln!(out, "{rule}\n")?;
    writeln!(out, "Generated: {}\n", timestamp.format("%Y-%m-%d %H:%M:%S"))?;

    writeln!(out, "SECTION 1: METHODOLOGY\n{sub}\n")?;
    writeln!(out, "1. Image Preprocessing:")?;
    writeln!(out, "   - CLAHE (Contrast Limited Adaptive Histogram Equalization)")?;
    writeln!(out, "   - Normalization to [0, 1] range for consistent input\n")?;
    writeln!(out, "2. Feature Extraction:")?;
    writeln!(out, "   - ResNet-18 pre-trained on ImageNet")?;
    writeln!(out, "   - 512-dimensional feature vectors from the penultimate layer\n")?;
    writeln!(out, "3. Dimensionality Reduction:")?;
    writeln!(out, "   - UMAP (Uniform Manifold Approximation and Projection) to 2D\n")?;
    writeln!(out, "4. Topological Analysis:")?;
    writeln!(out, "   - Mapper with the UMAP projection as lens function")?;
    writeln!(out, "   - DBSCAN clustering within overlapping cubes ({} space)", params.cluster_space)?;
    writeln!(
        out,
        "   - Configuration: n_cubes={}, overlap={:.0}%, eps={}, min_samples={}\n",
        params.n_cubes,
        params.perc_overlap * 100.0,
        params.eps,
        params.min_samples
    )?;
    writeln!(out, "5. Security Metric:")?;
    writeln!(out, "   - Node Purity: proportion of the most common subject in each node\n")?;

    writeln!(out, "\nSECTION 2: EXPERIMENTAL RESULTS\n{sub}\n")?;
    writeln!(out, "A. Dataset Characteristics")?;
    writeln!(out, "   - Total fingerprint samples: {}", meta.len())?;
    writeln!(out, "   - Subjects: {} individuals", per_subject.len())?;
    if min_per_subject == max_per_subject {
        writeln!(out, "   - Samples per subject: {} (balanced dataset)\n", min_per_subject)?;
    } else {
        writeln!(out, "   - Samples per subject: {}-{}\n", min_per_subject, max_per_subject)?;
    }

    writeln!(out, "B. Topological Structure")?;
    writeln!(out, "   - Topological nodes created: {}", n)?;
    let avg_size = if n == 0 { 0.0 } else { sizes.iter().sum::<usize>() as f64 / n as f64 };
    writeln!(out, "   - Average samples per node: {:.2}", avg_size)?;
    writeln!(
        out,
        "   - Node size range: {}-{} samples\n",
        sizes.iter().copied().min().unwrap_or(0),
        sizes.iter().copied().max().unwrap_or(0)
    )?;

    writeln!(out, "C. Separation Quality (Node Purity Analysis)")?;
    for (label, count) in [
        ("Perfect Separation (purity = 1.0):", tiers.perfect),
        ("High Confidence (0.75 <= purity < 1.0):", tiers.high),
        ("Medium Confidence (0.5 <= purity < 0.75):", tiers.medium),
        ("Low Confidence (0.4 <= purity < 0.5):", tiers.low),
        ("Very Low Confidence (purity < 0.4):", tiers.very_low),
    ] {
        writeln!(out, "   {:<44}{:>3} nodes ({:.0}%)", label, count, percent(count, n))?;
    }
    writeln!(out)?;

    writeln!(out, "D. Quantitative Metrics")?;
    writeln!(out, "   - Average Purity: {:.1}%", avg * 100.0)?;
    writeln!(out, "   - Median Purity: {:.1}%", median(&values) * 100.0)?;
    writeln!(out, "   - Standard Deviation: {:.1}%", sample_std(&values) * 100.0)?;
    writeln!(out, "   - Purity Range: {:.1}% - {:.1}%\n", min * 100.0, max * 100.0)?;

    writeln!(out, "E. Contamination Analysis")?;
    writeln!(out, "   - Nodes with inter-subject mixing: {} ({:.0}%)", mixed, percent(mixed, n))?;
    writeln!(out, "   - Average contamination per node: {:.1}%", if n == 0 { 0.0 } else { (1.0 - avg) * 100.0 })?;
    writeln!(out, "   - Worst purity value: {:.1}%\n", min * 100.0)?;

    writeln!(out, "\nSECTION 3: SECURITY IMPLICATIONS\n{sub}\n")?;
    writeln!(out, "1. System Robustness")?;
    writeln!(out, "   + {:.0}% of topological regions achieve PERFECT subject separation", percent(tiers.perfect, n))?;
    writeln!(
        out,
        "   + {:.0}% of regions enable HIGH-CONFIDENCE authentication",
        percent(tiers.high_or_better(), n)
    )?;
    writeln!(out, "   + {:.0}% of regions support MEDIUM-CONFIDENCE identification", percent(tiers.medium, n))?;
    writeln!(out, "   - {:.0}% of regions require ADDITIONAL VERIFICATION\n", percent(review, n))?;

    writeln!(out, "2. Deployment Options")?;
    writeln!(out, "   OPTION 1 - High Security (>= 0.75 purity):")?;
    writeln!(
        out,
        "     - Available regions: {} nodes ({:.0}%)",
        tiers.high_or_better(),
        percent(tiers.high_or_better(), n)
    )?;
    writeln!(out, "     - Use: high-assurance access control\n")?;
    writeln!(out, "   OPTION 2 - Balanced (>= 0.5 purity):")?;
    writeln!(out, "     - Available regions: {} nodes ({:.0}%)", balanced, percent(balanced, n))?;
    writeln!(out, "     - Use: general access control\n")?;
    writeln!(out, "   Samples falling in nodes below 0.5 purity should be flagged for manual review.\n")?;

    writeln!(out, "\nSECTION 4: CONCLUSIONS\n{sub}\n")?;
    writeln!(
        out,
        "1. Topological Data Analysis captures fingerprint separability with {:.0}% average node purity.",
        avg * 100.0
    )?;
    writeln!(
        out,
        "2. {:.0}% of topological regions reach high-confidence purity (>= 0.75).",
        percent(tiers.high_or_better(), n)
    )?;
    writeln!(
        out,
        "3. {:.0}% of regions mix subjects and need additional verification or tighter clustering.",
        percent(mixed, n)
    )?;
    writeln!(
        out,
        "4. The dataset covers {} subjects; larger datasets are needed for statistical validity.\n",
        per_subject.len()
    )?;

    writeln!(out, "{rule}")?;
    writeln!(out, "END OF ANALYSIS REPORT")?;
    writeln!(out, "{rule}")?;
    Ok(())
}
