use anyhow::{Result, bail};

use crate::mapper::graph::{MapperGraph, MapperNode};
use crate::schema::{MetaRecord, NodePurity};

/// 计算节点中占比最高的受试者及其占比
///
/// 数量相同时取成员列表中最先出现的受试者。
pub fn node_purity(node: &MapperNode, meta: &[MetaRecord]) -> Result<NodePurity> {
    if node.members.is_empty() {
        bail!("节点 {} 没有成员", node.id);
    }
    // 按首次出现的顺序计数
    let mut counts: Vec<(&str, usize)> = vec![];
    for &row in &node.members {
        let Some(record) = meta.get(row) else {
            bail!("节点 {} 的成员 {} 超出了元数据的范围（共 {} 行）", node.id, row, meta.len());
        };
        match counts.iter_mut().find(|entry| entry.0 == record.subject) {
            Some((_, c)) => *c += 1,
            None => counts.push((record.subject.as_str(), 1)),
        }
    }

    let mut dominant = counts[0];
    for &(subject, count) in &counts[1..] {
        if count > dominant.1 {
            dominant = (subject, count);
        }
    }

    Ok(NodePurity {
        node: node.id.clone(),
        size: node.size(),
        dominant_subject: dominant.0.to_owned(),
        purity: dominant.1 as f64 / node.size() as f64,
    })
}

pub fn graph_purity(graph: &MapperGraph, meta: &[MetaRecord]) -> Result<Vec<NodePurity>> {
    graph.nodes.iter().map(|node| node_purity(node, meta)).collect()
}
