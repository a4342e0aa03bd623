//! 生成独立的交互式 HTML 页面
//!
//! 页面不依赖任何外部脚本，图结构以 JSON 形式嵌入，
//! 节点使用 `node_id` 键，边使用 `source`/`target` 键。

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::mapper::graph::MapperGraph;
use crate::schema::NodePurity;

pub const GENERATOR: &str = concat!("fingermapper ", env!("CARGO_PKG_VERSION"));

#[derive(Serialize)]
struct HtmlNode<'a> {
    node_id: &'a str,
    size: usize,
    dominant_subject: &'a str,
    purity: f64,
    members: &'a [usize],
}

#[derive(Serialize)]
struct HtmlLink<'a> {
    source: &'a str,
    target: &'a str,
}

#[derive(Serialize)]
struct HtmlGraph<'a> {
    nodes: Vec<HtmlNode<'a>>,
    links: Vec<HtmlLink<'a>>,
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

/// 渲染页面，purity 与 graph.nodes 按顺序一一对应
pub fn render(graph: &MapperGraph, purity: &[NodePurity], n_samples: usize) -> Result<String> {
    let nodes = graph
        .nodes
        .iter()
        .zip(purity)
        .map(|(node, p)| HtmlNode {
            node_id: &node.id,
            size: node.size(),
            dominant_subject: &p.dominant_subject,
            purity: p.purity,
            members: &node.members,
        })
        .collect();
    let links = graph.links.iter().map(|l| HtmlLink { source: &l.source, target: &l.target }).collect();
    // 避免 JSON 中的 `</` 提前结束 script 标签
    let data = serde_json::to_string(&HtmlGraph { nodes, links })?.replace("</", "<\\/");

    let params = &graph.params;
    let meta = format!(
        "<h3>Mapper parameters</h3>\n\
         <p>Samples: {}<br>Nodes: {}<br>Edges: {}<br>\
         Cover: n_cubes = {}, perc_overlap = {}<br>\
         Clusterer: DBSCAN(eps = {}, min_samples = {})<br>\
         Lens: UMAP 2D projection<br>Cluster space: {}</p>",
        n_samples,
        graph.nodes.len(),
        graph.links.len(),
        params.n_cubes,
        params.perc_overlap,
        params.eps,
        params.min_samples,
        escape_html(&params.cluster_space),
    );

    Ok(TEMPLATE
        .replace("__TITLE__", &escape_html(&params.title))
        .replace("__GENERATOR__", GENERATOR)
        .replace("__META__", &meta)
        .replace("__GRAPH__", &data))
}

pub fn save(path: &Path, graph: &MapperGraph, purity: &[NodePurity], n_samples: usize) -> Result<()> {
    let html = render(graph, purity, n_samples)?;
    fs::write(path, html).with_context(|| format!("无法写入 {}", path.display()))
}

const TEMPLATE: &str = r##"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="generator" content="__GENERATOR__">
<title>__TITLE__</title>
<style>
  body { margin: 0; font-family: sans-serif; background: #111; color: #ddd; overflow: hidden; }
  #canvas { position: absolute; left: 0; top: 0; }
  #side { position: absolute; left: 0; top: 0; width: 280px; padding: 12px; background: rgba(30,30,30,.9); font-size: 13px; }
  #side h1 { font-size: 16px; margin: 0 0 8px; }
  #side h3 { font-size: 14px; margin: 8px 0 4px; }
  #tooltip { position: absolute; pointer-events: none; display: none; padding: 6px 8px; background: #222; border: 1px solid #555; font-size: 12px; }
  #legend .bar { height: 12px; background: linear-gradient(to right, hsl(0,75%,50%), hsl(60,75%,50%), hsl(120,75%,45%)); }
  #legend .ticks { display: flex; justify-content: space-between; font-size: 11px; }
  #selection { max-height: 240px; overflow-y: auto; word-break: break-all; }
</style>
</head>
<body>
<canvas id="canvas"></canvas>
<div id="side">
  <h1>__TITLE__</h1>
  <div id="meta_content">
__META__
  </div>
  <div id="legend">
    <h3>Legend: node color = purity</h3>
    <div class="bar"></div>
    <div class="ticks"><span>0.0</span><span>0.5</span><span>1.0</span></div>
    <p>Node radius grows with the number of samples.</p>
  </div>
  <h3>Selected node</h3>
  <div id="selection">Click a node to inspect its members.</div>
  <p>Hover a node for details, drag to move it, scroll to zoom, drag the background to pan.</p>
</div>
<div id="tooltip"></div>
<script>
const graph = __GRAPH__;

const canvas = document.getElementById("canvas");
const ctx = canvas.getContext("2d");
const tooltip = document.getElementById("tooltip");
const selection = document.getElementById("selection");

const index = new Map(graph.nodes.map((d, i) => [d.node_id, i]));
const nodes = graph.nodes.map((d, i) => ({
  ...d,
  x: Math.cos(i * 2.399) * 40 * Math.sqrt(i + 1),
  y: Math.sin(i * 2.399) * 40 * Math.sqrt(i + 1),
  vx: 0, vy: 0,
  r: 4 + 3 * Math.sqrt(d.size),
}));
const edges = graph.links.map(l => [index.get(l.source), index.get(l.target)]);

let view = { x: 0, y: 0, k: 1 };
let hovered = null, selected = null, dragging = null, panning = null;

function color(purity) {
  return `hsl(${Math.round(120 * purity)}, 75%, 50%)`;
}

function resize() {
  canvas.width = window.innerWidth;
  canvas.height = window.innerHeight;
  view.x = canvas.width / 2 + 140;
  view.y = canvas.height / 2;
}

function tick(alpha) {
  for (let i = 0; i < nodes.length; i++) {
    for (let j = i + 1; j < nodes.length; j++) {
      const a = nodes[i], b = nodes[j];
      let dx = b.x - a.x, dy = b.y - a.y;
      const d2 = Math.max(dx * dx + dy * dy, 1);
      const f = 900 * alpha / d2;
      a.vx -= dx * f; a.vy -= dy * f;
      b.vx += dx * f; b.vy += dy * f;
    }
  }
  for (const [s, t] of edges) {
    const a = nodes[s], b = nodes[t];
    const dx = b.x - a.x, dy = b.y - a.y;
    const d = Math.max(Math.sqrt(dx * dx + dy * dy), 1);
    const f = (d - 60) * 0.05 * alpha / d;
    a.vx += dx * f; a.vy += dy * f;
    b.vx -= dx * f; b.vy -= dy * f;
  }
  for (const n of nodes) {
    n.vx -= n.x * 0.01 * alpha;
    n.vy -= n.y * 0.01 * alpha;
    if (n !== dragging) {
      n.x += n.vx; n.y += n.vy;
    }
    n.vx *= 0.6; n.vy *= 0.6;
  }
}

function draw() {
  ctx.setTransform(1, 0, 0, 1, 0, 0);
  ctx.clearRect(0, 0, canvas.width, canvas.height);
  ctx.setTransform(view.k, 0, 0, view.k, view.x, view.y);
  ctx.strokeStyle = "rgba(200,200,200,0.4)";
  ctx.lineWidth = 1 / view.k;
  for (const [s, t] of edges) {
    ctx.beginPath();
    ctx.moveTo(nodes[s].x, nodes[s].y);
    ctx.lineTo(nodes[t].x, nodes[t].y);
    ctx.stroke();
  }
  for (const n of nodes) {
    ctx.beginPath();
    ctx.arc(n.x, n.y, n.r, 0, 2 * Math.PI);
    ctx.fillStyle = color(n.purity);
    ctx.fill();
    if (n === hovered || n === selected) {
      ctx.lineWidth = 2 / view.k;
      ctx.strokeStyle = "#fff";
      ctx.stroke();
      ctx.strokeStyle = "rgba(200,200,200,0.4)";
      ctx.lineWidth = 1 / view.k;
    }
  }
}

function toWorld(ev) {
  return [(ev.clientX - view.x) / view.k, (ev.clientY - view.y) / view.k];
}

function pick(ev) {
  const [x, y] = toWorld(ev);
  for (let i = nodes.length - 1; i >= 0; i--) {
    const n = nodes[i];
    if ((n.x - x) ** 2 + (n.y - y) ** 2 <= n.r * n.r) return n;
  }
  return null;
}

canvas.addEventListener("mousemove", ev => {
  if (dragging) {
    [dragging.x, dragging.y] = toWorld(ev);
  } else if (panning) {
    view.x = panning.x + ev.clientX - panning.cx;
    view.y = panning.y + ev.clientY - panning.cy;
  }
  hovered = pick(ev);
  if (hovered) {
    tooltip.style.display = "block";
    tooltip.style.left = ev.clientX + 12 + "px";
    tooltip.style.top = ev.clientY + 12 + "px";
    tooltip.innerHTML = `<b>${hovered.node_id}</b><br>size: ${hovered.size}<br>` +
      `dominant: ${hovered.dominant_subject}<br>purity: ${hovered.purity.toFixed(3)}`;
  } else {
    tooltip.style.display = "none";
  }
});

canvas.addEventListener("mousedown", ev => {
  const n = pick(ev);
  if (n) dragging = n;
  else panning = { x: view.x, y: view.y, cx: ev.clientX, cy: ev.clientY };
});

window.addEventListener("mouseup", () => { dragging = null; panning = null; });

canvas.addEventListener("click", ev => {
  selected = pick(ev);
  selection.textContent = selected
    ? `${selected.node_id} (${selected.size} samples, purity ${selected.purity.toFixed(3)}): rows ${selected.members.join(", ")}`
    : "Click a node to inspect its members.";
});

canvas.addEventListener("wheel", ev => {
  ev.preventDefault();
  const factor = Math.exp(-ev.deltaY * 0.001);
  const [x, y] = toWorld(ev);
  view.k *= factor;
  view.x = ev.clientX - x * view.k;
  view.y = ev.clientY - y * view.k;
}, { passive: false });

window.addEventListener("resize", resize);
resize();

let alpha = 1;
function frame() {
  if (alpha > 0.01 || dragging) {
    tick(Math.max(alpha, 0.05));
    alpha *= 0.99;
  }
  draw();
  requestAnimationFrame(frame);
}
frame();
</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapperOptions;
    use crate::mapper::graph::{MapperNode, MapperParams};

    fn sample() -> (MapperGraph, Vec<NodePurity>) {
        let nodes = vec![
            MapperNode { id: "cube0_cluster0".into(), members: vec![0, 1] },
            MapperNode { id: "cube1_cluster0".into(), members: vec![1, 2] },
        ];
        let purity = nodes
            .iter()
            .map(|n| NodePurity { node: n.id.clone(), size: 2, dominant_subject: "subject001".into(), purity: 1.0 })
            .collect();
        let params = MapperParams { title: "Test <Mapper>".into(), ..MapperParams::from(&MapperOptions::default()) };
        (MapperGraph::new(params, nodes), purity)
    }

    #[test]
    fn test_render_contains_graph() {
        let (graph, purity) = sample();
        let html = render(&graph, &purity, 3).unwrap();
        assert!(html.contains("<title>Test &lt;Mapper&gt;</title>"));
        assert!(html.contains(r#""node_id":"cube0_cluster0""#));
        assert!(html.contains(r#""source":"cube0_cluster0","target":"cube1_cluster0""#));
        assert!(html.contains(r#"<div id="meta_content">"#));
        assert!(html.contains(GENERATOR));
        assert!(!html.contains("__GRAPH__"));
    }
}
