//! SVG cladograms for the original (rerooted) and the collapsed trees.
//!
//! Labels are written as leaf names, i.e. sample hashes; `hasher::decode_file`
//! turns them into original identifiers afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as FmtWrite;

use crate::hasher::xml_escape;
use crate::tree::{NodeId, Tree};

const ROW_HEIGHT: f64 = 18.0;
const TREE_WIDTH: f64 = 600.0;
const MARGIN: f64 = 20.0;
const LABEL_ROOM: f64 = 420.0;
const BLOCK_WIDTH: f64 = 24.0;

/// A collapsed clade drawn as a single wedge.
#[derive(Debug, Clone)]
pub struct Block {
    pub label: String,
    pub placeholder: bool,
    pub flat: bool,
    /// Leaf names listed after the label (queries, usually)
    pub members: Vec<String>,
    pub size: usize,
}

impl Block {
    fn color(&self) -> &'static str {
        if self.flat {
            "#8e44ad"
        } else if self.placeholder {
            "#c0392b"
        } else {
            "#2c3e50"
        }
    }
}

/// Draws `tree`. Nodes in `blocks` are drawn as wedges with their subtree
/// hidden; leaves named in `highlight` are set in bold.
pub fn render_svg(
    tree: &Tree,
    blocks: &BTreeMap<NodeId, Block>,
    highlight: &BTreeSet<String>,
) -> String {
    // Visible nodes: everything except what hides under a block
    let mut visible = Vec::new();
    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        visible.push(id);
        if blocks.contains_key(&id) {
            continue;
        }
        for &child in tree.children(id).iter().rev() {
            stack.push(child);
        }
    }
    let is_terminal = |id: NodeId| tree.is_leaf(id) || blocks.contains_key(&id);

    // Horizontal position from branch lengths, or edge counts when lengths are absent
    let depths = tree.depths();
    let max_depth = visible.iter().map(|id| depths[id.0]).fold(0.0, f64::max);
    let mut x = vec![0.0; tree.capacity()];
    if max_depth > 0.0 {
        for &id in &visible {
            x[id.0] = MARGIN + depths[id.0] / max_depth * TREE_WIDTH;
        }
    } else {
        let mut levels = vec![0usize; tree.capacity()];
        for &id in &visible {
            if let Some(p) = tree.parent(id) {
                levels[id.0] = levels[p.0] + 1;
            }
        }
        let max_level = visible.iter().map(|id| levels[id.0]).max().unwrap_or(0).max(1);
        for &id in &visible {
            x[id.0] = MARGIN + levels[id.0] as f64 / max_level as f64 * TREE_WIDTH;
        }
    }

    let mut y = vec![0.0; tree.capacity()];
    let mut row = 0usize;
    for &id in &visible {
        if is_terminal(id) {
            row += 1;
            y[id.0] = MARGIN + row as f64 * ROW_HEIGHT;
        }
    }
    for &id in visible.iter().rev() {
        if !is_terminal(id) {
            let children = tree.children(id);
            if let (Some(first), Some(last)) = (children.first(), children.last()) {
                y[id.0] = (y[first.0] + y[last.0]) / 2.0;
            }
        }
    }

    let width = MARGIN * 2.0 + TREE_WIDTH + BLOCK_WIDTH + LABEL_ROOM;
    let height = MARGIN * 2.0 + (row + 1) as f64 * ROW_HEIGHT;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{:.0}" height="{:.0}" font-family="sans-serif" font-size="12">"#,
        width, height
    );

    for &id in &visible {
        if let Some(p) = tree.parent(id) {
            let _ = writeln!(
                svg,
                r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="black"/>"#,
                x[p.0], y[id.0], x[id.0], y[id.0]
            );
        }
        if !is_terminal(id) {
            let children = tree.children(id);
            if let (Some(first), Some(last)) = (children.first(), children.last()) {
                let _ = writeln!(
                    svg,
                    r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="black"/>"#,
                    x[id.0], y[first.0], x[id.0], y[last.0]
                );
            }
            if let Some(support) = tree.node(id).support {
                let _ = writeln!(
                    svg,
                    r##"<text x="{:.1}" y="{:.1}" font-size="9" fill="#7f8c8d">{}</text>"##,
                    x[id.0] + 2.0,
                    y[id.0] - 3.0,
                    support
                );
            }
            continue;
        }

        if let Some(block) = blocks.get(&id) {
            let (bx, by) = (x[id.0], y[id.0]);
            let _ = writeln!(
                svg,
                r#"<polygon points="{:.1},{:.1} {:.1},{:.1} {:.1},{:.1}" fill="{}" opacity="0.6"/>"#,
                bx,
                by,
                bx + BLOCK_WIDTH,
                by - ROW_HEIGHT / 3.0,
                bx + BLOCK_WIDTH,
                by + ROW_HEIGHT / 3.0,
                block.color()
            );
            let mut text = format!("{} ({})", xml_escape(&block.label), block.size);
            if !block.members.is_empty() {
                let _ = write!(text, ": {}", block.members.join(", "));
            }
            let style = if block.flat { r#" font-style="italic""# } else { "" };
            let _ = writeln!(
                svg,
                r#"<text x="{:.1}" y="{:.1}" fill="{}"{}>{}</text>"#,
                bx + BLOCK_WIDTH + 4.0,
                by + 4.0,
                block.color(),
                style,
                text
            );
        } else {
            let name = tree.name(id).unwrap_or_default();
            let weight = if highlight.contains(name) { r#" font-weight="bold""# } else { "" };
            let _ = writeln!(
                svg,
                r#"<text x="{:.1}" y="{:.1}"{}>{}</text>"#,
                x[id.0] + 4.0,
                y[id.0] + 4.0,
                weight,
                xml_escape(name)
            );
        }
    }

    svg.push_str("</svg>\n");
    svg
}
