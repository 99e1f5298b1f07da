use crate::compiler::ExecutionPlan;

use super::{VizEdgeKind, VizNodeKind, build_graph};

pub fn render_mermaid(plan: &ExecutionPlan) -> String {
    let graph = build_graph(plan);
    let mut lines = vec!["flowchart TD".to_string()];

    for node in &graph.nodes {
        match &node.kind {
            VizNodeKind::VariableHeader { names } => {
                let label = escape_label(&format!("Variables: {}", names.join(", ")));
                lines.push(format!("  {}[\"{}\"]", node.id, label));
            }
            VizNodeKind::Step {
                step_id,
                title,
                tool,
                loop_label: _,
            } => {
                let tool = tool.as_deref().unwrap_or("none");
                let label = escape_label(&format!("{step_id}. {title}\\n[{tool}]"));
                lines.push(format!("  {}[\"{}\"]", node.id, label));
            }
            VizNodeKind::Decision {
                condition,
                depth: _,
            } => {
                let label = escape_label(&format!("{condition}?"));
                lines.push(format!("  {}{{\"{}\"}}", node.id, label));
            }
            VizNodeKind::Join { depth: _, label } => {
                if node.id == "ROOT" {
                    continue;
                }
                let title = label.as_deref().unwrap_or("join");
                let escaped = escape_label(title);
                lines.push(format!("  {}((\"{}\"))", node.id, escaped));
            }
        }
    }

    for edge in &graph.edges {
        if edge.from == "ROOT" || edge.to == "ROOT" {
            continue;
        }

        let edge_text = match edge.kind {
            VizEdgeKind::Normal => format!("  {} --> {}", edge.from, edge.to),
            VizEdgeKind::BranchYes => format!("  {} -->|Yes| {}", edge.from, edge.to),
            VizEdgeKind::BranchNo => format!("  {} -->|No| {}", edge.from, edge.to),
            VizEdgeKind::OnFail => {
                let label = edge
                    .label
                    .as_deref()
                    .map(escape_label)
                    .unwrap_or_else(|| "unknown".to_string());
                format!("  {} -->|on_fail: {}| {}", edge.from, label, edge.to)
            }
        };
        lines.push(edge_text);
    }

    lines.join("\n")
}

fn escape_label(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('|', "/")
}
