use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use agentflow_core::error::GraphError;

use super::model::{EdgeKind, FlowGraph};
use super::properties::{NodeSpec, ParseError, ToolProviderRef};

/// Outgoing routing edge: when the node's action equals `label`, go to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Successor {
    pub label: String,
    pub target: String,
}

/// A runtime node. Immutable once the graph is built.
#[derive(Debug, Clone)]
pub struct ExecNode {
    pub id: String,
    pub label: String,
    pub spec: NodeSpec,
    /// In authored edge order.
    pub successors: Vec<Successor>,
}

impl ExecNode {
    /// Display name for logs and debug records.
    pub fn name(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }

    pub fn successor(&self, label: &str) -> Option<&Successor> {
        self.successors.iter().find(|s| s.label == label)
    }
}

/// Arena of runtime nodes addressed by id.
#[derive(Debug, Clone)]
pub struct ExecutableGraph {
    pub flow_id: String,
    pub name: String,
    nodes: Vec<ExecNode>,
    index: HashMap<String, usize>,
    start: usize,
}

impl ExecutableGraph {
    pub fn start(&self) -> &ExecNode {
        &self.nodes[self.start]
    }

    pub fn node(&self, id: &str) -> Option<&ExecNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[ExecNode] {
        &self.nodes
    }

    /// Breadth-first search along routing edges from the Start node.
    pub fn find_reachable(&self, id: &str) -> Option<&ExecNode> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([self.start]);
        while let Some(i) = queue.pop_front() {
            if !seen.insert(i) {
                continue;
            }
            let node = &self.nodes[i];
            if node.id == id {
                return Some(node);
            }
            for succ in &node.successors {
                if let Some(&next) = self.index.get(&succ.target) {
                    queue.push_back(next);
                }
            }
        }
        None
    }
}

/// Build an executable graph. The authored graph is left untouched.
pub fn convert(flow: &FlowGraph) -> Result<ExecutableGraph, GraphError> {
    let mut nodes = Vec::with_capacity(flow.nodes.len());
    let mut index = HashMap::new();

    for authored in &flow.nodes {
        let spec = NodeSpec::parse(&authored.id, &authored.kind, &authored.data).map_err(|e| {
            match e {
                ParseError::Node(e) => GraphError::from(e),
                ParseError::Json(e) => GraphError::InvalidProperties {
                    node_id: authored.id.clone(),
                    message: e.to_string(),
                },
            }
        })?;

        if index.insert(authored.id.clone(), nodes.len()).is_some() {
            return Err(GraphError::InvalidProperties {
                node_id: authored.id.clone(),
                message: "duplicate node id".to_string(),
            });
        }
        nodes.push(ExecNode {
            id: authored.id.clone(),
            label: authored.label.clone(),
            spec,
            successors: vec![],
        });
    }

    let mut bindings: Vec<(usize, ToolProviderRef)> = Vec::new();

    for edge in &flow.edges {
        match edge.kind {
            EdgeKind::Routing => {
                let source = *index.get(&edge.source).ok_or_else(|| GraphError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: edge.source.clone(),
                })?;
                if !index.contains_key(&edge.target) {
                    return Err(GraphError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: edge.target.clone(),
                    });
                }
                nodes[source].successors.push(Successor {
                    label: edge.label().to_string(),
                    target: edge.target.clone(),
                });
            }
            EdgeKind::ToolBinding => {
                let (Some(&a), Some(&b)) = (index.get(&edge.source), index.get(&edge.target)) else {
                    warn!(
                        edge_id = %edge.id,
                        "Tool binding edge references unknown node, ignoring"
                    );
                    continue;
                };
                // Either direction binds.
                let (process, provider) = match (&nodes[a].spec, &nodes[b].spec) {
                    (NodeSpec::Process(_), NodeSpec::ToolProvider(_)) => (a, b),
                    (NodeSpec::ToolProvider(_), NodeSpec::Process(_)) => (b, a),
                    _ => {
                        warn!(
                            edge_id = %edge.id,
                            "Tool binding edge does not join Process and ToolProvider, ignoring"
                        );
                        continue;
                    }
                };
                let NodeSpec::ToolProvider(props) = &nodes[provider].spec else {
                    continue;
                };
                match props.bound_provider.as_deref().filter(|p| !p.is_empty()) {
                    Some(bound) => bindings.push((
                        process,
                        ToolProviderRef {
                            id: nodes[provider].id.clone(),
                            bound_provider: bound.to_string(),
                            enabled_tools: props.enabled_tools.clone(),
                            env: props.env.clone(),
                        },
                    )),
                    None => warn!(
                        node_id = %nodes[provider].id,
                        "ToolProvider has no bound provider, binding skipped"
                    ),
                }
            }
        }
    }

    for (process, provider_ref) in bindings {
        if let NodeSpec::Process(props) = &mut nodes[process].spec {
            if !props.tool_provider_refs.iter().any(|r| r.id == provider_ref.id) {
                props.tool_provider_refs.push(provider_ref);
            }
        }
    }

    let starts: Vec<usize> = nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| matches!(n.spec, NodeSpec::Start(_)))
        .map(|(i, _)| i)
        .collect();
    let start = match starts.as_slice() {
        [] => return Err(GraphError::NoStartNode),
        [only] => *only,
        many => {
            return Err(GraphError::MultipleStartNodes(
                many.iter().map(|&i| nodes[i].id.clone()).collect(),
            ))
        }
    };

    debug!(flow_id = %flow.id, nodes = nodes.len(), "Flow converted");

    Ok(ExecutableGraph {
        flow_id: flow.id.clone(),
        name: flow.name.clone(),
        nodes,
        index,
        start,
    })
}
