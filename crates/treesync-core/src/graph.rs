//! Per-file change graphs
//!
//! For one path, every participant contributes a walk through the versions
//! the file went through: from a synthetic start node to the version it
//! began the diff window with, then along each change. Participants that did
//! not touch the path contribute a single hop to their current version.
//!
//! Versions that reappear (a change that is later reverted) create cycles;
//! collapsing strongly connected components turns those into a single node
//! so a revert does not look like a competing outcome. The terminal nodes
//! (sinks) of the resulting acyclic graph are the candidate outcomes: one
//! sink means every participant's history converges, more mean a conflict.
//!
//! Nodes live in an arena and are addressed by index; edges are adjacency
//! sets over those indices.

use std::collections::{BTreeMap, BTreeSet};

use crate::change::Change;
use crate::reference::{FileReference, FileReferenceComparer, versions_equal};
use crate::state::SyncActionKind;

type NodeId = usize;

const START: NodeId = 0;

#[derive(Debug, Clone)]
enum Node {
    Start,
    /// A file version; `None` means the file is absent.
    Version(Option<FileReference>),
}

/// Mutable change graph for one path, possibly cyclic.
pub struct ChangeGraph<'c> {
    comparer: &'c dyn FileReferenceComparer,
    nodes: Vec<Node>,
    edges: Vec<BTreeSet<NodeId>>,
    /// Sequence number of the most recent edge pointing at each node.
    last_target: Vec<usize>,
    sequence: usize,
}

impl<'c> ChangeGraph<'c> {
    pub fn new(comparer: &'c dyn FileReferenceComparer) -> Self {
        Self {
            comparer,
            nodes: vec![Node::Start],
            edges: vec![BTreeSet::new()],
            last_target: vec![0],
            sequence: 0,
        }
    }

    fn find(&self, version: Option<&FileReference>) -> Option<NodeId> {
        self.nodes.iter().position(|node| match node {
            Node::Start => false,
            Node::Version(existing) => versions_equal(self.comparer, existing.as_ref(), version),
        })
    }

    fn node(&mut self, version: Option<&FileReference>) -> NodeId {
        if let Some(id) = self.find(version) {
            return id;
        }
        self.nodes.push(Node::Version(version.cloned()));
        self.edges.push(BTreeSet::new());
        self.last_target.push(0);
        self.nodes.len() - 1
    }

    fn link(&mut self, from: NodeId, to: NodeId) {
        self.sequence += 1;
        self.last_target[to] = self.sequence;
        if from != to {
            self.edges[from].insert(to);
        }
    }

    /// Add an edge from the start node to `to`.
    pub fn add_start_edge(&mut self, to: Option<&FileReference>) {
        let to = self.node(to);
        self.link(START, to);
    }

    /// Add an edge between two versions.
    pub fn add_edge(&mut self, from: Option<&FileReference>, to: Option<&FileReference>) {
        let from = self.node(from);
        let to = self.node(to);
        self.link(from, to);
    }

    /// Whether `version` is a node of the graph.
    pub fn contains(&self, version: Option<&FileReference>) -> bool {
        self.find(version).is_some()
    }

    /// Number of version nodes (the start node is not counted).
    pub fn version_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Collapse every cycle into a single node.
    pub fn to_acyclic(&self) -> AcyclicGraph<'c> {
        let components = strongly_connected_components(&self.edges);

        let mut component_of = vec![0; self.nodes.len()];
        for (idx, members) in components.iter().enumerate() {
            for &node in members {
                component_of[node] = idx;
            }
        }

        let mut edges = vec![BTreeSet::new(); components.len()];
        for (from, targets) in self.edges.iter().enumerate() {
            for &to in targets {
                let (cf, ct) = (component_of[from], component_of[to]);
                if cf != ct {
                    edges[cf].insert(ct);
                }
            }
        }

        let components = components
            .into_iter()
            .map(|members| {
                let representative = members
                    .iter()
                    .copied()
                    .max_by_key(|&node| self.last_target[node])
                    .unwrap_or(START);
                let versions = members
                    .iter()
                    .filter_map(|&node| match &self.nodes[node] {
                        Node::Start => None,
                        Node::Version(version) => Some(version.clone()),
                    })
                    .collect();
                Component {
                    is_start: members.contains(&START),
                    versions,
                    representative: match &self.nodes[representative] {
                        Node::Start => None,
                        Node::Version(version) => version.clone(),
                    },
                }
            })
            .collect();

        AcyclicGraph {
            comparer: self.comparer,
            components,
            edges,
        }
    }
}

/// A node of the acyclic graph: one or more versions collapsed together.
#[derive(Debug, Clone)]
pub struct Component {
    is_start: bool,
    versions: Vec<Option<FileReference>>,
    representative: Option<FileReference>,
}

impl Component {
    /// Versions collapsed into this node.
    pub fn versions(&self) -> &[Option<FileReference>] {
        &self.versions
    }

    /// The version standing for the whole component: the member most
    /// recently reached by an edge.
    pub fn representative(&self) -> Option<&FileReference> {
        self.representative.as_ref()
    }
}

/// Outcome of classifying a change graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Every participant converges on this version (`None`: the file is deleted).
    Converged(Option<FileReference>),
    /// Several irreconcilable outcomes.
    Conflict(Vec<Option<FileReference>>),
}

/// Change graph with all cycles collapsed.
pub struct AcyclicGraph<'c> {
    comparer: &'c dyn FileReferenceComparer,
    components: Vec<Component>,
    edges: Vec<BTreeSet<usize>>,
}

impl AcyclicGraph<'_> {
    /// Whether any collapsed node contains `version`.
    pub fn contains(&self, version: Option<&FileReference>) -> bool {
        self.components.iter().any(|component| {
            component
                .versions
                .iter()
                .any(|v| versions_equal(self.comparer, v.as_ref(), version))
        })
    }

    /// Terminal version nodes.
    pub fn sinks(&self) -> Vec<&Component> {
        self.components
            .iter()
            .enumerate()
            .filter(|(idx, component)| !component.is_start && self.edges[*idx].is_empty())
            .map(|(_, component)| component)
            .collect()
    }

    /// Classify the graph by its number of sinks.
    ///
    /// # Panics
    ///
    /// Panics if the graph has no sink. Every participant adds at least one
    /// edge out of the start node, so an acyclic graph always ends somewhere.
    pub fn classify(&self) -> Classification {
        let sinks = self.sinks();
        match sinks.as_slice() {
            [] => panic!("change graph without sinks: at least one participant must contribute an edge"),
            [sink] => Classification::Converged(sink.representative.clone()),
            _ => Classification::Conflict(
                sinks
                    .iter()
                    .map(|sink| sink.representative.clone())
                    .collect(),
            ),
        }
    }
}

/// Builds change graphs from aggregated per-participant changes.
pub struct ChangeGraphBuilder<'c> {
    comparer: &'c dyn FileReferenceComparer,
}

impl<'c> ChangeGraphBuilder<'c> {
    pub fn new(comparer: &'c dyn FileReferenceComparer) -> Self {
        Self { comparer }
    }

    /// Build the graph for one path.
    ///
    /// * `changes` - each participant's ordered changes of the path
    /// * `current` - each participant's current version of the path
    ///
    /// A participant with changes contributes `start -> first.from` followed
    /// by every change; a participant without changes contributes
    /// `start -> current`.
    pub fn build(
        &self,
        changes: &BTreeMap<String, Vec<Change>>,
        current: &BTreeMap<String, Option<FileReference>>,
    ) -> ChangeGraph<'c> {
        let mut graph = ChangeGraph::new(self.comparer);

        let participants: BTreeSet<&String> = changes.keys().chain(current.keys()).collect();
        for participant in participants {
            match changes.get(participant).filter(|list| !list.is_empty()) {
                Some(list) => {
                    graph.add_start_edge(list[0].from());
                    for change in list {
                        graph.add_edge(change.from(), change.to());
                    }
                }
                None => {
                    let version = current.get(participant).and_then(|v| v.as_ref());
                    graph.add_start_edge(version);
                }
            }
        }
        graph
    }
}

/// An action one participant needs to reach a converged version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub participant: String,
    pub kind: SyncActionKind,
    pub from: Option<FileReference>,
    pub to: Option<FileReference>,
}

/// Actions that bring every participant from its current version to `target`.
pub fn plan_actions(
    comparer: &dyn FileReferenceComparer,
    target: Option<&FileReference>,
    current: &BTreeMap<String, Option<FileReference>>,
) -> Vec<PlannedAction> {
    current
        .iter()
        .filter(|(_, version)| !versions_equal(comparer, version.as_ref(), target))
        .map(|(participant, version)| {
            let kind = match (version, target) {
                (None, _) => SyncActionKind::Add,
                (Some(_), None) => SyncActionKind::Remove,
                (Some(_), Some(_)) => SyncActionKind::Replace,
            };
            PlannedAction {
                participant: participant.clone(),
                kind,
                from: version.clone(),
                to: target.cloned(),
            }
        })
        .collect()
}

/// Tarjan's algorithm over an adjacency list. Components are returned in
/// reverse topological order.
fn strongly_connected_components(edges: &[BTreeSet<NodeId>]) -> Vec<Vec<NodeId>> {
    struct Tarjan<'a> {
        edges: &'a [BTreeSet<NodeId>],
        index: Vec<Option<usize>>,
        lowlink: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<NodeId>,
        next_index: usize,
        components: Vec<Vec<NodeId>>,
    }

    impl Tarjan<'_> {
        fn visit(&mut self, v: NodeId) {
            self.index[v] = Some(self.next_index);
            self.lowlink[v] = self.next_index;
            self.next_index += 1;
            self.stack.push(v);
            self.on_stack[v] = true;

            let edges = self.edges;
            for &w in &edges[v] {
                match self.index[w] {
                    None => {
                        self.visit(w);
                        self.lowlink[v] = self.lowlink[v].min(self.lowlink[w]);
                    }
                    Some(w_index) if self.on_stack[w] => {
                        self.lowlink[v] = self.lowlink[v].min(w_index);
                    }
                    Some(_) => {}
                }
            }

            if Some(self.lowlink[v]) == self.index[v] {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                component.sort_unstable();
                self.components.push(component);
            }
        }
    }

    let n = edges.len();
    let mut tarjan = Tarjan {
        edges,
        index: vec![None; n],
        lowlink: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        next_index: 0,
        components: Vec::new(),
    };
    for v in 0..n {
        if tarjan.index[v].is_none() {
            tarjan.visit(v);
        }
    }
    tarjan.components
}
