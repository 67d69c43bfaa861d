//! Build graph

// Imports
use {
	crate::{
		fs::{Existence, Stat},
		scope::{ScopeId, Scopes},
		template::{Env, Template},
	},
	indexmap::IndexMap,
	itertools::Itertools,
	smallvec::SmallVec,
	std::{collections::HashMap, sync::OnceLock, time::SystemTime},
};

/// Node id
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Debug)]
pub struct NodeId(pub(crate) usize);

/// Edge id
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Debug)]
pub struct EdgeId(pub(crate) usize);

/// Rule id
#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug)]
pub struct RuleId(pub(crate) usize);

/// Pool id
#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug)]
pub struct PoolId(pub(crate) usize);

/// Node.
///
/// A file, identified by it's canonical path.
#[derive(Clone, Debug)]
pub struct Node {
	/// Path
	pub path: String,

	/// Edge producing this node, if any
	pub in_edge: Option<EdgeId>,

	/// Edges consuming this node
	pub out_edges: SmallVec<[EdgeId; 2]>,

	/// Edges validated by this node
	pub validation_out_edges: SmallVec<[EdgeId; 1]>,

	/// Existence
	pub existence: Existence,

	/// Modification time
	pub mtime: Option<SystemTime>,

	/// If dirty
	pub dirty: bool,

	/// If this node was only found through a depfile
	pub generated_by_deps: bool,
}

impl Node {
	/// Creates a new, un-statted, node
	fn new(path: String) -> Self {
		Self {
			path,
			in_edge: None,
			out_edges: SmallVec::new(),
			validation_out_edges: SmallVec::new(),
			existence: Existence::Unknown,
			mtime: None,
			dirty: false,
			generated_by_deps: false,
		}
	}

	/// Returns if this node has been statted
	pub fn is_statted(&self) -> bool {
		self.existence != Existence::Unknown
	}

	/// Returns if this node exists
	pub fn exists(&self) -> bool {
		self.existence == Existence::Exists
	}

	/// Updates this node's status
	pub fn set_stat(&mut self, stat: Stat) {
		self.existence = stat.existence;
		self.mtime = stat.mtime;
	}
}

/// Rule kind
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum RuleKind {
	/// Built-in `phony` rule
	Phony,

	/// User rule
	Custom(RuleId),
}

/// Rule
#[derive(Clone, Debug)]
pub struct Rule {
	/// Name
	pub name: String,

	/// Variables
	pub vars: IndexMap<String, Template>,
}

/// Pool
#[derive(Clone, Debug)]
pub struct Pool {
	/// Name
	pub name: String,

	/// Depth, or `0` if unbounded
	pub depth: usize,
}

/// Edge visit state, for dirty scanning
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub enum VisitState {
	/// Not visited yet
	#[default]
	Unvisited,

	/// Currently being visited
	InProgress,

	/// Visited
	Done,
}

/// Edge.
///
/// A single build statement.
#[derive(Debug)]
pub struct Edge {
	/// Rule
	pub rule: RuleKind,

	/// Pool
	pub pool: Option<PoolId>,

	/// Scope of the statement
	pub scope: ScopeId,

	/// Outputs.
	///
	/// The last `implicit_outs` are implicit.
	pub outs: Vec<NodeId>,

	/// Implicit outputs
	pub implicit_outs: usize,

	/// Inputs.
	///
	/// Explicit inputs, followed by `implicit_deps` implicit inputs, followed
	/// by `order_only_deps` order-only inputs.
	pub ins: Vec<NodeId>,

	/// Implicit inputs
	pub implicit_deps: usize,

	/// Order-only inputs
	pub order_only_deps: usize,

	/// Validations
	pub validations: Vec<NodeId>,

	/// Visit state
	pub visit: VisitState,

	/// If all outputs are up to date
	pub output_ready: bool,

	/// If the depfile was loaded
	pub deps_loaded: bool,

	/// Evaluated command
	command: OnceLock<String>,
}

impl Edge {
	/// Creates a new edge with no inputs or outputs
	pub fn new(rule: RuleKind, scope: ScopeId) -> Self {
		Self {
			rule,
			pool: None,
			scope,
			outs: vec![],
			implicit_outs: 0,
			ins: vec![],
			implicit_deps: 0,
			order_only_deps: 0,
			validations: vec![],
			visit: VisitState::Unvisited,
			output_ready: false,
			deps_loaded: false,
			command: OnceLock::new(),
		}
	}

	/// Returns if this edge is phony
	pub fn is_phony(&self) -> bool {
		self.rule == RuleKind::Phony
	}

	/// Returns the explicit outputs
	pub fn explicit_outs(&self) -> &[NodeId] {
		&self.outs[..self.outs.len() - self.implicit_outs]
	}

	/// Returns the explicit inputs
	pub fn explicit_ins(&self) -> &[NodeId] {
		&self.ins[..self.ins.len() - self.implicit_deps - self.order_only_deps]
	}

	/// Returns all inputs that aren't order-only
	pub fn non_order_only_ins(&self) -> &[NodeId] {
		&self.ins[..self.ins.len() - self.order_only_deps]
	}

	/// Returns if the `idx`-th input is order-only
	pub fn is_order_only(&self, idx: usize) -> bool {
		idx >= self.ins.len() - self.order_only_deps
	}
}

/// Build graph.
///
/// Owns all nodes, edges, rules, pools and scopes of a build.
#[derive(Debug)]
pub struct Graph {
	/// Scopes
	pub scopes: Scopes,

	/// Nodes
	nodes: Vec<Node>,

	/// Nodes by path
	node_paths: HashMap<String, NodeId>,

	/// Edges
	edges: Vec<Edge>,

	/// Rules
	rules: Vec<Rule>,

	/// Pools
	pools: Vec<Pool>,

	/// Pools by name
	pool_names: HashMap<String, PoolId>,

	/// Default targets
	defaults: Vec<NodeId>,
}

impl Graph {
	/// Name of the built-in console pool
	pub const CONSOLE_POOL: &'static str = "console";

	/// Creates an empty graph
	pub fn new() -> Self {
		let mut graph = Self {
			scopes:     Scopes::new(),
			nodes:      vec![],
			node_paths: HashMap::new(),
			edges:      vec![],
			rules:      vec![],
			pools:      vec![],
			pool_names: HashMap::new(),
			defaults:   vec![],
		};

		let _: Option<PoolId> = graph.add_pool(Self::CONSOLE_POOL, 1);
		graph
	}

	/// Returns a node
	pub fn node(&self, node: NodeId) -> &Node {
		&self.nodes[node.0]
	}

	/// Returns a node mutably
	pub fn node_mut(&mut self, node: NodeId) -> &mut Node {
		&mut self.nodes[node.0]
	}

	/// Returns an edge
	pub fn edge(&self, edge: EdgeId) -> &Edge {
		&self.edges[edge.0]
	}

	/// Returns an edge mutably
	pub fn edge_mut(&mut self, edge: EdgeId) -> &mut Edge {
		&mut self.edges[edge.0]
	}

	/// Returns a rule
	pub fn rule(&self, rule: RuleId) -> &Rule {
		&self.rules[rule.0]
	}

	/// Returns a pool
	pub fn pool(&self, pool: PoolId) -> &Pool {
		&self.pools[pool.0]
	}

	/// Returns the number of nodes
	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}

	/// Returns all edge ids
	pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> {
		(0..self.edges.len()).map(EdgeId)
	}

	/// Looks up a node by it's canonical path
	pub fn lookup_node(&self, path: &str) -> Option<NodeId> {
		self.node_paths.get(path).copied()
	}

	/// Finds a node by it's canonical path, or creates it
	pub fn find_or_create_node(&mut self, path: &str) -> NodeId {
		if let Some(&node) = self.node_paths.get(path) {
			return node;
		}

		let node = NodeId(self.nodes.len());
		self.nodes.push(Node::new(path.to_owned()));
		let _: Option<NodeId> = self.node_paths.insert(path.to_owned(), node);
		node
	}

	/// Adds a rule
	pub fn add_rule(&mut self, rule: Rule) -> RuleId {
		let id = RuleId(self.rules.len());
		self.rules.push(rule);
		id
	}

	/// Adds a pool.
	///
	/// Returns `None` if a pool with the same name already exists.
	pub fn add_pool(&mut self, name: &str, depth: usize) -> Option<PoolId> {
		if self.pool_names.contains_key(name) {
			return None;
		}

		let id = PoolId(self.pools.len());
		self.pools.push(Pool {
			name: name.to_owned(),
			depth,
		});
		let _: Option<PoolId> = self.pool_names.insert(name.to_owned(), id);
		Some(id)
	}

	/// Looks up a pool by name
	pub fn lookup_pool(&self, name: &str) -> Option<PoolId> {
		self.pool_names.get(name).copied()
	}

	/// Adds an edge, linking it to all of it's nodes.
	///
	/// Fails with the offending output if any output already has a producer, in
	/// which case the graph is left unchanged.
	pub fn add_edge(&mut self, edge: Edge) -> Result<EdgeId, NodeId> {
		if let Some(&out) = edge.outs.iter().find(|&&out| self.node(out).in_edge.is_some()) {
			return Err(out);
		}

		let id = EdgeId(self.edges.len());
		for &out in &edge.outs {
			self.nodes[out.0].in_edge = Some(id);
		}
		for &input in &edge.ins {
			self.nodes[input.0].out_edges.push(id);
		}
		for &validation in &edge.validations {
			self.nodes[validation.0].validation_out_edges.push(id);
		}

		self.edges.push(edge);
		Ok(id)
	}

	/// Adds an implicit input to an edge, before all it's order-only inputs
	pub fn add_implicit_input(&mut self, edge: EdgeId, node: NodeId) {
		let edge_ref = &mut self.edges[edge.0];
		let idx = edge_ref.ins.len() - edge_ref.order_only_deps;
		edge_ref.ins.insert(idx, node);
		edge_ref.implicit_deps += 1;

		self.nodes[node.0].out_edges.push(edge);
	}

	/// Adds a default target
	pub fn add_default(&mut self, node: NodeId) {
		self.defaults.push(node);
	}

	/// Returns all default targets
	pub fn defaults(&self) -> &[NodeId] {
		&self.defaults
	}

	/// Returns all root nodes.
	///
	/// These are the outputs that no edge consumes.
	pub fn root_nodes(&self) -> Vec<NodeId> {
		self.edges
			.iter()
			.flat_map(|edge| &edge.outs)
			.copied()
			.filter(|&out| self.node(out).out_edges.is_empty())
			.unique()
			.collect()
	}

	/// Returns the environment of an edge
	pub const fn edge_env(&self, edge: EdgeId) -> EdgeEnv<'_> {
		EdgeEnv { graph: self, edge }
	}

	/// Evaluates a variable of an edge.
	///
	/// Returns the empty string if it's unbound.
	pub fn edge_var(&self, edge: EdgeId, name: &str) -> String {
		let env = self.edge_env(edge);
		env.lookup_var(name).map(|value| value.eval(&env)).unwrap_or_default()
	}

	/// Returns if a variable of an edge is set to a non-empty value
	pub fn edge_flag(&self, edge: EdgeId, name: &str) -> bool {
		!self.edge_var(edge, name).is_empty()
	}

	/// Returns the command of an edge
	pub fn edge_command(&self, edge: EdgeId) -> &str {
		self.edges[edge.0]
			.command
			.get_or_init(|| self.edge_var(edge, "command"))
	}

	/// Returns a user-facing name of an edge
	pub fn edge_name(&self, edge: EdgeId) -> &str {
		match self.edges[edge.0].rule {
			RuleKind::Phony => "phony",
			RuleKind::Custom(rule) => &self.rule(rule).name,
		}
	}

	/// Returns if all inputs of an edge are ready
	pub fn all_inputs_ready(&self, edge: EdgeId) -> bool {
		self.edges[edge.0].ins.iter().all(|&input| {
			self.node(input)
				.in_edge
				.is_none_or(|in_edge| self.edge(in_edge).output_ready)
		})
	}
}

impl Default for Graph {
	fn default() -> Self {
		Self::new()
	}
}

/// Environment of an edge.
///
/// Looks up variables in the statement's own bindings, then the rule's
/// bindings, then the enclosing scopes.
#[derive(Clone, Copy, Debug)]
pub struct EdgeEnv<'a> {
	/// Graph
	graph: &'a Graph,

	/// Edge
	edge: EdgeId,
}

impl Env for EdgeEnv<'_> {
	fn lookup_var(&self, name: &str) -> Option<&Template> {
		let edge = self.graph.edge(self.edge);
		let scope = self.graph.scopes.get(edge.scope);

		if let Some(value) = scope.vars.get(name) {
			return Some(value);
		}

		if let RuleKind::Custom(rule) = edge.rule {
			if let Some(value) = self.graph.rule(rule).vars.get(name) {
				return Some(value);
			}
		}

		scope
			.parent
			.and_then(|parent| self.graph.scopes.lookup_var(parent, name))
	}
}
