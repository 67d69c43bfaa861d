//! Dirty scanning

// Imports
use {
	crate::{
		build_log::BuildLog,
		depfile::DepsLoader,
		error::AppError,
		fs::FileSystem,
		graph::{EdgeId, Graph, NodeId, VisitState},
		util,
	},
	std::time::SystemTime,
};

/// Dirty scanner.
///
/// Walks the graph depth-first from a target, computing which nodes need
/// rebuilding and which edges have their outputs ready.
#[derive(Debug)]
pub struct DirtyScanner<'a, F: ?Sized, D: ?Sized> {
	/// Graph
	graph: &'a mut Graph,

	/// File system
	fs: &'a F,

	/// Build log
	build_log: &'a BuildLog,

	/// Dependencies loader
	deps_loader: &'a D,

	/// Validation nodes found while scanning
	validations: Vec<NodeId>,
}

impl<'a, F: FileSystem + ?Sized, D: DepsLoader + ?Sized> DirtyScanner<'a, F, D> {
	/// Creates a new scanner
	pub fn new(graph: &'a mut Graph, fs: &'a F, build_log: &'a BuildLog, deps_loader: &'a D) -> Self {
		Self {
			graph,
			fs,
			build_log,
			deps_loader,
			validations: vec![],
		}
	}

	/// Scans all `targets`, along with any validations found.
	///
	/// Returns all validation nodes, which should also be built.
	pub fn scan_all(&mut self, targets: &[NodeId]) -> Result<Vec<NodeId>, AppError> {
		for &target in targets {
			self.scan(target)?;
		}

		// Note: Scanning validations may find more validations
		let mut validations = vec![];
		while let Some(validation) = self.validations.pop() {
			if validations.contains(&validation) || targets.contains(&validation) {
				continue;
			}

			self.scan(validation)?;
			validations.push(validation);
		}

		Ok(validations)
	}

	/// Scans a single target
	pub fn scan(&mut self, node: NodeId) -> Result<(), AppError> {
		let mut stack = vec![];
		self.collect_dirty(node, &mut stack)
	}

	/// Collects all dirty nodes reachable from `node`
	fn collect_dirty(&mut self, node: NodeId, stack: &mut Vec<NodeId>) -> Result<(), AppError> {
		let Some(edge) = self.graph.node(node).in_edge else {
			if !self.graph.node(node).is_statted() {
				self.stat_node(node)?;
				let node = self.graph.node_mut(node);
				node.dirty = !node.exists();
			}

			return Ok(());
		};

		match self.graph.edge(edge).visit {
			VisitState::Done => return Ok(()),
			VisitState::InProgress => return Err(self.cycle_error(node, edge, stack)),
			VisitState::Unvisited => (),
		}

		let edge_ref = self.graph.edge_mut(edge);
		edge_ref.visit = VisitState::InProgress;
		edge_ref.output_ready = true;
		stack.push(node);

		for out in self.graph.edge(edge).outs.clone() {
			if !self.graph.node(out).is_statted() {
				self.stat_node(out)?;
			}
		}

		if !self.graph.edge(edge).deps_loaded {
			self.graph.edge_mut(edge).deps_loaded = true;
			if let Err(err) = self.deps_loader.load_deps(self.graph, edge) {
				// Note: We don't consider the edge dirty, only warn the user
				tracing::warn!(path=?self.graph.node(node).path, err=%err.pretty(), "Unable to load dependencies");
			}
		}

		let mut dirty = false;
		let mut most_recent_input = None::<NodeId>;
		let inputs = self.graph.edge(edge).ins.clone();
		for (idx, input) in inputs.into_iter().enumerate() {
			self.collect_dirty(input, stack)?;

			if let Some(in_edge) = self.graph.node(input).in_edge {
				if !self.graph.edge(in_edge).output_ready {
					self.graph.edge_mut(edge).output_ready = false;
				}
			}

			if self.graph.edge(edge).is_order_only(idx) {
				continue;
			}

			let input_node = self.graph.node(input);
			match input_node.dirty {
				true => {
					tracing::trace!(path=?self.graph.node(node).path, input=?input_node.path, "Input is dirty");
					dirty = true;
				},
				false => {
					let is_more_recent = most_recent_input
						.is_none_or(|most_recent| input_node.mtime > self.graph.node(most_recent).mtime);
					if is_more_recent {
						most_recent_input = Some(input);
					}
				},
			}
		}

		self.validations.extend(self.graph.edge(edge).validations.iter().copied());

		if !dirty {
			dirty = self.outputs_dirty(edge, most_recent_input);
		}

		for out in self.graph.edge(edge).outs.clone() {
			self.graph.node_mut(out).dirty = dirty;
		}

		let edge_ref = self.graph.edge_mut(edge);
		if dirty && !(edge_ref.is_phony() && edge_ref.ins.is_empty()) {
			edge_ref.output_ready = false;
		}
		edge_ref.visit = VisitState::Done;

		let popped = stack.pop();
		debug_assert_eq!(popped, Some(node), "Visit stack was corrupted");

		Ok(())
	}

	/// Returns if any outputs of `edge` are dirty, given it's most recent input.
	///
	/// Assumes no inputs are dirty.
	fn outputs_dirty(&mut self, edge: EdgeId, most_recent_input: Option<NodeId>) -> bool {
		let most_recent_mtime = most_recent_input.and_then(|input| self.graph.node(input).mtime);

		let edge_ref = self.graph.edge(edge);
		if edge_ref.is_phony() {
			// Note: Phony edges have no outputs of their own, so they take on
			//       the modification time of their inputs.
			if most_recent_mtime.is_some() {
				for out in edge_ref.outs.clone() {
					self.graph.node_mut(out).mtime = most_recent_mtime;
				}
			}

			return false;
		}

		let command_hash = util::hash_command(self.graph.edge_command(edge));
		edge_ref
			.outs
			.iter()
			.any(|&out| self.output_dirty(edge, out, most_recent_mtime, command_hash))
	}

	/// Returns if a single output of `edge` is dirty
	fn output_dirty(
		&self,
		edge: EdgeId,
		out: NodeId,
		most_recent_mtime: Option<SystemTime>,
		command_hash: u64,
	) -> bool {
		let out = self.graph.node(out);
		if !out.exists() {
			tracing::trace!(path=?out.path, "Output is missing");
			return true;
		}

		let restat = self.graph.edge_flag(edge, "restat");
		if !restat && most_recent_mtime > out.mtime {
			tracing::trace!(path=?out.path, "Output is older than most recent input");
			return true;
		}

		let generator = self.graph.edge_flag(edge, "generator");
		match self.build_log.query_output(&out.path) {
			Some(entry) => {
				if !generator && entry.command_hash != command_hash {
					tracing::trace!(path=?out.path, "Command changed");
					return true;
				}

				if let Some(most_recent_mtime) = most_recent_mtime {
					if entry.mtime < util::unix_nanos(most_recent_mtime) {
						tracing::trace!(path=?out.path, "Recorded output is older than most recent input");
						return true;
					}
				}
			},
			None if !generator => {
				tracing::trace!(path=?out.path, "No build log entry");
				return true;
			},
			None => (),
		}

		false
	}

	/// Stats a node
	fn stat_node(&mut self, node: NodeId) -> Result<(), AppError> {
		let path = &self.graph.node(node).path;
		let stat = self.fs.stat(path).map_err(AppError::stat_file(path))?;
		self.graph.node_mut(node).set_stat(stat);

		Ok(())
	}

	/// Builds the error for a cycle found when reaching `node`, whose in-edge
	/// `edge` is being visited
	fn cycle_error(&self, node: NodeId, edge: EdgeId, stack: &[NodeId]) -> AppError {
		let start = stack
			.iter()
			.position(|&stack_node| self.graph.node(stack_node).in_edge == Some(edge))
			.unwrap_or(0);

		// Note: We start the cycle at `node` itself, even if we reached the edge through
		//       another of it's outputs, so it reads as a loop
		let mut cycle = vec![self.graph.node(node).path.clone()];
		cycle.extend(
			stack[start..]
				.iter()
				.skip(1)
				.map(|&stack_node| self.graph.node(stack_node).path.clone()),
		);
		cycle.push(self.graph.node(node).path.clone());

		AppError::DependencyCycle { cycle }
	}
}
