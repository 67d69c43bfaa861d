//! Builder

// Modules
mod worker;

// Imports
use {
	crate::{
		build_log::{BuildLog, LogEntry},
		error::{AppError, MissingInput},
		fs::{FileSystem, RealFileSystem},
		graph::{EdgeId, Graph, NodeId, PoolId},
		util,
	},
	itertools::Itertools,
	std::{
		collections::{HashMap, VecDeque},
		io::{self, Write},
		time::SystemTime,
	},
	tokio::sync::mpsc,
	worker::{Job, JobOutput, JobResult, Rspfile},
};

/// Edge status
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum EdgeStatus {
	/// Registered, but not dirty
	Init,

	/// Dirty, waiting for it's inputs
	Running,

	/// Queued to run
	Scheduled,
}

/// Pool state
#[derive(Clone, Default, Debug)]
struct PoolState {
	/// Number of edges currently running in the pool
	current: usize,

	/// Edges ready to run, waiting on the pool
	delayed: VecDeque<EdgeId>,
}

/// Builder.
///
/// Schedules the dirty edges needed by the added targets and runs their
/// commands, at most `jobs` at a time, respecting pools.
#[derive(Debug)]
pub struct Builder<'a> {
	/// Graph
	graph: &'a mut Graph,

	/// File system
	fs: &'a RealFileSystem,

	/// Build log
	build_log: &'a mut BuildLog,

	/// Maximum number of concurrent commands
	jobs: usize,

	/// If commands should be printed instead of descriptions
	verbose: bool,

	/// Status of every edge registered
	status: HashMap<EdgeId, EdgeStatus>,

	/// Edges ready to run
	ready: VecDeque<EdgeId>,

	/// Pools
	pools: HashMap<PoolId, PoolState>,

	/// Total number of commands to run
	total: usize,

	/// Number of commands started
	started: usize,

	/// Number of commands failed
	failed: usize,

	/// Missing inputs found while adding targets
	missing: Vec<MissingInput>,
}

impl<'a> Builder<'a> {
	/// Creates a new builder
	pub fn new(
		graph: &'a mut Graph,
		fs: &'a RealFileSystem,
		build_log: &'a mut BuildLog,
		jobs: usize,
		verbose: bool,
	) -> Self {
		Self {
			graph,
			fs,
			build_log,
			jobs: jobs.max(1),
			verbose,
			status: HashMap::new(),
			ready: VecDeque::new(),
			pools: HashMap::new(),
			total: 0,
			started: 0,
			failed: 0,
			missing: vec![],
		}
	}

	/// Adds all targets to be built.
	///
	/// Targets must have been scanned for dirtiness beforehand.
	/// Fails if any dirty leaf input, which no edge can produce, is needed.
	pub fn add_targets(&mut self, targets: &[NodeId]) -> Result<(), AppError> {
		for &target in targets {
			self.add_target(target, None);
		}

		match self.missing.is_empty() {
			true => Ok(()),
			false => Err(AppError::MissingInputs {
				missing: std::mem::take(&mut self.missing),
			}),
		}
	}

	/// Adds a target, needed by `needed_by`
	fn add_target(&mut self, node: NodeId, needed_by: Option<NodeId>) {
		let node_ref = self.graph.node(node);
		let Some(edge) = node_ref.in_edge else {
			// Note: Missing depfile dependencies only make their consumer re-run,
			//       which rewrites the depfile.
			if node_ref.dirty
				&& !node_ref.generated_by_deps
				&& !self.missing.iter().any(|missing| missing.path == node_ref.path)
			{
				self.missing.push(MissingInput {
					path:      node_ref.path.clone(),
					needed_by: needed_by.map(|needed_by| self.graph.node(needed_by).path.clone()),
				});
			}
			return;
		};

		if self.graph.edge(edge).output_ready {
			return;
		}

		let (status, registered) = match self.status.get(&edge) {
			Some(&status) => (status, true),
			None => {
				let _: Option<EdgeStatus> = self.status.insert(edge, EdgeStatus::Init);
				(EdgeStatus::Init, false)
			},
		};

		if self.graph.node(node).dirty && status == EdgeStatus::Init {
			let _: Option<EdgeStatus> = self.status.insert(edge, EdgeStatus::Running);
			if !self.graph.edge(edge).is_phony() {
				self.total += 1;
			}
			if self.graph.all_inputs_ready(edge) {
				self.schedule(edge);
			}
		}

		if registered {
			return;
		}

		for input in self.graph.edge(edge).ins.clone() {
			self.add_target(input, Some(node));
		}
	}

	/// Schedules an edge to run
	fn schedule(&mut self, edge: EdgeId) {
		if self.status.get(&edge) == Some(&EdgeStatus::Scheduled) {
			return;
		}

		let _: Option<EdgeStatus> = self.status.insert(edge, EdgeStatus::Scheduled);
		self.ready.push_back(edge);
	}

	/// Marks an edge as finished, scheduling any dependents now ready
	fn finished(&mut self, edge: EdgeId) {
		self.graph.edge_mut(edge).output_ready = true;
		let _: Option<EdgeStatus> = self.status.remove(&edge);

		for out in self.graph.edge(edge).outs.clone() {
			for dependent in self.graph.node(out).out_edges.clone() {
				let Some(&status) = self.status.get(&dependent) else {
					continue;
				};
				if !self.graph.all_inputs_ready(dependent) {
					continue;
				}

				// Note: Dependents that aren't dirty were only waiting on their inputs
				match status {
					EdgeStatus::Init => self.finished(dependent),
					EdgeStatus::Running | EdgeStatus::Scheduled => self.schedule(dependent),
				}
			}
		}
	}

	/// Returns the bounded pool of an edge, if any
	fn edge_pool(&self, edge: EdgeId) -> Option<(PoolId, usize)> {
		let pool = self.graph.edge(edge).pool?;
		match self.graph.pool(pool).depth {
			0 => None,
			depth => Some((pool, depth)),
		}
	}

	/// Pops the next edge that can run, delaying those whose pool is full
	fn next_ready(&mut self) -> Option<EdgeId> {
		while let Some(edge) = self.ready.pop_front() {
			if self.graph.edge(edge).is_phony() {
				return Some(edge);
			}

			if let Some((pool, depth)) = self.edge_pool(edge) {
				let pool = self.pools.entry(pool).or_default();
				if pool.current >= depth {
					pool.delayed.push_back(edge);
					continue;
				}
				pool.current += 1;
			}

			return Some(edge);
		}

		None
	}

	/// Releases the pool slot of an edge
	fn release_pool(&mut self, edge: EdgeId) {
		let Some((pool, _)) = self.edge_pool(edge) else {
			return;
		};

		let pool = self.pools.entry(pool).or_default();
		pool.current -= 1;
		if let Some(delayed) = pool.delayed.pop_front() {
			self.ready.push_back(delayed);
		}
	}

	/// Runs all scheduled edges.
	///
	/// On the first failure, no more commands are started, but all running ones
	/// are waited on.
	pub async fn run(&mut self) -> Result<(), AppError> {
		if self.ready.is_empty() {
			println!("knit: no work to do.");
			return Ok(());
		}

		let (result_tx, mut result_rx) = mpsc::unbounded_channel();
		let mut running = 0;
		loop {
			while running < self.jobs && self.failed == 0 {
				let Some(edge) = self.next_ready() else {
					break;
				};

				if self.graph.edge(edge).is_phony() {
					tracing::trace!(path=?self.edge_output(edge), "Finished phony edge");
					self.finished(edge);
					continue;
				}

				let job = self.start(edge);
				let _: tokio::task::JoinHandle<()> = tokio::spawn(worker::run(job, result_tx.clone()));
				running += 1;
			}

			if running == 0 {
				break;
			}

			// Note: We hold a sender, so this never returns `None`
			let Some(result) = result_rx.recv().await else {
				break;
			};
			running -= 1;
			self.job_finished(result).await?;
		}

		if self.failed != 0 {
			return Err(AppError::BuildFailed { failed: self.failed });
		}

		let remaining = self
			.status
			.values()
			.filter(|&&status| status != EdgeStatus::Init)
			.count();
		if remaining != 0 {
			tracing::warn!(?remaining, "Some edges were never ready to run");
		}

		tracing::info!(commands = self.started, "Build finished");
		Ok(())
	}

	/// Returns the first output of an edge, for display
	fn edge_output(&self, edge: EdgeId) -> &str {
		self.graph
			.edge(edge)
			.outs
			.first()
			.map_or("", |&out| self.graph.node(out).path.as_str())
	}

	/// Prints the progress line for `edge` and creates it's job
	fn start(&mut self, edge: EdgeId) -> Job {
		self.started += 1;

		let command = self.graph.edge_command(edge).to_owned();
		let description = self.graph.edge_var(edge, "description");
		let status = match self.verbose || description.is_empty() {
			true => &command,
			false => &description,
		};
		println!("[{}/{}] {status}", self.started, self.total);

		let rspfile = self.graph.edge_var(edge, "rspfile");
		let rspfile = match rspfile.is_empty() {
			true => None,
			false => Some(Rspfile {
				path:     self.fs.resolve(&util::canonicalize_path(&rspfile)),
				contents: self.graph.edge_var(edge, "rspfile_content"),
			}),
		};

		let edge_ref = self.graph.edge(edge);
		let console = edge_ref
			.pool
			.is_some_and(|pool| self.graph.pool(pool).name == Graph::CONSOLE_POOL);
		Job {
			edge,
			command,
			root: self.fs.root().to_path_buf(),
			outputs: edge_ref
				.outs
				.iter()
				.map(|&out| self.fs.resolve(&self.graph.node(out).path))
				.collect(),
			rspfile,
			console,
		}
	}

	/// Handles a finished job
	async fn job_finished(&mut self, result: JobResult) -> Result<(), AppError> {
		let edge = result.edge;
		self.release_pool(edge);

		match result.output {
			Ok(JobOutput { status, output }) if status.success() => {
				if !output.is_empty() {
					let mut stdout = io::stdout().lock();
					if let Err(err) = stdout.write_all(&output).and_then(|()| stdout.flush()) {
						tracing::warn!(?err, "Unable to write command output");
					}
				}

				self.record(edge, result.start, result.end).await?;
				self.finished(edge);
			},
			Ok(JobOutput { status, output }) => {
				self.failed += 1;
				let outputs = self
					.graph
					.edge(edge)
					.outs
					.iter()
					.map(|&out| &self.graph.node(out).path)
					.join(" ");
				eprintln!(
					"FAILED: {outputs}\n{}\n{}",
					self.graph.edge_command(edge),
					String::from_utf8_lossy(&output)
				);
				tracing::debug!(?outputs, ?status, "Command failed");
			},
			Err(err) => {
				self.failed += 1;
				tracing::error!(path=?self.edge_output(edge), err=%err.pretty(), "Unable to run command");
			},
		}

		Ok(())
	}

	/// Re-stats the outputs of a successful edge and records them in the build log
	async fn record(&mut self, edge: EdgeId, start: SystemTime, end: SystemTime) -> Result<(), AppError> {
		let outs = self.graph.edge(edge).outs.clone();
		for &out in &outs {
			let path = &self.graph.node(out).path;
			let stat = self.fs.stat(path).map_err(AppError::stat_file(path))?;
			let node = self.graph.node_mut(out);
			node.set_stat(stat);
			node.dirty = false;
		}

		// Note: With `restat`, the output may be older than it's inputs, so we
		//       record the most recent input instead, to know it was handled.
		let restat = self.graph.edge_flag(edge, "restat");
		let most_recent_input = match restat {
			true => self
				.graph
				.edge(edge)
				.non_order_only_ins()
				.iter()
				.filter_map(|&input| self.graph.node(input).mtime)
				.max(),
			false => None,
		};

		let command_hash = util::hash_command(self.graph.edge_command(edge));
		for out in outs {
			let node = self.graph.node(out);
			let mtime = node.mtime.max(most_recent_input).map_or(0, util::unix_nanos);
			let entry = LogEntry {
				start: util::unix_nanos(start),
				end: util::unix_nanos(end),
				mtime,
				command_hash,
			};
			self.build_log.record(&node.path, entry).await?;
		}

		Ok(())
	}
}
