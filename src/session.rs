//! Build session

// Imports
use {
	crate::{
		build::Builder,
		build_log::BuildLog,
		depfile::DepfileLoader,
		dirty::DirtyScanner,
		error::AppError,
		fs::RealFileSystem,
		graph::{EdgeId, Graph, NodeId},
		parser::Parser,
		util,
	},
	itertools::Itertools,
	std::{collections::HashSet, io, path::Path},
	tokio::fs,
};

/// Build session.
///
/// Holds the parsed graph of a build file, along with it's build log.
#[derive(Debug)]
pub struct Session {
	/// File system, rooted at the build directory
	fs: RealFileSystem,

	/// Graph
	graph: Graph,

	/// Build log
	build_log: BuildLog,
}

impl Session {
	/// Loads the build file `build_file`, relative to `root`
	pub async fn load(root: &Path, build_file: &str) -> Result<Self, AppError> {
		let fs = RealFileSystem::new(root);

		let mut graph = Graph::new();
		Parser::new(&mut graph, &fs).load(&util::canonicalize_path(build_file))?;
		tracing::debug!(
			nodes = graph.node_count(),
			edges = graph.edge_ids().count(),
			"Parsed build file"
		);

		let build_log = BuildLog::load(fs.resolve(BuildLog::FILE_NAME)).await;

		Ok(Self { fs, graph, build_log })
	}

	/// Resolves the targets to build.
	///
	/// Explicit targets are looked up by their canonical path. If there are none,
	/// the default targets are used, or, if there are none either, all root nodes.
	pub fn resolve_targets(&self, targets: &[String]) -> Result<Vec<NodeId>, AppError> {
		if !targets.is_empty() {
			return targets
				.iter()
				.map(|target| {
					self.graph
						.lookup_node(&util::canonicalize_path(target))
						.ok_or_else(|| AppError::UnknownTarget { target: target.clone() })
				})
				.collect();
		}

		match self.graph.defaults() {
			[] => Ok(self.graph.root_nodes()),
			defaults => Ok(defaults.to_vec()),
		}
	}

	/// Builds all `targets`
	pub async fn build(&mut self, targets: &[String], jobs: usize, verbose: bool) -> Result<(), AppError> {
		let targets = self.resolve_targets(targets)?;
		tracing::debug!(
			targets = ?targets.iter().map(|&target| &self.graph.node(target).path).collect::<Vec<_>>(),
			"Found targets to build"
		);

		let deps_loader = DepfileLoader::new(&self.fs);
		let validations =
			DirtyScanner::new(&mut self.graph, &self.fs, &self.build_log, &deps_loader).scan_all(&targets)?;

		let mut builder = Builder::new(&mut self.graph, &self.fs, &mut self.build_log, jobs, verbose);
		builder.add_targets(&targets)?;
		builder.add_targets(&validations)?;
		builder.run().await
	}

	/// Lists targets.
	///
	/// Lists all root nodes, or, if `all`, every output.
	pub fn targets(&self, all: bool) -> Vec<(&str, &str)> {
		let nodes: Vec<NodeId> = match all {
			true => self
				.graph
				.edge_ids()
				.flat_map(|edge| self.graph.edge(edge).outs.iter().copied())
				.collect(),
			false => self.graph.root_nodes(),
		};

		nodes
			.into_iter()
			.filter_map(|node| {
				let node = self.graph.node(node);
				let edge = node.in_edge?;
				Some((node.path.as_str(), self.graph.edge_name(edge)))
			})
			.collect()
	}

	/// Returns the commands needed to build `targets`, in dependency order
	pub fn commands(&self, targets: &[String]) -> Result<Vec<&str>, AppError> {
		let targets = self.resolve_targets(targets)?;
		let commands = self
			.reachable_edges(&targets)
			.into_iter()
			.filter(|&edge| !self.graph.edge(edge).is_phony())
			.map(|edge| self.graph.edge_command(edge))
			.collect();

		Ok(commands)
	}

	/// Removes all files built by `targets`, or by every edge, if empty.
	///
	/// Returns the number of files removed.
	pub async fn clean(&self, targets: &[String]) -> Result<usize, AppError> {
		let edges: Vec<EdgeId> = match targets.is_empty() {
			true => self.graph.edge_ids().collect(),
			false => self.reachable_edges(&self.resolve_targets(targets)?),
		};

		let mut removed = 0;
		for edge in edges {
			if self.graph.edge(edge).is_phony() || self.graph.edge_flag(edge, "generator") {
				continue;
			}

			let outs = self.graph.edge(edge).outs.iter().map(|&out| self.graph.node(out).path.clone());
			let extra = ["rspfile", "depfile"]
				.into_iter()
				.map(|var| self.graph.edge_var(edge, var))
				.filter(|path| !path.is_empty())
				.map(|path| util::canonicalize_path(&path));
			for path in outs.chain(extra).collect_vec() {
				if self.remove(&path).await? {
					removed += 1;
				}
			}
		}

		Ok(removed)
	}

	/// Removes a single file, returning if it existed
	async fn remove(&self, path: &str) -> Result<bool, AppError> {
		let file_path = self.fs.resolve(path);
		match fs::remove_file(&file_path).await {
			Ok(()) => {
				tracing::debug!(?path, "Removed file");
				Ok(true)
			},
			Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
			Err(err) => Err(AppError::remove_file(file_path)(err)),
		}
	}

	/// Returns all edges reachable from `targets`, dependencies first
	fn reachable_edges(&self, targets: &[NodeId]) -> Vec<EdgeId> {
		let mut visited = HashSet::new();
		let mut edges = vec![];
		for &target in targets {
			self.visit_edges(target, &mut visited, &mut edges);
		}

		edges
	}

	/// Visits the edges needed by `node`, in post-order
	fn visit_edges(&self, node: NodeId, visited: &mut HashSet<EdgeId>, edges: &mut Vec<EdgeId>) {
		let Some(edge) = self.graph.node(node).in_edge else {
			return;
		};
		if !visited.insert(edge) {
			return;
		}

		for &input in &self.graph.edge(edge).ins {
			self.visit_edges(input, visited, edges);
		}
		edges.push(edge);
	}
}

#[cfg(test)]
mod tests {
	use {super::Session, anyhow::Context, std::fs, tempdir::TempDir};

	/// Loads a session from a directory with just `build_file`
	async fn load(build_file: &str) -> Result<(TempDir, Session), anyhow::Error> {
		let temp_dir = TempDir::new("knit").context("Unable to create temporary directory")?;
		fs::write(temp_dir.path().join("build.ninja"), build_file).context("Unable to write build file")?;
		let session = Session::load(temp_dir.path(), "build.ninja")
			.await
			.context("Unable to load session")?;

		Ok((temp_dir, session))
	}

	const CHAIN: &str = "rule cp
  command = cp $in $out
build a: cp src
build b: cp a
build all: phony b
";

	#[tokio::test]
	async fn targets() -> Result<(), anyhow::Error> {
		let (_temp_dir, session) = load(CHAIN).await?;

		assert_eq!(session.targets(false), [("all", "phony")]);
		assert_eq!(session.targets(true), [("a", "cp"), ("b", "cp"), ("all", "phony")]);

		Ok(())
	}

	#[tokio::test]
	async fn commands_are_dependencies_first() -> Result<(), anyhow::Error> {
		let (_temp_dir, session) = load(CHAIN).await?;

		assert_eq!(session.commands(&[])?, ["cp src a", "cp a b"]);
		assert_eq!(session.commands(&["a".to_owned()])?, ["cp src a"]);

		Ok(())
	}

	#[tokio::test]
	async fn defaults_are_targets() -> Result<(), anyhow::Error> {
		let (_temp_dir, session) = load(&format!("{CHAIN}default a\n")).await?;

		assert_eq!(session.commands(&[])?, ["cp src a"]);

		Ok(())
	}
}
