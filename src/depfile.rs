//! Dependency files

// Imports
use {
	crate::{
		error::AppError,
		fs::FileSystem,
		graph::{EdgeId, Graph},
		util,
	},
	std::iter::Peekable,
};

/// Dependency loader
pub trait DepsLoader {
	/// Loads the extra dependencies of `edge`, adding them as implicit inputs.
	///
	/// Does nothing if the edge declares no extra dependencies.
	fn load_deps(&self, graph: &mut Graph, edge: EdgeId) -> Result<(), AppError>;
}

/// Makefile-style depfile loader
#[derive(Debug)]
pub struct DepfileLoader<'a, F: ?Sized> {
	/// File system
	fs: &'a F,
}

impl<'a, F: FileSystem + ?Sized> DepfileLoader<'a, F> {
	/// Creates a new loader
	pub const fn new(fs: &'a F) -> Self {
		Self { fs }
	}
}

impl<F: FileSystem + ?Sized> DepsLoader for DepfileLoader<'_, F> {
	fn load_deps(&self, graph: &mut Graph, edge: EdgeId) -> Result<(), AppError> {
		let depfile_path = graph.edge_var(edge, "depfile");
		if depfile_path.is_empty() {
			return Ok(());
		}
		let depfile_path = util::canonicalize_path(&depfile_path);

		let contents = self
			.fs
			.read_file(&depfile_path)
			.map_err(AppError::read_file(&depfile_path))?;
		let depfile = self::parse_depfile(&depfile_path, &String::from_utf8_lossy(&contents))?;

		// Note: An empty depfile is valid, just has no dependencies
		let Some(dep_output) = depfile.outputs.first() else {
			return Ok(());
		};
		let edge_outputs = graph
			.edge(edge)
			.outs
			.iter()
			.map(|&out| graph.node(out).path.clone())
			.collect::<Vec<_>>();
		if !edge_outputs.contains(dep_output) {
			return Err(AppError::DepFileMissingOutputs {
				dep_file_path: depfile_path.into(),
				edge_outputs,
				dep_output: dep_output.clone(),
			});
		}

		for dep in depfile.deps {
			let node = match graph.lookup_node(&dep) {
				Some(node) => node,
				None => {
					let node = graph.find_or_create_node(&dep);
					graph.node_mut(node).generated_by_deps = true;
					node
				},
			};
			if graph.edge(edge).ins.contains(&node) {
				continue;
			}

			tracing::trace!(?depfile_path, ?dep, "Found depfile dependency");
			graph.add_implicit_input(edge, node);
		}

		Ok(())
	}
}

/// Parsed depfile
#[derive(PartialEq, Eq, Clone, Default, Debug)]
pub struct Depfile {
	/// Outputs
	pub outputs: Vec<String>,

	/// Dependencies
	pub deps: Vec<String>,
}

/// Parses a depfile.
///
/// Supports multiple `outputs: deps` records, `\`-newline continuations,
/// `\ ` and `\#` escapes and `$$`. All paths are canonicalized, and duplicates
/// removed.
pub fn parse_depfile(depfile_path: &str, contents: &str) -> Result<Depfile, AppError> {
	let mut depfile = Depfile::default();
	let mut chars = contents.chars().peekable();

	// If we're still reading the outputs of the current record
	let mut in_outputs = true;
	let mut record_has_outputs = false;
	loop {
		let (word, end) = self::read_word(&mut chars);

		if !word.is_empty() {
			let word = util::canonicalize_path(&word);
			let paths = match in_outputs {
				true => &mut depfile.outputs,
				false => &mut depfile.deps,
			};
			if !paths.contains(&word) {
				paths.push(word);
			}
			record_has_outputs |= in_outputs;
		}

		match end {
			WordEnd::Space => (),
			WordEnd::Colon => in_outputs = false,
			WordEnd::Newline | WordEnd::Eof => {
				if in_outputs && record_has_outputs {
					return Err(AppError::DepFileMissingColon {
						dep_file_path: depfile_path.into(),
					});
				}

				in_outputs = true;
				record_has_outputs = false;
				if end == WordEnd::Eof {
					break;
				}
			},
		}
	}

	Ok(depfile)
}

/// How a word ended
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum WordEnd {
	/// Whitespace or a continuation
	Space,

	/// Output separator
	Colon,

	/// End of a record
	Newline,

	/// End of file
	Eof,
}

/// Reads a single word
fn read_word(chars: &mut Peekable<impl Iterator<Item = char>>) -> (String, WordEnd) {
	let mut word = String::new();
	loop {
		let Some(ch) = chars.next() else {
			return (word, WordEnd::Eof);
		};

		match ch {
			' ' | '\t' => return (word, WordEnd::Space),
			'\n' => return (word, WordEnd::Newline),
			'\r' if chars.peek() == Some(&'\n') => {
				let _: Option<char> = chars.next();
				return (word, WordEnd::Newline);
			},
			'\\' => match chars.peek() {
				Some(&(' ' | '#')) => word.extend(chars.next()),
				Some('\n') => {
					let _: Option<char> = chars.next();
					return (word, WordEnd::Space);
				},
				Some('\r') => {
					let _: Option<char> = chars.next();
					if chars.peek() == Some(&'\n') {
						let _: Option<char> = chars.next();
					}
					return (word, WordEnd::Space);
				},
				_ => word.push('\\'),
			},
			'$' if chars.peek() == Some(&'$') => word.extend(chars.next()),
			// Note: Colons followed by a character (e.g. `c:/path`) are part of the path
			':' => match chars.peek() {
				None | Some(' ' | '\t' | '\n' | '\r') => return (word, WordEnd::Colon),
				Some(_) => word.push(':'),
			},
			_ => word.push(ch),
		}
	}
}

#[cfg(test)]
mod tests {
	use {
		super::{Depfile, DepfileLoader, DepsLoader},
		crate::{
			error::AppError,
			fs::MemoryFileSystem,
			graph::{Edge, Graph, RuleKind},
		},
	};

	fn parse(contents: &str) -> Depfile {
		super::parse_depfile("a.d", contents).expect("Unable to parse depfile")
	}

	#[test]
	fn single_record() {
		assert_eq!(parse("a.o: a.c a.h\n"), Depfile {
			outputs: vec!["a.o".to_owned()],
			deps:    vec!["a.c".to_owned(), "a.h".to_owned()],
		});
	}

	#[test]
	fn continuations_and_escapes() {
		let depfile = parse("out/a.o: src/a.c \\\n  include/my\\ header.h \\\r\n  ./x/../y.h $$z.h\n");
		assert_eq!(depfile.outputs, ["out/a.o"]);
		assert_eq!(depfile.deps, ["src/a.c", "include/my header.h", "y.h", "$z.h"]);
	}

	#[test]
	fn multiple_records() {
		let depfile = parse("a.o b.o: a.c\nb.o: b.c a.c\n\n");
		assert_eq!(depfile.outputs, ["a.o", "b.o"]);
		assert_eq!(depfile.deps, ["a.c", "b.c"]);
	}

	#[test]
	fn empty() {
		assert_eq!(parse(""), Depfile::default());
		assert_eq!(parse("\n\n"), Depfile::default());
	}

	#[test]
	fn missing_colon() {
		let err = super::parse_depfile("a.d", "a.o a.c\n").expect_err("Expected error");
		assert!(matches!(err, AppError::DepFileMissingColon { .. }), "Unexpected error: {err:?}");
	}

	#[test]
	fn loads_implicit_deps_before_order_only() {
		let fs = MemoryFileSystem::new();
		fs.write("a.d", 0, "a.o: a.c a.h\n");

		let mut graph = Graph::new();
		let scope = graph.scopes.root();
		let edge_scope = graph.scopes.add_child(scope);
		graph
			.scopes
			.bind(edge_scope, "depfile", crate::template::Template::literal("a.d"));

		let mut edge = Edge::new(RuleKind::Phony, edge_scope);
		edge.outs = vec![graph.find_or_create_node("a.o")];
		edge.ins = vec![graph.find_or_create_node("a.c"), graph.find_or_create_node("gen")];
		edge.order_only_deps = 1;
		let edge = graph.add_edge(edge).expect("Unable to add edge");

		DepfileLoader::new(&fs)
			.load_deps(&mut graph, edge)
			.expect("Unable to load deps");

		let ins = graph
			.edge(edge)
			.ins
			.iter()
			.map(|&node| graph.node(node).path.as_str())
			.collect::<Vec<_>>();
		assert_eq!(ins, ["a.c", "a.h", "gen"]);
		assert!(!graph.node(graph.lookup_node("a.c").expect("Missing node")).generated_by_deps);
		assert!(graph.node(graph.lookup_node("a.h").expect("Missing node")).generated_by_deps);
		assert_eq!(graph.edge(edge).implicit_deps, 1);
		assert_eq!(graph.edge(edge).order_only_deps, 1);
	}

	#[test]
	fn missing_depfile() {
		let fs = MemoryFileSystem::new();
		let mut graph = Graph::new();
		let scope = graph.scopes.add_child(graph.scopes.root());
		graph
			.scopes
			.bind(scope, "depfile", crate::template::Template::literal("missing.d"));
		let mut edge = Edge::new(RuleKind::Phony, scope);
		edge.outs = vec![graph.find_or_create_node("a.o")];
		let edge = graph.add_edge(edge).expect("Unable to add edge");

		let err = DepfileLoader::new(&fs)
			.load_deps(&mut graph, edge)
			.expect_err("Expected error");
		assert!(matches!(err, AppError::ReadFile { .. }), "Unexpected error: {err:?}");
	}
}
