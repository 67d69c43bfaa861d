//! Build file parser

// Imports
use {
	crate::{
		error::{AppError, SyntaxError},
		fs::FileSystem,
		graph::{Edge, Graph, NodeId, Rule, RuleKind},
		lexer::{LexError, Lexer, Location, Token, TokenKind, ValueMode},
		scope::ScopeId,
		template::{Env, Template},
		util,
	},
	indexmap::IndexMap,
	itertools::Itertools,
};

/// Variables allowed within a `rule` block
const RULE_VARS: &[&str] = &[
	"command",
	"depfile",
	"deps",
	"description",
	"dyndep",
	"generator",
	"msvc_deps_prefix",
	"pool",
	"restat",
	"rspfile",
	"rspfile_content",
];

/// File currently being parsed
#[derive(Clone, Copy, Debug)]
struct File<'a> {
	/// Path
	path: &'a str,

	/// Scope
	scope: ScopeId,
}

/// Parser.
///
/// Parses build files into a [`Graph`].
#[derive(Debug)]
pub struct Parser<'a, F: ?Sized> {
	/// Graph
	graph: &'a mut Graph,

	/// File system
	fs: &'a F,
}

impl<'a, F: FileSystem + ?Sized> Parser<'a, F> {
	/// Creates a new parser
	pub fn new(graph: &'a mut Graph, fs: &'a F) -> Self {
		Self { graph, fs }
	}

	/// Loads and parses the build file at `path` into the root scope
	pub fn load(&mut self, path: &str) -> Result<(), AppError> {
		let scope = self.graph.scopes.root();
		self.parse_file(path, scope)
	}

	/// Loads and parses the build file at `path` into `scope`
	pub fn parse_file(&mut self, path: &str, scope: ScopeId) -> Result<(), AppError> {
		tracing::trace!(?path, "Parsing build file");
		let contents = self.fs.read_file(path).map_err(AppError::read_file(path))?;
		let contents = String::from_utf8_lossy(&contents);

		self.parse_str(path, &contents, scope)
	}

	/// Parses `input` into `scope`.
	///
	/// `path` is only used for diagnostics.
	pub fn parse_str(&mut self, path: &str, input: &str, scope: ScopeId) -> Result<(), AppError> {
		let mut lexer = Lexer::new(input);
		let file = File { path, scope };

		loop {
			let token = lexer.next_token().map_err(AppError::syntax(path))?;
			match token.kind {
				TokenKind::Build => self.parse_build(&mut lexer, file, token.loc)?,
				TokenKind::Rule => self.parse_rule(&mut lexer, file)?,
				TokenKind::Pool => self.parse_pool(&mut lexer, file)?,
				TokenKind::Default => self.parse_default(&mut lexer, file)?,
				TokenKind::Include => self.parse_include(&mut lexer, file, false)?,
				TokenKind::Subninja => self.parse_include(&mut lexer, file, true)?,
				TokenKind::Ident => {
					lexer.rewind();
					let (name, value) = self::parse_binding(&mut lexer).map_err(AppError::syntax(path))?;
					self.graph.scopes.bind(scope, name, value);
				},
				TokenKind::Newline => (),
				TokenKind::Eof => break,
				TokenKind::Indent => return Err(self::error_at(file, token.loc, SyntaxError::UnexpectedIndent)),
				found @ (TokenKind::Colon |
				TokenKind::Equals |
				TokenKind::Pipe |
				TokenKind::Pipe2 |
				TokenKind::PipeAt) => {
					return Err(self::error_at(file, token.loc, SyntaxError::UnexpectedToken {
						expected: "statement",
						found,
					}))
				},
			}
		}

		Ok(())
	}

	/// Parses a `rule` statement
	fn parse_rule(&mut self, lexer: &mut Lexer<'_>, file: File<'_>) -> Result<(), AppError> {
		lexer.skip_spaces();
		let loc = lexer.loc();
		let name = lexer.read_ident().map_err(AppError::syntax(file.path))?;
		self::expect_line_end(lexer).map_err(AppError::syntax(file.path))?;

		if name == "phony" || self.graph.scopes.get(file.scope).rules.contains_key(name) {
			return Err(self::error_at(file, loc, SyntaxError::DuplicateRule { name: name.to_owned() }));
		}

		let mut vars = IndexMap::new();
		while lexer.peek_token(TokenKind::Indent).map_err(AppError::syntax(file.path))?.is_some() {
			let var_loc = lexer.loc();
			let (var, value) = self::parse_binding(lexer).map_err(AppError::syntax(file.path))?;
			if !RULE_VARS.contains(&var) {
				return Err(self::error_at(file, var_loc, SyntaxError::UnexpectedVariable {
					name: var.to_owned(),
				}));
			}

			let _: Option<Template> = vars.insert(var.to_owned(), value);
		}

		if !vars.contains_key("command") {
			return Err(self::error_at(file, loc, SyntaxError::MissingCommand { name: name.to_owned() }));
		}

		let rule = self.graph.add_rule(Rule {
			name: name.to_owned(),
			vars,
		});
		let added = self.graph.scopes.add_rule(file.scope, name, rule);
		debug_assert!(added, "Rule was added twice");

		Ok(())
	}

	/// Parses a `pool` statement
	fn parse_pool(&mut self, lexer: &mut Lexer<'_>, file: File<'_>) -> Result<(), AppError> {
		lexer.skip_spaces();
		let loc = lexer.loc();
		let name = lexer.read_ident().map_err(AppError::syntax(file.path))?;
		self::expect_line_end(lexer).map_err(AppError::syntax(file.path))?;

		if self.graph.lookup_pool(name).is_some() {
			return Err(self::error_at(file, loc, SyntaxError::DuplicatePool { name: name.to_owned() }));
		}

		let mut depth = None;
		while lexer.peek_token(TokenKind::Indent).map_err(AppError::syntax(file.path))?.is_some() {
			let var_loc = lexer.loc();
			let (var, value) = self::parse_binding(lexer).map_err(AppError::syntax(file.path))?;
			if var != "depth" {
				return Err(self::error_at(file, var_loc, SyntaxError::UnexpectedVariable {
					name: var.to_owned(),
				}));
			}

			let value = value.eval(&self.graph.scopes.env(file.scope));
			match value.trim().parse::<usize>() {
				Ok(value) => depth = Some(value),
				Err(_) => return Err(self::error_at(file, var_loc, SyntaxError::InvalidPoolDepth { value })),
			}
		}

		let Some(depth) = depth else {
			return Err(self::error_at(file, loc, SyntaxError::MissingPoolDepth { name: name.to_owned() }));
		};

		let _: Option<_> = self.graph.add_pool(name, depth);
		Ok(())
	}

	/// Parses a `build` statement
	fn parse_build(&mut self, lexer: &mut Lexer<'_>, file: File<'_>, loc: Location) -> Result<(), AppError> {
		let mut outs = self::read_paths(lexer).map_err(AppError::syntax(file.path))?;
		if outs.is_empty() {
			return Err(self::error_at(file, lexer.loc(), SyntaxError::MissingOutputs));
		}
		let implicit_outs = self::read_paths_after(lexer, TokenKind::Pipe).map_err(AppError::syntax(file.path))?;
		let implicit_outs_len = implicit_outs.len();
		outs.extend(implicit_outs);

		let _: Token<'_> = lexer.expect_token(TokenKind::Colon, "':'").map_err(AppError::syntax(file.path))?;
		lexer.skip_spaces();
		let rule_loc = lexer.loc();
		let rule_name = lexer.read_ident().map_err(AppError::syntax(file.path))?;

		let mut ins = self::read_paths(lexer).map_err(AppError::syntax(file.path))?;
		let implicit_deps = self::read_paths_after(lexer, TokenKind::Pipe).map_err(AppError::syntax(file.path))?;
		let implicit_deps_len = implicit_deps.len();
		ins.extend(implicit_deps);
		let order_only_deps = self::read_paths_after(lexer, TokenKind::Pipe2).map_err(AppError::syntax(file.path))?;
		let order_only_deps_len = order_only_deps.len();
		ins.extend(order_only_deps);
		let validations = self::read_paths_after(lexer, TokenKind::PipeAt).map_err(AppError::syntax(file.path))?;

		self::expect_line_end(lexer).map_err(AppError::syntax(file.path))?;

		let rule = match rule_name {
			"phony" => RuleKind::Phony,
			_ => match self.graph.scopes.lookup_rule(file.scope, rule_name) {
				Some(rule) => RuleKind::Custom(rule),
				None => {
					return Err(self::error_at(file, rule_loc, SyntaxError::UnknownRule {
						name: rule_name.to_owned(),
					}))
				},
			},
		};

		let scope = self.graph.scopes.add_child(file.scope);
		while lexer.peek_token(TokenKind::Indent).map_err(AppError::syntax(file.path))?.is_some() {
			let (name, value) = self::parse_binding(lexer).map_err(AppError::syntax(file.path))?;
			self.graph.scopes.bind(scope, name, value);
		}

		let mut edge = Edge::new(rule, scope);
		edge.implicit_outs = implicit_outs_len;
		edge.implicit_deps = implicit_deps_len;
		edge.order_only_deps = order_only_deps_len;
		edge.outs = self.resolve_paths(file, scope, outs)?;
		edge.ins = self.resolve_paths(file, scope, ins)?;
		edge.validations = self.resolve_paths(file, scope, validations)?;

		let mut in_paths = edge.explicit_ins().iter().map(|&node| &self.graph.node(node).path);
		let mut out_paths = edge.explicit_outs().iter().map(|&node| &self.graph.node(node).path);
		let in_var = Template::literal(in_paths.clone().join(" "));
		let in_newline_var = Template::literal(in_paths.join("\n"));
		let out_var = Template::literal(out_paths.join(" "));
		self.graph.scopes.bind(scope, "in", in_var);
		self.graph.scopes.bind(scope, "in_newline", in_newline_var);
		self.graph.scopes.bind(scope, "out", out_var);

		let edge = self.graph.add_edge(edge).map_err(|out| {
			self::error_at(file, loc, SyntaxError::MultipleProducers {
				path: self.graph.node(out).path.clone(),
			})
		})?;

		let pool_name = self.graph.edge_var(edge, "pool");
		if !pool_name.is_empty() {
			let Some(pool) = self.graph.lookup_pool(&pool_name) else {
				return Err(self::error_at(file, loc, SyntaxError::UnknownPool { name: pool_name }));
			};
			self.graph.edge_mut(edge).pool = Some(pool);
		}

		Ok(())
	}

	/// Parses a `default` statement
	fn parse_default(&mut self, lexer: &mut Lexer<'_>, file: File<'_>) -> Result<(), AppError> {
		let paths = self::read_paths(lexer).map_err(AppError::syntax(file.path))?;
		if paths.is_empty() {
			return Err(self::error_at(file, lexer.loc(), SyntaxError::ExpectedTarget));
		}
		self::expect_line_end(lexer).map_err(AppError::syntax(file.path))?;

		for node in self.resolve_paths(file, file.scope, paths)? {
			self.graph.add_default(node);
		}

		Ok(())
	}

	/// Parses an `include` or `subninja` statement
	fn parse_include(&mut self, lexer: &mut Lexer<'_>, file: File<'_>, new_scope: bool) -> Result<(), AppError> {
		lexer.skip_spaces();
		let loc = lexer.loc();
		let path = lexer
			.read_value(ValueMode::Line)
			.map_err(AppError::syntax(file.path))?;
		let path = path.eval(&self.graph.scopes.env(file.scope));
		if path.is_empty() {
			return Err(self::error_at(file, loc, SyntaxError::EmptyPath));
		}
		let path = util::canonicalize_path(&path);

		let scope = match new_scope {
			true => self.graph.scopes.add_child(file.scope),
			false => file.scope,
		};

		self.parse_file(&path, scope)
	}

	/// Evaluates and canonicalizes paths, creating their nodes
	fn resolve_paths(
		&mut self,
		file: File<'_>,
		scope: ScopeId,
		paths: Vec<(Location, Template)>,
	) -> Result<Vec<NodeId>, AppError> {
		paths
			.into_iter()
			.map(|(loc, path)| {
				let path = path.eval(&self.graph.scopes.env(scope));
				if path.is_empty() {
					return Err(self::error_at(file, loc, SyntaxError::EmptyPath));
				}

				let path = util::canonicalize_path(&path);
				Ok(self.graph.find_or_create_node(&path))
			})
			.collect()
	}
}

/// Parses a `name = value` binding
fn parse_binding<'a>(lexer: &mut Lexer<'a>) -> Result<(&'a str, Template), LexError> {
	let name = lexer.read_ident()?;
	let _: Token<'_> = lexer.expect_token(TokenKind::Equals, "'='")?;
	let value = lexer.read_value(ValueMode::Line)?;

	Ok((name, value))
}

/// Reads paths until an empty one
fn read_paths(lexer: &mut Lexer<'_>) -> Result<Vec<(Location, Template)>, LexError> {
	let mut paths = vec![];
	loop {
		lexer.skip_spaces();
		let loc = lexer.loc();
		let path = lexer.read_value(ValueMode::Path)?;
		if path.is_empty() {
			break Ok(paths);
		}

		paths.push((loc, path));
	}
}

/// Reads paths if the next token is `separator`
fn read_paths_after(lexer: &mut Lexer<'_>, separator: TokenKind) -> Result<Vec<(Location, Template)>, LexError> {
	match lexer.peek_token(separator)? {
		Some(_) => self::read_paths(lexer),
		None => Ok(vec![]),
	}
}

/// Expects the end of a line (or file)
fn expect_line_end(lexer: &mut Lexer<'_>) -> Result<(), LexError> {
	let token = lexer.next_token()?;
	match token.kind {
		TokenKind::Newline | TokenKind::Eof => Ok(()),
		found => Err(LexError {
			loc:  token.loc,
			kind: SyntaxError::UnexpectedToken {
				expected: "newline",
				found,
			},
		}),
	}
}

/// Creates a syntax error in `file` at `loc`
fn error_at(file: File<'_>, loc: Location, kind: SyntaxError) -> AppError {
	AppError::syntax(file.path)(LexError { loc, kind })
}

#[cfg(test)]
mod tests {
	use {
		super::Parser,
		crate::{
			error::{AppError, SyntaxError},
			fs::MemoryFileSystem,
			graph::{Graph, RuleKind},
		},
	};

	/// Parses `input` as `build.ninja`
	fn parse_with(fs: &MemoryFileSystem, input: &str) -> Result<Graph, AppError> {
		fs.write("build.ninja", 0, input);
		let mut graph = Graph::new();
		Parser::new(&mut graph, fs).load("build.ninja")?;
		Ok(graph)
	}

	fn parse(input: &str) -> Graph {
		parse_with(&MemoryFileSystem::new(), input).expect("Unable to parse")
	}

	fn parse_err(input: &str) -> (usize, usize, SyntaxError) {
		match parse_with(&MemoryFileSystem::new(), input) {
			Err(AppError::Syntax { line, column, kind, .. }) => (line, column, kind),
			Err(err) => panic!("Expected syntax error, found {err:?}"),
			Ok(_) => panic!("Expected syntax error"),
		}
	}

	/// Returns the command of the edge producing `path`
	fn command(graph: &Graph, path: &str) -> String {
		let node = graph.lookup_node(path).expect("Missing node");
		let edge = graph.node(node).in_edge.expect("Node has no producer");
		graph.edge_command(edge).to_owned()
	}

	#[test]
	fn build_statement() {
		let graph = parse(
			"rule cc\n  command = cc $in -o $out\n\nbuild a.o | a.d: cc a.c | a.h || gen |@ check\n",
		);

		let node = graph.lookup_node("a.o").expect("Missing node");
		let edge = graph.node(node).in_edge.expect("Node has no producer");
		let edge_ref = graph.edge(edge);
		let paths = |nodes: &[_]| nodes.iter().map(|&node| graph.node(node).path.clone()).collect::<Vec<_>>();

		assert_eq!(paths(&edge_ref.outs), ["a.o", "a.d"]);
		assert_eq!(edge_ref.implicit_outs, 1);
		assert_eq!(paths(&edge_ref.ins), ["a.c", "a.h", "gen"]);
		assert_eq!((edge_ref.implicit_deps, edge_ref.order_only_deps), (1, 1));
		assert_eq!(paths(&edge_ref.validations), ["check"]);
		assert_eq!(graph.edge_command(edge), "cc a.c -o a.o");

		let check = graph.lookup_node("check").expect("Missing node");
		assert_eq!(graph.node(check).validation_out_edges.as_slice(), [edge]);
		let source = graph.lookup_node("a.c").expect("Missing node");
		assert_eq!(graph.node(source).out_edges.as_slice(), [edge]);
	}

	#[test]
	fn variable_lookup_order() {
		let graph = parse(
			"flags = -top\nname = top\nrule cc\n  command = cc $flags $name $extra\nbuild a: cc b\n  flags = \
			 -edge\nextra = late\n",
		);

		// Statement bindings shadow the rule's, which shadow the file's. File bindings are looked up lazily.
		assert_eq!(command(&graph, "a"), "cc -edge top late");
	}

	#[test]
	fn rule_sees_statement_bindings() {
		let graph = parse("rule cc\n  command = cc $cflags $in\n  description = CC $out\nbuild a: cc b c\n  cflags = -O2\n");
		let node = graph.lookup_node("a").expect("Missing node");
		let edge = graph.node(node).in_edge.expect("Node has no producer");
		assert_eq!(graph.edge_command(edge), "cc -O2 b c");
		assert_eq!(graph.edge_var(edge, "description"), "CC a");
	}

	#[test]
	fn self_referencing_binding() {
		let graph = parse("cflags = -Wall\ncflags = $cflags -O2\nrule cc\n  command = cc $cflags\nbuild a: cc\n");
		assert_eq!(command(&graph, "a"), "cc -Wall -O2");
	}

	#[test]
	fn paths_are_canonicalized() {
		let graph = parse("rule cc\n  command = x\nbuild ./out/../a.o: cc src//a.c\ndefault ./a.o\n");
		let node = graph.lookup_node("a.o").expect("Missing node");
		assert!(graph.lookup_node("src/a.c").is_some());
		assert_eq!(graph.defaults(), [node]);
	}

	#[test]
	fn pools() {
		let graph = parse("pool link\n  depth = 2\nrule ld\n  command = ld\n  pool = link\nbuild a: ld\nbuild b: ld\n  pool = console\nbuild c: phony\n");
		let pool_of = |path: &str| {
			let node = graph.lookup_node(path).expect("Missing node");
			let edge = graph.node(node).in_edge.expect("Node has no producer");
			graph.edge(edge).pool.map(|pool| (graph.pool(pool).name.clone(), graph.pool(pool).depth))
		};

		assert_eq!(pool_of("a"), Some(("link".to_owned(), 2)));
		assert_eq!(pool_of("b"), Some(("console".to_owned(), 1)));
		assert_eq!(pool_of("c"), None);
	}

	#[test]
	fn include_and_subninja_scoping() {
		let fs = MemoryFileSystem::new();
		fs.write("inc.ninja", 0, "shared = from-include\nrule inc_rule\n  command = inc\n");
		fs.write(
			"sub/build.ninja",
			0,
			"shared = from-subninja\nrule sub_rule\n  command = sub $shared $top\nbuild sub_out: sub_rule\n",
		);

		let graph = parse_with(
			&fs,
			"top = parent\ninclude inc.ninja\nsubninja sub/build.ninja\nrule cc\n  command = cc $shared\nbuild a: \
			 cc\nbuild b: inc_rule\n",
		)
		.expect("Unable to parse");

		assert_eq!(command(&graph, "a"), "cc from-include");
		assert_eq!(command(&graph, "b"), "inc");
		assert_eq!(command(&graph, "sub_out"), "sub from-subninja parent");
	}

	#[test]
	fn subninja_rules_do_not_leak() {
		let fs = MemoryFileSystem::new();
		fs.write("sub.ninja", 0, "rule sub_rule\n  command = sub\n");

		let err = parse_with(&fs, "subninja sub.ninja\nbuild a: sub_rule\n").expect_err("Expected error");
		assert!(
			matches!(err, AppError::Syntax { kind: SyntaxError::UnknownRule { ref name }, .. } if name == "sub_rule"),
			"Unexpected error: {err:?}"
		);
	}

	#[test]
	fn missing_include() {
		let err = parse_with(&MemoryFileSystem::new(), "include missing.ninja\n").expect_err("Expected error");
		assert!(matches!(err, AppError::ReadFile { .. }), "Unexpected error: {err:?}");
	}

	#[test]
	fn no_trailing_newline() {
		let graph = parse("rule cc\n  command = cc\nbuild a: cc b");
		assert_eq!(command(&graph, "a"), "cc");
	}

	#[test]
	fn phony_rule() {
		let graph = parse("build all: phony a b\n");
		let node = graph.lookup_node("all").expect("Missing node");
		let edge = graph.node(node).in_edge.expect("Node has no producer");
		assert_eq!(graph.edge(edge).rule, RuleKind::Phony);
		assert_eq!(graph.edge_command(edge), "");
	}

	#[test]
	fn errors() {
		let tests = [
			("build a: missing b\n", 1, 10, SyntaxError::UnknownRule {
				name: "missing".to_owned(),
			}),
			("rule cc\n  command = x\nbuild a b\n", 3, 10, SyntaxError::UnexpectedToken {
				expected: "':'",
				found:    crate::lexer::TokenKind::Newline,
			}),
			("  a = b\n", 1, 1, SyntaxError::UnexpectedIndent),
			("rule cc\n  description = x\n", 1, 6, SyntaxError::MissingCommand { name: "cc".to_owned() }),
			("rule cc\n  command = x\n  bogus = y\n", 3, 3, SyntaxError::UnexpectedVariable {
				name: "bogus".to_owned(),
			}),
			("rule cc\n  command = x\nrule cc\n  command = y\n", 3, 6, SyntaxError::DuplicateRule {
				name: "cc".to_owned(),
			}),
			("rule phony\n  command = x\n", 1, 6, SyntaxError::DuplicateRule {
				name: "phony".to_owned(),
			}),
			("rule cc\n  command = x\nbuild a: cc\nbuild a: cc\n", 4, 1, SyntaxError::MultipleProducers {
				path: "a".to_owned(),
			}),
			("build a: phony\n  pool = nope\n", 1, 1, SyntaxError::UnknownPool {
				name: "nope".to_owned(),
			}),
			("pool p\n", 1, 6, SyntaxError::MissingPoolDepth { name: "p".to_owned() }),
			("pool p\n  depth = x\n", 2, 3, SyntaxError::InvalidPoolDepth { value: "x".to_owned() }),
			("pool console\n  depth = 2\n", 1, 6, SyntaxError::DuplicatePool {
				name: "console".to_owned(),
			}),
			("build $empty: phony\n", 1, 7, SyntaxError::EmptyPath),
			("default\n", 1, 8, SyntaxError::ExpectedTarget),
			("a = $%\n", 1, 5, SyntaxError::BadEscape),
		];

		for (input, line, column, kind) in tests {
			assert_eq!(parse_err(input), (line, column, kind), "Parsing {input:?}");
		}
	}

	#[test]
	fn error_display() {
		let err = parse_with(&MemoryFileSystem::new(), "build a: missing\n").expect_err("Expected error");
		assert_eq!(err.to_string(), "build.ninja:1:10: Unknown build rule \"missing\"");
	}
}
