//! Variable templates

// Imports
use {itertools::Itertools, std::fmt};

/// Template fragment
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Fragment {
	/// Literal text
	Literal(String),

	/// Variable reference
	Var(String),
}

/// Variable template.
///
/// A string with embedded variable references, evaluated lazily
/// against an [`Env`].
#[derive(PartialEq, Eq, Clone, Default, Debug)]
pub struct Template {
	/// Fragments
	frags: Vec<Fragment>,
}

impl Template {
	/// Creates an empty template
	pub const fn new() -> Self {
		Self { frags: vec![] }
	}

	/// Creates a template that's just a literal
	pub fn literal(s: impl Into<String>) -> Self {
		let mut template = Self::new();
		template.push_literal(&s.into());
		template
	}

	/// Pushes literal text onto this template
	pub fn push_literal(&mut self, s: &str) {
		if s.is_empty() {
			return;
		}

		match self.frags.last_mut() {
			Some(Fragment::Literal(last)) => last.push_str(s),
			_ => self.frags.push(Fragment::Literal(s.to_owned())),
		}
	}

	/// Pushes a variable reference onto this template
	pub fn push_var(&mut self, name: impl Into<String>) {
		self.frags.push(Fragment::Var(name.into()));
	}

	/// Returns if this template has no fragments
	pub fn is_empty(&self) -> bool {
		self.frags.is_empty()
	}

	/// Returns if this template references variable `name` directly
	pub fn references(&self, name: &str) -> bool {
		self.frags
			.iter()
			.any(|frag| matches!(frag, Fragment::Var(var) if var == name))
	}

	/// Replaces all references to `name` with the fragments of `replacement`.
	///
	/// If `replacement` is `None`, the references are removed.
	#[must_use]
	pub fn inline_var(self, name: &str, replacement: Option<&Self>) -> Self {
		let frags = self
			.frags
			.into_iter()
			.flat_map(|frag| match frag {
				Fragment::Var(var) if var == name => replacement.map_or_else(Vec::new, |replacement| replacement.frags.clone()),
				frag => vec![frag],
			})
			.coalesce(|prev, next| match (prev, next) {
				// Merge literals
				(Fragment::Literal(prev), Fragment::Literal(next)) => Ok(Fragment::Literal(prev + &next)),

				// Everything else leave
				(prev, next) => Err((prev, next)),
			})
			.collect();

		Self { frags }
	}

	/// Evaluates this template.
	///
	/// Undefined variables evaluate to the empty string.
	pub fn eval(&self, env: &impl Env) -> String {
		let mut output = String::new();
		self.eval_into(env, &mut vec![], &mut output);
		output
	}

	/// Evaluates this template into `output`.
	///
	/// `expanding` holds the names of all variables currently being expanded. A
	/// reference to any of them would never terminate, so it's expanded to nothing.
	fn eval_into<'e, E: Env>(&'e self, env: &'e E, expanding: &mut Vec<&'e str>, output: &mut String) {
		for frag in &self.frags {
			match frag {
				Fragment::Literal(s) => output.push_str(s),
				Fragment::Var(name) => {
					if expanding.contains(&name.as_str()) {
						tracing::warn!(?name, ?expanding, "Ignoring recursive variable reference");
						continue;
					}

					if let Some(value) = env.lookup_var(name) {
						expanding.push(name);
						value.eval_into(env, expanding, output);
						let _: Option<&str> = expanding.pop();
					}
				},
			}
		}
	}
}

impl fmt::Display for Template {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for frag in &self.frags {
			match frag {
				Fragment::Literal(s) => write!(f, "{}", s.replace('$', "$$"))?,
				Fragment::Var(name) => write!(f, "${{{name}}}")?,
			}
		}

		Ok(())
	}
}

/// Variable environment for [`Template::eval`]
pub trait Env {
	/// Looks up the template bound to a variable
	fn lookup_var(&self, name: &str) -> Option<&Template>;
}
