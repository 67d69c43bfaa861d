//! Variable scopes

// Imports
use {
	crate::{
		graph::RuleId,
		template::{Env, Template},
	},
	indexmap::IndexMap,
};

/// Scope id
#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug)]
pub struct ScopeId(usize);

/// Scope
#[derive(Clone, Debug)]
pub struct Scope {
	/// Parent
	pub parent: Option<ScopeId>,

	/// Variables
	pub vars: IndexMap<String, Template>,

	/// Rules
	pub rules: IndexMap<String, RuleId>,
}

/// Scope arena.
///
/// Scopes are never removed, so that templates can be evaluated after parsing.
#[derive(Clone, Debug)]
pub struct Scopes {
	/// All scopes
	scopes: Vec<Scope>,
}

impl Scopes {
	/// Creates the scope arena with just the root scope
	pub fn new() -> Self {
		Self {
			scopes: vec![Scope {
				parent: None,
				vars:   IndexMap::new(),
				rules:  IndexMap::new(),
			}],
		}
	}

	/// Returns the root scope
	pub const fn root(&self) -> ScopeId {
		ScopeId(0)
	}

	/// Adds a new child scope of `parent`
	pub fn add_child(&mut self, parent: ScopeId) -> ScopeId {
		let id = ScopeId(self.scopes.len());
		self.scopes.push(Scope {
			parent: Some(parent),
			vars:   IndexMap::new(),
			rules:  IndexMap::new(),
		});

		id
	}

	/// Returns a scope
	pub fn get(&self, scope: ScopeId) -> &Scope {
		&self.scopes[scope.0]
	}

	/// Iterates over `scope` and all of it's ancestors, inner-most first
	pub fn ancestors(&self, scope: ScopeId) -> impl Iterator<Item = &Scope> + '_ {
		std::iter::successors(Some(self.get(scope)), |scope| scope.parent.map(|parent| self.get(parent)))
	}

	/// Binds a variable in `scope`.
	///
	/// References to `name` itself within `value` refer to the binding visible
	/// *before* this one, so they're replaced by it right away.
	pub fn bind(&mut self, scope: ScopeId, name: &str, value: Template) {
		let value = match value.references(name) {
			true => {
				let prev = self.lookup_var(scope, name).cloned();
				value.inline_var(name, prev.as_ref())
			},
			false => value,
		};

		let _: Option<Template> = self.scopes[scope.0].vars.insert(name.to_owned(), value);
	}

	/// Looks up a variable, starting at `scope`
	pub fn lookup_var(&self, scope: ScopeId, name: &str) -> Option<&Template> {
		self.ancestors(scope).find_map(|scope| scope.vars.get(name))
	}

	/// Looks up a rule, starting at `scope`
	pub fn lookup_rule(&self, scope: ScopeId, name: &str) -> Option<RuleId> {
		self.ancestors(scope).find_map(|scope| scope.rules.get(name).copied())
	}

	/// Adds a rule to `scope`.
	///
	/// Returns `false` if `scope` already had a rule with the same name.
	pub fn add_rule(&mut self, scope: ScopeId, name: &str, rule: RuleId) -> bool {
		let rules = &mut self.scopes[scope.0].rules;
		match rules.contains_key(name) {
			true => false,
			false => {
				let _: Option<RuleId> = rules.insert(name.to_owned(), rule);
				true
			},
		}
	}

	/// Returns an environment for `scope`
	pub const fn env(&self, scope: ScopeId) -> ScopeEnv<'_> {
		ScopeEnv { scopes: self, scope }
	}
}

impl Default for Scopes {
	fn default() -> Self {
		Self::new()
	}
}

/// Environment of a scope
#[derive(Clone, Copy, Debug)]
pub struct ScopeEnv<'a> {
	/// Scopes
	scopes: &'a Scopes,

	/// Scope
	scope: ScopeId,
}

impl Env for ScopeEnv<'_> {
	fn lookup_var(&self, name: &str) -> Option<&Template> {
		self.scopes.lookup_var(self.scope, name)
	}
}

#[cfg(test)]
mod tests {
	use {
		super::Scopes,
		crate::{graph::RuleId, template::Template},
	};

	fn var(name: &str) -> Template {
		let mut template = Template::new();
		template.push_var(name);
		template
	}

	#[test]
	fn shadowing() {
		let mut scopes = Scopes::new();
		let root = scopes.root();
		let child = scopes.add_child(root);
		scopes.bind(root, "a", Template::literal("outer"));
		scopes.bind(root, "b", Template::literal("only-outer"));
		scopes.bind(child, "a", Template::literal("inner"));

		assert_eq!(var("a").eval(&scopes.env(child)), "inner");
		assert_eq!(var("a").eval(&scopes.env(root)), "outer");
		assert_eq!(var("b").eval(&scopes.env(child)), "only-outer");
		assert_eq!(var("unbound").eval(&scopes.env(child)), "");
	}

	#[test]
	fn self_reference_extends_previous_binding() {
		let mut scopes = Scopes::new();
		let root = scopes.root();
		let child = scopes.add_child(root);
		scopes.bind(root, "cflags", Template::literal("-Wall"));

		let mut extended = var("cflags");
		extended.push_literal(" -O2");
		scopes.bind(child, "cflags", extended.clone());
		assert_eq!(var("cflags").eval(&scopes.env(child)), "-Wall -O2");

		// Rebinding in the same scope extends the binding it replaces
		scopes.bind(child, "cflags", extended);
		assert_eq!(var("cflags").eval(&scopes.env(child)), "-Wall -O2 -O2");
		assert_eq!(var("cflags").eval(&scopes.env(root)), "-Wall");
	}

	#[test]
	fn lazy_evaluation() {
		let mut scopes = Scopes::new();
		let root = scopes.root();
		scopes.bind(root, "cmd", var("tool"));
		scopes.bind(root, "tool", Template::literal("gcc"));
		assert_eq!(var("cmd").eval(&scopes.env(root)), "gcc");
	}

	#[test]
	fn rules() {
		let mut scopes = Scopes::new();
		let root = scopes.root();
		let child = scopes.add_child(root);
		assert!(scopes.add_rule(root, "cc", RuleId(0)));
		assert!(!scopes.add_rule(root, "cc", RuleId(1)));
		assert!(scopes.add_rule(child, "cc", RuleId(2)));
		assert!(scopes.add_rule(child, "link", RuleId(3)));

		assert_eq!(scopes.lookup_rule(child, "cc"), Some(RuleId(2)));
		assert_eq!(scopes.lookup_rule(root, "cc"), Some(RuleId(0)));
		assert_eq!(scopes.lookup_rule(root, "link"), None);
	}
}
