//! Build file lexer

// Imports
use {
	crate::{error::SyntaxError, template::Template},
	std::fmt,
};

/// Token kind
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum TokenKind {
	/// `build`
	Build,

	/// `rule`
	Rule,

	/// `pool`
	Pool,

	/// `default`
	Default,

	/// `include`
	Include,

	/// `subninja`
	Subninja,

	/// Identifier
	Ident,

	/// `:`
	Colon,

	/// `=`
	Equals,

	/// `|`
	Pipe,

	/// `||`
	Pipe2,

	/// `|@`
	PipeAt,

	/// Indentation at the start of a line
	Indent,

	/// End of line
	Newline,

	/// End of file
	Eof,
}

impl TokenKind {
	/// Returns the keyword token for `ident`, if it's a keyword
	fn keyword(ident: &str) -> Option<Self> {
		let kind = match ident {
			"build" => Self::Build,
			"rule" => Self::Rule,
			"pool" => Self::Pool,
			"default" => Self::Default,
			"include" => Self::Include,
			"subninja" => Self::Subninja,
			_ => return None,
		};

		Some(kind)
	}
}

impl fmt::Display for TokenKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Build => "'build'",
			Self::Rule => "'rule'",
			Self::Pool => "'pool'",
			Self::Default => "'default'",
			Self::Include => "'include'",
			Self::Subninja => "'subninja'",
			Self::Ident => "identifier",
			Self::Colon => "':'",
			Self::Equals => "'='",
			Self::Pipe => "'|'",
			Self::Pipe2 => "'||'",
			Self::PipeAt => "'|@'",
			Self::Indent => "indent",
			Self::Newline => "newline",
			Self::Eof => "end of file",
		};

		f.write_str(s)
	}
}

/// Location within a file
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Location {
	/// Line (1-based)
	pub line: usize,

	/// Column (1-based)
	pub column: usize,
}

/// Token
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Token<'a> {
	/// Kind
	pub kind: TokenKind,

	/// Location
	pub loc: Location,

	/// Text
	pub text: &'a str,
}

/// Syntax error with a location
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct LexError {
	/// Location
	pub loc: Location,

	/// Kind
	pub kind: SyntaxError,
}

/// Value reading mode
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ValueMode {
	/// A path, ending at whitespace, `:`, `|` or the end of the line
	Path,

	/// The rest of the line
	Line,
}

/// Lexer state
#[derive(Clone, Copy, Debug)]
struct State {
	/// Byte position
	pos: usize,

	/// Current line (1-based)
	line: usize,

	/// Byte position of the start of the current line
	line_start: usize,

	/// If we're at the start of a line
	at_line_start: bool,
}

/// Lexer
#[derive(Debug)]
pub struct Lexer<'a> {
	/// Input
	input: &'a str,

	/// Current state
	state: State,

	/// State before the last token
	last_state: State,
}

impl<'a> Lexer<'a> {
	/// Creates a new lexer
	pub const fn new(input: &'a str) -> Self {
		let state = State {
			pos:           0,
			line:          1,
			line_start:    0,
			at_line_start: true,
		};

		Self {
			input,
			state,
			last_state: state,
		}
	}

	/// Returns the current location
	pub const fn loc(&self) -> Location {
		Location {
			line:   self.state.line,
			column: self.state.pos - self.state.line_start + 1,
		}
	}

	/// Returns an error at the current location
	pub const fn error(&self, kind: SyntaxError) -> LexError {
		LexError { loc: self.loc(), kind }
	}

	/// Reads the next token
	pub fn next_token(&mut self) -> Result<Token<'a>, LexError> {
		self.last_state = self.state;

		loop {
			if self.state.at_line_start {
				let indent_start = self.state.pos;
				self.skip_while(|ch| ch == b' ');
				let indent_loc = Location {
					line:   self.state.line,
					column: indent_start - self.state.line_start + 1,
				};

				match self.peek_byte() {
					// Note: Comment lines are skipped entirely, even when indented
					Some(b'#') => {
						self.skip_while(|ch| !matches!(ch, b'\n' | b'\r'));
						let _: bool = self.eat_newline();
						continue;
					},
					Some(b'\n' | b'\r') => {
						let loc = self.loc();
						let _: bool = self.eat_newline();
						return Ok(self.token(TokenKind::Newline, loc, ""));
					},
					None => return Ok(self.token(TokenKind::Eof, self.loc(), "")),
					Some(_) => {
						self.state.at_line_start = false;
						if self.state.pos != indent_start {
							let text = &self.input[indent_start..self.state.pos];
							return Ok(self.token(TokenKind::Indent, indent_loc, text));
						}
					},
				}
			}

			self.skip_while(|ch| ch == b' ');
			let loc = self.loc();
			let start = self.state.pos;
			let Some(ch) = self.peek_byte() else {
				return Ok(self.token(TokenKind::Eof, loc, ""));
			};

			let kind = match ch {
				b'\n' | b'\r' => {
					let _: bool = self.eat_newline();
					return Ok(self.token(TokenKind::Newline, loc, ""));
				},
				b'#' => {
					self.skip_while(|ch| !matches!(ch, b'\n' | b'\r'));
					continue;
				},
				b':' => {
					self.state.pos += 1;
					TokenKind::Colon
				},
				b'=' => {
					self.state.pos += 1;
					TokenKind::Equals
				},
				b'|' => {
					self.state.pos += 1;
					match self.peek_byte() {
						Some(b'|') => {
							self.state.pos += 1;
							TokenKind::Pipe2
						},
						Some(b'@') => {
							self.state.pos += 1;
							TokenKind::PipeAt
						},
						_ => TokenKind::Pipe,
					}
				},
				ch if self::is_ident_char(ch) => {
					self.skip_while(self::is_ident_char);
					TokenKind::keyword(&self.input[start..self.state.pos]).unwrap_or(TokenKind::Ident)
				},
				_ => {
					let ch = self.input[start..].chars().next().unwrap_or_default();
					return Err(self.error(SyntaxError::UnexpectedChar { ch }));
				},
			};

			return Ok(self.token(kind, loc, &self.input[start..self.state.pos]));
		}
	}

	/// Reads the next token if it's of kind `kind`.
	///
	/// Otherwise, leaves the lexer unchanged and returns `None`.
	pub fn peek_token(&mut self, kind: TokenKind) -> Result<Option<Token<'a>>, LexError> {
		let prev_state = self.state;
		let prev_last_state = self.last_state;

		let token = self.next_token()?;
		match token.kind == kind {
			true => Ok(Some(token)),
			false => {
				self.state = prev_state;
				self.last_state = prev_last_state;
				Ok(None)
			},
		}
	}

	/// Reads the next token, expecting it to be of kind `kind`
	pub fn expect_token(&mut self, kind: TokenKind, expected: &'static str) -> Result<Token<'a>, LexError> {
		let token = self.next_token()?;
		match token.kind == kind {
			true => Ok(token),
			false => Err(LexError {
				loc:  token.loc,
				kind: SyntaxError::UnexpectedToken {
					expected,
					found: token.kind,
				},
			}),
		}
	}

	/// Un-reads the last token read by [`Self::next_token`]
	pub fn rewind(&mut self) {
		self.state = self.last_state;
	}

	/// Skips spaces within a line
	pub fn skip_spaces(&mut self) {
		self.state.at_line_start = false;
		self.skip_while(|ch| ch == b' ');
	}

	/// Reads an identifier
	pub fn read_ident(&mut self) -> Result<&'a str, LexError> {
		self.state.at_line_start = false;
		self.skip_while(|ch| ch == b' ');

		let start = self.state.pos;
		self.skip_while(self::is_ident_char);
		match start == self.state.pos {
			true => Err(self.error(SyntaxError::ExpectedIdent)),
			false => Ok(&self.input[start..self.state.pos]),
		}
	}

	/// Reads a value.
	///
	/// In [`ValueMode::Path`], the value ends (without consuming) at a space,
	/// `:`, `|` or the end of the line. In [`ValueMode::Line`], it ends at the
	/// end of the line, consuming it.
	pub fn read_value(&mut self, mode: ValueMode) -> Result<Template, LexError> {
		self.state.at_line_start = false;
		self.skip_while(|ch| ch == b' ');

		let mut template = Template::new();
		let mut run_start = self.state.pos;
		loop {
			let Some(ch) = self.peek_byte() else {
				template.push_literal(&self.input[run_start..self.state.pos]);
				break;
			};

			match (ch, mode) {
				(b'\n' | b'\r', _) | (b' ' | b':' | b'|', ValueMode::Path) => {
					template.push_literal(&self.input[run_start..self.state.pos]);
					if mode == ValueMode::Line {
						let _: bool = self.eat_newline();
					}
					break;
				},
				(b'$', _) => {
					template.push_literal(&self.input[run_start..self.state.pos]);
					self.read_escape(&mut template)?;
					run_start = self.state.pos;
				},
				_ => self.state.pos += 1,
			}
		}

		Ok(template)
	}

	/// Reads a `$`-escape into `template`
	fn read_escape(&mut self, template: &mut Template) -> Result<(), LexError> {
		let dollar_loc = self.loc();
		self.state.pos += 1;

		match self.peek_byte() {
			Some(ch @ (b'$' | b' ' | b':')) => {
				self.state.pos += 1;
				template.push_literal(match ch {
					b'$' => "$",
					b' ' => " ",
					_ => ":",
				});
			},
			Some(b'\n' | b'\r') => {
				let _: bool = self.eat_newline();
				self.state.at_line_start = false;
				self.skip_while(|ch| matches!(ch, b' ' | b'\t'));
			},
			Some(b'{') => {
				self.state.pos += 1;
				let start = self.state.pos;
				self.skip_while(self::is_ident_char);
				let name = &self.input[start..self.state.pos];

				match self.peek_byte() {
					Some(b'}') if !name.is_empty() => {
						self.state.pos += 1;
						template.push_var(name);
					},
					Some(b'}') => {
						return Err(LexError {
							loc:  dollar_loc,
							kind: SyntaxError::BadEscape,
						})
					},
					_ => return Err(self.error(SyntaxError::UnterminatedBrace)),
				}
			},
			Some(ch) if self::is_simple_var_char(ch) => {
				let start = self.state.pos;
				self.skip_while(self::is_simple_var_char);
				template.push_var(&self.input[start..self.state.pos]);
			},
			_ => {
				return Err(LexError {
					loc:  dollar_loc,
					kind: SyntaxError::BadEscape,
				})
			},
		}

		Ok(())
	}

	/// Creates a token
	const fn token(&self, kind: TokenKind, loc: Location, text: &'a str) -> Token<'a> {
		Token { kind, loc, text }
	}

	/// Returns the next byte
	fn peek_byte(&self) -> Option<u8> {
		self.input.as_bytes().get(self.state.pos).copied()
	}

	/// Skips all bytes matching `f`
	fn skip_while(&mut self, mut f: impl FnMut(u8) -> bool) {
		while self.peek_byte().is_some_and(&mut f) {
			self.state.pos += 1;
		}
	}

	/// Consumes a newline (`\n`, `\r\n` or `\r`), if any.
	///
	/// Returns if a newline was consumed.
	fn eat_newline(&mut self) -> bool {
		match self.peek_byte() {
			Some(b'\n') => self.state.pos += 1,
			Some(b'\r') => {
				self.state.pos += 1;
				if self.peek_byte() == Some(b'\n') {
					self.state.pos += 1;
				}
			},
			_ => return false,
		}

		self.state.line += 1;
		self.state.line_start = self.state.pos;
		self.state.at_line_start = true;
		true
	}
}

/// Returns if `ch` may appear in an identifier
const fn is_ident_char(ch: u8) -> bool {
	ch.is_ascii_alphanumeric() || matches!(ch, b'_' | b'.' | b'-')
}

/// Returns if `ch` may appear in an unbraced variable reference
const fn is_simple_var_char(ch: u8) -> bool {
	ch.is_ascii_alphanumeric() || matches!(ch, b'_' | b'-')
}
