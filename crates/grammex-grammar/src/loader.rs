//! Loader for the textual grammar description format.
//!
//! ```text
//! grammar CSS;
//! precedence 2;
//! skip /\s+/;
//! token CLASS = /\.[A-Za-z_][\w-]*/ : identifier;
//! define selector as selector export;
//! stylesheet : rule* ;
//! rule : selector "{" declaration* "}" ;
//! ```
//!
//! Statements end with `;`. An identifier followed by `:` always starts a
//! rule, so rules may be named like keywords. `//` starts a line comment.

use crate::error::GrammarError;
use crate::model::{
    Embedding, Expr, Grammar, Production, SymbolDefinition, SymbolReference, SymbolScope,
    SyncTerminal, TerminalKind, TokenDef, TokenPattern,
};
use std::path::Path;
use tracing::debug;

/// Parse a grammar description held in memory.
pub fn load_grammar(source: &str) -> Result<Grammar, GrammarError> {
    let tokens = tokenize(source)?;
    let grammar = DescParser {
        tokens,
        pos: 0,
        grammar: None,
    }
    .parse()?;
    debug!(
        grammar = %grammar.name,
        rules = grammar.productions.len(),
        tokens = grammar.tokens.len(),
        embeddings = grammar.embeddings.len(),
        "grammar loaded"
    );
    Ok(grammar)
}

/// Read and parse a grammar description file.
pub fn load_grammar_file(path: impl AsRef<Path>) -> Result<Grammar, GrammarError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|source| GrammarError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_grammar(&source)
}

// =============================================================================
// Tokens
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Str(String),
    Regex(String),
    Number(u32),
    Punct(char),
    End,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(name) => format!("identifier '{name}'"),
            Tok::Str(text) => format!("string {text:?}"),
            Tok::Regex(re) => format!("pattern /{re}/"),
            Tok::Number(n) => format!("number {n}"),
            Tok::Punct(c) => format!("'{c}'"),
            Tok::End => "end of input".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
struct Spanned {
    tok: Tok,
    line: u32,
    column: u32,
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
}

impl Cursor<'_> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> GrammarError {
        GrammarError::syntax(self.line, self.column, message)
    }
}

fn tokenize(source: &str) -> Result<Vec<Spanned>, GrammarError> {
    let mut cur = Cursor {
        chars: source.chars().peekable(),
        line: 1,
        column: 1,
    };
    let mut out = Vec::new();

    loop {
        // Trivia: whitespace and `//` comments.
        while let Some(c) = cur.peek() {
            if c.is_whitespace() {
                cur.bump();
            } else if c == '/' && source_at_comment(&cur) {
                while let Some(c) = cur.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }

        let (line, column) = (cur.line, cur.column);
        let Some(c) = cur.peek() else {
            out.push(Spanned {
                tok: Tok::End,
                line,
                column,
            });
            return Ok(out);
        };

        let tok = if c.is_alphabetic() || c == '_' {
            let mut name = String::new();
            while let Some(c) = cur.peek() {
                if c.is_alphanumeric() || c == '_' || c == '-' {
                    name.push(c);
                    cur.bump();
                } else {
                    break;
                }
            }
            Tok::Ident(name)
        } else if c.is_ascii_digit() {
            let mut digits = String::new();
            while let Some(c) = cur.peek().filter(char::is_ascii_digit) {
                digits.push(c);
                cur.bump();
            }
            let value = digits
                .parse::<u32>()
                .map_err(|_| GrammarError::syntax(line, column, "number out of range"))?;
            Tok::Number(value)
        } else if c == '"' || c == '\'' {
            cur.bump();
            Tok::Str(read_string(&mut cur, c, line, column)?)
        } else if c == '/' {
            cur.bump();
            Tok::Regex(read_regex(&mut cur, line, column)?)
        } else if ";:|()*+?,=@".contains(c) {
            cur.bump();
            Tok::Punct(c)
        } else {
            return Err(cur.error(format!("unexpected character '{c}'")));
        };
        out.push(Spanned { tok, line, column });
    }
}

fn source_at_comment(cur: &Cursor<'_>) -> bool {
    let mut ahead = cur.chars.clone();
    ahead.next() == Some('/') && ahead.next() == Some('/')
}

fn read_string(
    cur: &mut Cursor<'_>,
    quote: char,
    line: u32,
    column: u32,
) -> Result<String, GrammarError> {
    let mut text = String::new();
    loop {
        match cur.bump() {
            None | Some('\n') => {
                return Err(GrammarError::syntax(line, column, "unterminated string"));
            }
            Some('\\') => match cur.bump() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some('r') => text.push('\r'),
                Some(c) => text.push(c),
                None => {
                    return Err(GrammarError::syntax(line, column, "unterminated string"));
                }
            },
            Some(c) if c == quote => return Ok(text),
            Some(c) => text.push(c),
        }
    }
}

/// Read `/.../`. Only `\/` is unescaped; every other escape is kept for the
/// regex engine.
fn read_regex(cur: &mut Cursor<'_>, line: u32, column: u32) -> Result<String, GrammarError> {
    let mut pattern = String::new();
    loop {
        match cur.bump() {
            None | Some('\n') => {
                return Err(GrammarError::syntax(line, column, "unterminated pattern"));
            }
            Some('\\') => match cur.bump() {
                Some('/') => pattern.push('/'),
                Some(c) => {
                    pattern.push('\\');
                    pattern.push(c);
                }
                None => {
                    return Err(GrammarError::syntax(line, column, "unterminated pattern"));
                }
            },
            Some('/') => {
                if pattern.is_empty() {
                    return Err(GrammarError::syntax(line, column, "empty pattern"));
                }
                return Ok(pattern);
            }
            Some(c) => pattern.push(c),
        }
    }
}

// =============================================================================
// Statements
// =============================================================================

struct DescParser {
    tokens: Vec<Spanned>,
    pos: usize,
    grammar: Option<Grammar>,
}

impl DescParser {
    fn parse(mut self) -> Result<Grammar, GrammarError> {
        while !self.at_end() {
            self.statement()?;
        }
        self.grammar.ok_or(GrammarError::MissingName)
    }

    fn current(&self) -> &Spanned {
        // `tokenize` always ends the stream with `Tok::End`.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, ahead: usize) -> &Tok {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].tok
    }

    fn at_end(&self) -> bool {
        self.current().tok == Tok::End
    }

    fn advance(&mut self) -> Tok {
        let tok = self.current().tok.clone();
        if tok != Tok::End {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> GrammarError {
        let at = self.current();
        GrammarError::syntax(at.line, at.column, message)
    }

    fn unexpected(&self, expected: &str) -> GrammarError {
        self.error(format!(
            "expected {expected}, found {}",
            self.current().tok.describe()
        ))
    }

    fn is_punct(&self, c: char) -> bool {
        self.current().tok == Tok::Punct(c)
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.is_punct(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), GrammarError> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{c}'")))
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.current().tok, Tok::Ident(name) if name == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), GrammarError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{keyword}'")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, GrammarError> {
        match &self.current().tok {
            Tok::Ident(name) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn expect_string(&mut self, what: &str) -> Result<String, GrammarError> {
        match &self.current().tok {
            Tok::Str(text) => {
                let text = text.clone();
                self.pos += 1;
                Ok(text)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// The grammar under construction; every statement but `grammar` needs it.
    fn grammar_mut(&mut self) -> Result<&mut Grammar, GrammarError> {
        self.grammar.as_mut().ok_or(GrammarError::MissingName)
    }

    fn statement(&mut self) -> Result<(), GrammarError> {
        if self.grammar.is_none() && !self.is_keyword("grammar") {
            return Err(self.error("`grammar NAME;` must come before other declarations"));
        }
        // `name :` is a rule no matter what the name is.
        if matches!(self.peek_at(0), Tok::Ident(_)) && *self.peek_at(1) == Tok::Punct(':') {
            return self.rule(false);
        }
        if self.is_keyword("inline")
            && matches!(self.peek_at(1), Tok::Ident(_))
            && *self.peek_at(2) == Tok::Punct(':')
        {
            self.pos += 1;
            return self.rule(true);
        }

        let keyword = match &self.current().tok {
            Tok::Ident(keyword) => keyword.clone(),
            _ => return Err(self.unexpected("a declaration or rule")),
        };
        match keyword.as_str() {
            "grammar" => self.grammar_decl(),
            "inherits" => self.inherits_decl(),
            "precedence" => self.precedence_decl(),
            "start" => {
                self.pos += 1;
                let rule = self.expect_ident("start rule name")?;
                self.expect_punct(';')?;
                self.grammar_mut()?.start = Some(rule);
                Ok(())
            }
            "sync" => self.sync_decl(),
            "skip" => self.skip_decl(),
            "token" => self.token_decl(),
            "embed" => self.embed_decl(),
            "define" => self.define_decl(),
            "reference" => self.reference_decl(),
            _ => Err(self.error(format!(
                "unknown declaration '{keyword}' (rules are written `{keyword} : ... ;`)"
            ))),
        }
    }

    fn grammar_decl(&mut self) -> Result<(), GrammarError> {
        if self.grammar.is_some() {
            return Err(self.error("duplicate `grammar` declaration"));
        }
        self.pos += 1;
        let name = self.expect_ident("grammar name")?;
        self.expect_punct(';')?;
        self.grammar = Some(Grammar::new(name));
        Ok(())
    }

    fn inherits_decl(&mut self) -> Result<(), GrammarError> {
        self.pos += 1;
        let mut parents = vec![self.expect_ident("parent grammar name")?];
        while self.eat_punct(',') {
            parents.push(self.expect_ident("parent grammar name")?);
        }
        self.expect_punct(';')?;
        let grammar = self.grammar_mut()?;
        for parent in parents {
            if !grammar.inherits.contains(&parent) {
                grammar.inherits.push(parent);
            }
        }
        Ok(())
    }

    fn precedence_decl(&mut self) -> Result<(), GrammarError> {
        self.pos += 1;
        let value = match self.current().tok {
            Tok::Number(n) => n,
            _ => return Err(self.unexpected("precedence number")),
        };
        self.advance();
        self.expect_punct(';')?;
        self.grammar_mut()?.precedence = Some(value);
        Ok(())
    }

    fn sync_decl(&mut self) -> Result<(), GrammarError> {
        self.pos += 1;
        let mut entries = Vec::new();
        loop {
            match &self.current().tok {
                Tok::Str(text) => entries.push(SyncTerminal::Literal(text.clone())),
                Tok::Ident(name) => entries.push(SyncTerminal::Token(name.clone())),
                _ => break,
            }
            self.pos += 1;
        }
        if entries.is_empty() {
            return Err(self.unexpected("synchronization literal or token name"));
        }
        self.expect_punct(';')?;
        let grammar = self.grammar_mut()?;
        for entry in entries {
            grammar.add_sync(entry);
        }
        Ok(())
    }

    fn skip_decl(&mut self) -> Result<(), GrammarError> {
        self.pos += 1;
        let pattern = match &self.current().tok {
            Tok::Regex(re) => re.clone(),
            _ => return Err(self.unexpected("skip pattern /.../")),
        };
        self.pos += 1;
        self.expect_punct(';')?;
        self.grammar_mut()?.add_skip(pattern);
        Ok(())
    }

    fn token_decl(&mut self) -> Result<(), GrammarError> {
        self.pos += 1;
        let name = self.expect_ident("token name")?;
        self.expect_punct('=')?;
        let pattern = match &self.current().tok {
            Tok::Regex(re) => TokenPattern::Regex(re.clone()),
            Tok::Str(text) if !text.is_empty() => TokenPattern::Literal(text.clone()),
            _ => return Err(self.unexpected("token pattern /.../ or non-empty string")),
        };
        self.pos += 1;

        let mut kind = TerminalKind::Terminal;
        if self.eat_punct(':') {
            kind = match self.expect_ident("token kind")?.as_str() {
                "terminal" => TerminalKind::Terminal,
                "identifier" => TerminalKind::Identifier,
                "literal" => TerminalKind::Literal,
                other => {
                    self.pos -= 1;
                    return Err(self.error(format!(
                        "unknown token kind '{other}' (expected terminal, identifier or literal)"
                    )));
                }
            };
        }
        self.expect_punct(';')?;
        self.grammar_mut()?.add_terminal(TokenDef {
            name,
            pattern,
            kind,
        });
        Ok(())
    }

    fn embed_decl(&mut self) -> Result<(), GrammarError> {
        self.pos += 1;
        let language = self.expect_ident("embedded language name")?;
        self.expect_keyword("on")?;
        let trigger = self.expect_string("trigger string")?;
        self.expect_keyword("until")?;
        let terminator = self.expect_string("terminator string")?;
        if trigger.is_empty() || terminator.is_empty() {
            return Err(self.error("embedding trigger and terminator must not be empty"));
        }
        self.expect_punct(';')?;
        self.grammar_mut()?
            .add_embedded_language(Embedding::new(language, trigger, terminator));
        Ok(())
    }

    fn optional_key(&mut self) -> Result<Option<String>, GrammarError> {
        if self.eat_keyword("key") {
            Ok(Some(self.expect_ident("key token name")?))
        } else {
            Ok(None)
        }
    }

    fn define_decl(&mut self) -> Result<(), GrammarError> {
        self.pos += 1;
        let rule = self.expect_ident("rule name")?;
        self.expect_keyword("as")?;
        let symbol_type = self.expect_ident("symbol type")?;
        let key = self.optional_key()?;
        let scope = if self.eat_keyword("export") {
            SymbolScope::Export
        } else {
            self.eat_keyword("local");
            SymbolScope::Local
        };
        self.expect_punct(';')?;
        self.grammar_mut()?.add_symbol_definition(
            rule,
            SymbolDefinition {
                symbol_type,
                scope,
                key,
            },
        );
        Ok(())
    }

    fn reference_decl(&mut self) -> Result<(), GrammarError> {
        self.pos += 1;
        let rule = self.expect_ident("rule name")?;
        self.expect_keyword("to")?;
        let target_type = self.expect_ident("target symbol type")?;
        let key = self.optional_key()?;
        self.expect_punct(';')?;
        self.grammar_mut()?
            .add_symbol_reference(rule, SymbolReference { target_type, key });
        Ok(())
    }

    fn rule(&mut self, inline: bool) -> Result<(), GrammarError> {
        let name = self.expect_ident("rule name")?;
        self.expect_punct(':')?;
        let definition = self.alternatives()?;
        self.expect_punct(';')?;
        let production = if inline {
            Production::inline(name, definition)
        } else {
            Production::new(name, definition)
        };
        self.grammar_mut()?.add_production(production);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn alternatives(&mut self) -> Result<Expr, GrammarError> {
        let mut alts = vec![self.sequence()?];
        while self.eat_punct('|') {
            alts.push(self.sequence()?);
        }
        Ok(Expr::alt(alts))
    }

    fn sequence(&mut self) -> Result<Expr, GrammarError> {
        let mut items = Vec::new();
        while !(self.is_punct('|') || self.is_punct(')') || self.is_punct(';') || self.at_end()) {
            items.push(self.postfix()?);
        }
        Ok(Expr::seq(items))
    }

    fn postfix(&mut self) -> Result<Expr, GrammarError> {
        let mut expr = self.atom()?;
        loop {
            expr = if self.eat_punct('*') {
                Expr::Star(Box::new(expr))
            } else if self.eat_punct('+') {
                Expr::Plus(Box::new(expr))
            } else if self.eat_punct('?') {
                Expr::Opt(Box::new(expr))
            } else {
                return Ok(expr);
            };
        }
    }

    fn atom(&mut self) -> Result<Expr, GrammarError> {
        match self.current().tok.clone() {
            Tok::Str(text) => {
                if text.is_empty() {
                    return Err(self.error("empty literal"));
                }
                self.pos += 1;
                Ok(Expr::Literal(text))
            }
            Tok::Ident(name) => {
                self.pos += 1;
                Ok(if name == "EOF" {
                    Expr::Eof
                } else {
                    Expr::Ref(name)
                })
            }
            Tok::Punct('@') => {
                self.pos += 1;
                Ok(Expr::Embed(self.expect_ident("embedded language name")?))
            }
            Tok::Punct('(') => {
                self.pos += 1;
                let inner = self.alternatives()?;
                self.expect_punct(')')?;
                Ok(inner)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }
}
