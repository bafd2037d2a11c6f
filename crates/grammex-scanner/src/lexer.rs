//! The step lexer.
//!
//! At every position each literal and pattern terminal of the grammar is a
//! candidate and only the longest matches survive. When several terminals
//! match that same text the token carries all of them, literals first and
//! then in declaration order, and the step machine keeps whichever readings
//! the grammar can use. A character no
//! candidate matches becomes a one-character `UNKNOWN` token so the parser
//! can report and resynchronize instead of the lexer giving up.
//!
//! When the winning token is an embedding trigger, the lexer emits one region
//! token covering everything up to the matching terminator. The region is
//! never tokenized with the host grammar; the parser hands its range to the
//! embedded grammar instead.

use crate::token::Token;
use grammex_grammar::{CompiledEmbedding, CompiledGrammar, Matcher, TermId};
use memchr::memmem;
use smallvec::SmallVec;
use std::ops::Range;
use tracing::{debug, trace};

pub struct StepLexer<'a> {
    grammar: &'a CompiledGrammar,
    text: &'a str,
    pos: usize,
    end: usize,
    /// Set after a trigger; the next token is that embedding's region
    pending_region: Option<&'a CompiledEmbedding>,
    /// Terminator expected right after a region; it never opens a new one
    closing: Option<TermId>,
    finished: bool,
}

impl<'a> StepLexer<'a> {
    /// Lex the whole of `text`.
    pub fn new(grammar: &'a CompiledGrammar, text: &'a str) -> Self {
        Self::with_range(grammar, text, 0..text.len())
    }

    /// Lex `text[range]`, reporting absolute offsets.
    pub fn with_range(grammar: &'a CompiledGrammar, text: &'a str, range: Range<usize>) -> Self {
        let end = range.end.min(text.len());
        StepLexer {
            grammar,
            text,
            pos: range.start.min(end),
            end,
            pending_region: None,
            closing: None,
            finished: false,
        }
    }

    #[inline]
    fn rest(&self) -> &'a str {
        self.text.get(self.pos..self.end).unwrap_or_default()
    }

    fn skip_trivia(&mut self) {
        let Some(skip) = self.grammar.skip_pattern() else {
            return;
        };
        while self.pos < self.end {
            match skip.find(self.rest()) {
                Some(m) if m.end() > 0 => self.pos += m.end(),
                _ => break,
            }
        }
    }

    /// Every terminal matching the longest text at the current position,
    /// preferred first, and that length.
    fn scan_candidates(&self) -> Option<(SmallVec<[TermId; 4]>, usize)> {
        let rest = self.rest();
        let mut best_len = 0;
        let mut literals: SmallVec<[TermId; 4]> = SmallVec::new();
        let mut patterns: SmallVec<[TermId; 4]> = SmallVec::new();

        for (index, terminal) in self.grammar.terminals().iter().enumerate() {
            let (len, literal) = match &terminal.matcher {
                Matcher::Literal(text) => {
                    if !rest.starts_with(text.as_str()) {
                        continue;
                    }
                    (text.len(), true)
                }
                Matcher::Pattern(regex) => match regex.find(rest) {
                    Some(m) if m.end() > 0 => (m.end(), false),
                    _ => continue,
                },
                Matcher::Eof | Matcher::Unknown | Matcher::Region(_) => continue,
            };
            if len < best_len {
                continue;
            }
            if len > best_len {
                best_len = len;
                literals.clear();
                patterns.clear();
            }
            let term = TermId(index as u32);
            if literal {
                literals.push(term);
            } else {
                patterns.push(term);
            }
        }
        if best_len == 0 {
            return None;
        }
        literals.extend(patterns);
        Some((literals, best_len))
    }

    /// Offset of the terminator closing a region that starts at `from`.
    ///
    /// Nested triggers are counted when trigger and terminator differ. An
    /// unterminated region runs to the end of the lexed range.
    fn find_terminator(&self, from: usize, embedding: &CompiledEmbedding) -> usize {
        let bytes = &self.text.as_bytes()[..self.end];
        let trigger = embedding.trigger.as_bytes();
        let terminator = embedding.terminator.as_bytes();
        let nested = trigger != terminator;

        let mut depth = 0usize;
        let mut pos = from;
        while pos <= bytes.len() {
            let Some(close) = memmem::find(&bytes[pos..], terminator).map(|i| pos + i) else {
                return self.end;
            };
            if nested {
                if let Some(open) = memmem::find(&bytes[pos..close], trigger).map(|i| pos + i) {
                    depth += 1;
                    pos = open + trigger.len();
                    continue;
                }
            }
            if depth == 0 {
                return close;
            }
            depth -= 1;
            pos = close + terminator.len();
        }
        self.end
    }

    /// Produce the next token. After `EOF` has been returned once, returns
    /// `None`.
    pub fn next_token(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }

        if let Some(embedding) = self.pending_region.take() {
            let start = self.pos;
            let end = self.find_terminator(start, embedding);
            self.pos = end;
            self.closing = Some(embedding.terminator_term);
            trace!(
                language = %embedding.language,
                start,
                end,
                "embedded region"
            );
            return Some(Token::new(embedding.region_term, start as u32, end as u32));
        }

        self.skip_trivia();
        if self.pos >= self.end {
            self.finished = true;
            let at = self.end as u32;
            return Some(Token::new(TermId::EOF, at, at));
        }

        let start = self.pos;
        let closing = self.closing.take();
        let token = match self.scan_candidates() {
            Some((candidates, len)) => {
                let term = candidates[0];
                let token = Token::new(term, start as u32, (start + len) as u32);
                if closing != Some(term) {
                    self.pending_region = self.grammar.embedding_for_trigger(term);
                }
                if self.pending_region.is_some() {
                    // A trigger always opens its region.
                    token
                } else {
                    if candidates.len() > 1 {
                        trace!(start, candidates = candidates.len(), "ambiguous token");
                    }
                    token.with_alternatives(candidates[1..].iter().copied())
                }
            }
            None => {
                let len = self.rest().chars().next().map_or(1, char::len_utf8);
                Token::new(TermId::UNKNOWN, start as u32, (start + len) as u32)
            }
        };
        self.pos = token.end as usize;
        Some(token)
    }
}

impl Iterator for StepLexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

/// Tokenize `text[range]` with `grammar`. The result always ends with `EOF`.
pub fn tokenize(grammar: &CompiledGrammar, text: &str, range: Range<usize>) -> Vec<Token> {
    let tokens: Vec<Token> = StepLexer::with_range(grammar, text, range).collect();
    debug!(
        grammar = grammar.name(),
        tokens = tokens.len(),
        "tokenized"
    );
    tokens
}
