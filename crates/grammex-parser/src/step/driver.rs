//! Parse driver: segments, recovery, tree building and embedded regions.

use super::actions::ActionTable;
use super::machine::{Event, SegmentResult, StepMachine};
use super::options::ParseOptions;
use crate::ast::{AstArena, AstError, NodeId, NodeType, node_flags};
use grammex_common::limits::MAX_EXPECTED_IN_MESSAGE;
use grammex_common::{
    ArenaError, Diagnostic, DiagnosticBag, DiagnosticKind, LineMap, Position, Span,
};
use grammex_context::{
    ContextEngine, ContextError, CrossLanguageValidator, CrossReference, SymbolTable,
};
use grammex_grammar::{
    CompiledEmbedding, CompiledGrammar, GrammarError, GrammarSet, RuleId, RuleKind, TermId,
    TerminalKind,
};
use grammex_scanner::{Token, tokenize};
use std::ops::Range;
use thiserror::Error;
use tracing::{debug, info_span, trace, warn};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    /// The arena hit its capacity. The arena has been reset; every handle
    /// into it is now stale.
    #[error("out of memory after {nodes} nodes: {source}")]
    OutOfMemory { nodes: usize, source: ArenaError },
    #[error(transparent)]
    Ast(AstError),
}

/// Everything a parse produces besides the arena itself.
#[derive(Debug)]
pub struct ParseOutcome {
    /// The `Program` node
    pub root: NodeId,
    pub diagnostics: Vec<Diagnostic>,
    /// Document-level symbols, with exports merged up from embedded regions
    pub symbols: SymbolTable,
    pub cross_references: Vec<CrossReference>,
    /// False when the parse stopped early (cancellation, diagnostic limit)
    pub complete: bool,
}

/// Parses documents against a `GrammarSet`.
pub struct StepParser<'g> {
    grammars: &'g GrammarSet,
    options: ParseOptions,
    validators: Vec<&'g dyn CrossLanguageValidator>,
}

impl<'g> StepParser<'g> {
    pub fn new(grammars: &'g GrammarSet, options: ParseOptions) -> Self {
        StepParser {
            grammars,
            options,
            validators: Vec::new(),
        }
    }

    /// Add a validator run on every reference when its context closes.
    pub fn with_validator(mut self, validator: &'g dyn CrossLanguageValidator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn parse(
        &self,
        arena: &mut AstArena,
        source: &str,
        grammar: &str,
    ) -> Result<ParseOutcome, ParseError> {
        self.parse_with_actions(arena, source, grammar, None)
    }

    /// Parse `source` as `grammar`, building the tree in `arena` and firing
    /// `actions` as nodes are entered and completed.
    pub fn parse_with_actions(
        &self,
        arena: &mut AstArena,
        source: &str,
        grammar: &str,
        actions: Option<&mut ActionTable>,
    ) -> Result<ParseOutcome, ParseError> {
        let _span = info_span!("parse", grammar, bytes = source.len()).entered();
        let compiled = self.grammars.require(grammar)?;

        let run = ParseRun {
            grammars: self.grammars,
            options: &self.options,
            validators: &self.validators,
            actions,
            source,
            lines: LineMap::new(source),
            arena: &mut *arena,
            engine: ContextEngine::new(compiled.name(), self.options.engine_config()),
            diagnostics: DiagnosticBag::new(self.options.max_diagnostics),
            stop: None,
        };
        match run.execute(compiled) {
            Ok(outcome) => Ok(outcome),
            Err(AstError::OutOfMemory(cause)) => {
                let nodes = arena.node_count();
                warn!(nodes, %cause, "arena exhausted, parse abandoned");
                arena.reset();
                Err(ParseError::OutOfMemory {
                    nodes,
                    source: cause,
                })
            }
            Err(err) => Err(ParseError::Ast(err)),
        }
    }
}

impl std::fmt::Debug for StepParser<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepParser")
            .field("grammars", &self.grammars.names().collect::<Vec<_>>())
            .field("options", &self.options)
            .field("validators", &self.validators.len())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StopReason {
    Cancelled,
    DiagnosticLimit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RangeOutcome {
    Finished,
    /// The embedded context hit its error threshold
    Abandoned,
}

/// A rule open during symbol extraction.
struct OpenRule {
    rule: RuleId,
    first: Option<usize>,
    last: Option<usize>,
    key: Option<usize>,
}

struct ParseRun<'r> {
    grammars: &'r GrammarSet,
    options: &'r ParseOptions,
    validators: &'r [&'r dyn CrossLanguageValidator],
    actions: Option<&'r mut ActionTable>,
    source: &'r str,
    lines: LineMap,
    arena: &'r mut AstArena,
    engine: ContextEngine,
    diagnostics: DiagnosticBag,
    stop: Option<StopReason>,
}

impl<'r> ParseRun<'r> {
    fn execute(mut self, grammar: &CompiledGrammar) -> Result<ParseOutcome, AstError> {
        let span = self.span(0, self.source.len() as u32);
        let root = self
            .arena
            .create_node(NodeType::Program, grammar.name(), "", span)?;
        self.parse_range(grammar, 0..self.source.len(), root)?;
        debug_assert!(
            self.stop.is_some() || self.engine.depth() == 0,
            "embedded contexts left open after a complete parse"
        );

        let output = self.engine.finish(self.validators);
        for diagnostic in output.diagnostics {
            if !self.diagnostics.add(diagnostic) {
                break;
            }
        }
        let complete = self.stop.is_none() && !self.diagnostics.is_truncated();
        debug!(
            nodes = self.arena.node_count(),
            diagnostics = self.diagnostics.len(),
            symbols = output.symbols.len(),
            complete,
            "parse finished"
        );
        Ok(ParseOutcome {
            root,
            diagnostics: self.diagnostics.into_vec(),
            symbols: output.symbols,
            cross_references: output.cross_references,
            complete,
        })
    }

    #[inline]
    fn position(&self, offset: u32) -> Position {
        self.lines.position(self.source, offset)
    }

    #[inline]
    fn span(&self, start: u32, end: u32) -> Span {
        self.lines.span(self.source, start, end)
    }

    fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        if !self.diagnostics.add(diagnostic) && self.stop.is_none() {
            debug!(limit = self.options.max_diagnostics, "diagnostic limit reached");
            self.stop = Some(StopReason::DiagnosticLimit);
        }
    }

    fn cancel(&mut self, language: &str, offset: u32) {
        if self.stop.is_some() {
            return;
        }
        debug!(language, offset, "parse cancelled");
        let span = Span::point(self.position(offset));
        self.diagnostics.add_terminal(Diagnostic::fatal(
            DiagnosticKind::Cancelled,
            language,
            span,
            "parse cancelled",
        ));
        self.stop = Some(StopReason::Cancelled);
    }

    // -------------------------------------------------------------------------
    // Segments
    // -------------------------------------------------------------------------

    /// Parse `source[range]` with `grammar`, attaching top-level nodes to
    /// `host`.
    fn parse_range(
        &mut self,
        grammar: &CompiledGrammar,
        range: Range<usize>,
        host: NodeId,
    ) -> Result<RangeOutcome, AstError> {
        let options = self.options;
        let tokens = tokenize(grammar, self.source, range);
        let eof = tokens.len().saturating_sub(1);
        let mut start = 0;

        loop {
            if self.stop.is_some() {
                return Ok(RangeOutcome::Finished);
            }
            if options.is_cancelled() {
                self.cancel(grammar.name(), tokens[start].start);
                return Ok(RangeOutcome::Finished);
            }

            let machine = StepMachine::new(
                grammar,
                &tokens,
                options.max_rule_depth,
                options.max_active_states,
                options.cancellation.as_ref(),
            );
            match machine.run(start) {
                SegmentResult::Complete { events } => {
                    self.build(grammar, &tokens, &events, start, host)?;
                    return Ok(RangeOutcome::Finished);
                }
                SegmentResult::Cancelled { events, at } => {
                    self.build(grammar, &tokens, &events, start, host)?;
                    self.cancel(grammar.name(), tokens[at].start);
                    return Ok(RangeOutcome::Finished);
                }
                SegmentResult::Failed {
                    events,
                    incomplete,
                    at,
                    expected,
                } => {
                    trace!(at, incomplete, expected = expected.len(), "segment failed");
                    self.report_syntax_error(grammar, &tokens, at, &expected);
                    if events.iter().any(|e| matches!(e, Event::Token(..))) {
                        self.build(grammar, &tokens, &events, start, host)?;
                    }
                    if self.stop.is_some() {
                        return Ok(RangeOutcome::Finished);
                    }
                    if self.engine.error_threshold_exceeded() {
                        return Ok(RangeOutcome::Abandoned);
                    }
                    match self.recover(grammar, &tokens, at, host)? {
                        Some(next) if next < eof => start = next,
                        _ => return Ok(RangeOutcome::Finished),
                    }
                }
            }
        }
    }

    fn describe_terminal(grammar: &CompiledGrammar, term: TermId) -> String {
        if term == TermId::EOF {
            "end of input".to_string()
        } else {
            grammar.terminal_name(term).to_string()
        }
    }

    fn report_syntax_error(
        &mut self,
        grammar: &CompiledGrammar,
        tokens: &[Token],
        at: usize,
        expected: &[TermId],
    ) {
        let token = &tokens[at];
        let found = if token.is_eof() {
            "end of input".to_string()
        } else {
            format!("'{}'", token.text(self.source))
        };
        let mut message = format!("unexpected {found}");
        if !expected.is_empty() {
            let names: Vec<String> = expected
                .iter()
                .take(MAX_EXPECTED_IN_MESSAGE)
                .map(|&term| Self::describe_terminal(grammar, term))
                .collect();
            message.push_str(", expected ");
            message.push_str(&names.join(", "));
            if expected.len() > MAX_EXPECTED_IN_MESSAGE {
                message.push_str(", ...");
            }
        }

        let errors = self.engine.record_error();
        trace!(language = grammar.name(), errors, %message, "syntax error");
        let diagnostic = Diagnostic::syntax_error(
            grammar.name(),
            self.span(token.start, token.end),
            message,
        );
        self.fire_error(grammar.name(), &diagnostic);
        self.push_diagnostic(diagnostic);
    }

    /// Skip to the first sync token at or after `at`, covering the skipped
    /// tokens with an `Error` node. Returns where the next segment starts.
    fn recover(
        &mut self,
        grammar: &CompiledGrammar,
        tokens: &[Token],
        at: usize,
        host: NodeId,
    ) -> Result<Option<usize>, AstError> {
        let eof = tokens.len().saturating_sub(1);
        let is_sync = |i: &usize| tokens[*i].candidates().any(|term| grammar.is_sync(term));
        let (last, next) = match (at..eof).find(is_sync) {
            Some(sync) => (Some(sync), sync + 1),
            None => ((at < eof).then(|| eof - 1), eof),
        };
        if let Some(last) = last {
            let (start, end) = (tokens[at].start, tokens[last].end);
            let text = self
                .source
                .get(start as usize..end as usize)
                .unwrap_or_default();
            let span = self.span(start, end);
            let node = self
                .arena
                .create_node(NodeType::Error, "error", text, span)?;
            self.arena.add_child(host, node)?;
            trace!(skipped = last + 1 - at, resume = next, "resynchronized");
        }
        Ok((next < eof).then_some(next))
    }

    // -------------------------------------------------------------------------
    // Tree building
    // -------------------------------------------------------------------------

    /// Declare symbols for the segment's completed rules, then replay its
    /// events into nodes under `host`.
    fn build(
        &mut self,
        grammar: &CompiledGrammar,
        tokens: &[Token],
        events: &[Event],
        start: usize,
        host: NodeId,
    ) -> Result<(), AstError> {
        self.extract_symbols(grammar, tokens, events);
        self.replay(grammar, tokens, events, start, host)
    }

    fn key_term(grammar: &CompiledGrammar, rule: RuleId) -> Option<TermId> {
        grammar
            .symbol_definition(rule)
            .and_then(|d| d.key)
            .or_else(|| grammar.symbol_reference(rule).and_then(|r| r.key))
    }

    fn extract_symbols(&mut self, grammar: &CompiledGrammar, tokens: &[Token], events: &[Event]) {
        let mut open: Vec<OpenRule> = Vec::new();
        for event in events {
            match *event {
                Event::Enter(rule) => open.push(OpenRule {
                    rule,
                    first: None,
                    last: None,
                    key: None,
                }),
                Event::Token(index, kind) => {
                    let index = index as usize;
                    for frame in &mut open {
                        frame.first.get_or_insert(index);
                        frame.last = Some(index);
                        if frame.key.is_none() && Self::key_term(grammar, frame.rule) == Some(kind)
                        {
                            frame.key = Some(index);
                        }
                    }
                }
                Event::Exit(_) => {
                    if let Some(frame) = open.pop() {
                        self.declare(grammar, tokens, &frame);
                    }
                }
                Event::Close(_) => {
                    open.pop();
                }
            }
        }
    }

    fn declare(&mut self, grammar: &CompiledGrammar, tokens: &[Token], frame: &OpenRule) {
        let definition = grammar.symbol_definition(frame.rule);
        let reference = grammar.symbol_reference(frame.rule);
        if definition.is_none() && reference.is_none() {
            return;
        }
        let (start, end) = match (frame.key, frame.first, frame.last) {
            (Some(key), _, _) => (tokens[key].start, tokens[key].end),
            (None, Some(first), Some(last)) => (tokens[first].start, tokens[last].end),
            _ => return,
        };
        let text = self
            .source
            .get(start as usize..end as usize)
            .unwrap_or_default();
        let name = strip_quotes(text.trim());
        if name.is_empty() {
            return;
        }
        let span = self.span(start, end);

        if let Some(definition) = definition {
            let added =
                self.engine
                    .define_symbol(name, &definition.symbol_type, definition.scope, span);
            if !added {
                trace!(name, "symbol already defined in this context");
            }
        }
        if let Some(reference) = reference {
            self.engine
                .record_reference(name, &reference.target_type, span);
        }
    }

    fn replay(
        &mut self,
        grammar: &CompiledGrammar,
        tokens: &[Token],
        events: &[Event],
        start: usize,
        host: NodeId,
    ) -> Result<(), AstError> {
        let eof = tokens.len().saturating_sub(1);

        // Index of the first token consumed at or after each event; empty
        // nodes sit at that token's start.
        let mut next_token = vec![0usize; events.len()];
        let mut next = events
            .iter()
            .rev()
            .find_map(|e| match e {
                Event::Token(i, _) => Some(*i as usize + 1),
                _ => None,
            })
            .unwrap_or(start)
            .min(eof);
        for (slot, event) in next_token.iter_mut().zip(events).rev() {
            if let Event::Token(i, _) = event {
                next = *i as usize;
            }
            *slot = next;
        }

        let language = grammar.name();
        let mut nodes: Vec<NodeId> = vec![host];
        let mut opened: Vec<bool> = Vec::new();

        for (event, &next) in events.iter().zip(&next_token) {
            let parent = nodes.last().copied().unwrap_or(host);
            match *event {
                Event::Enter(rule) => {
                    let program = grammar.rule(rule);
                    if program.kind != RuleKind::Node {
                        opened.push(false);
                        continue;
                    }
                    let at = Span::point(self.position(tokens[next].start));
                    let node = self
                        .arena
                        .create_node(NodeType::NonTerminal, &program.name, "", at)?;
                    self.arena.add_child(parent, node)?;
                    self.fire_enter(language, NodeType::NonTerminal, node);
                    nodes.push(node);
                    opened.push(true);
                }
                Event::Token(index, term) => {
                    let token = tokens[index as usize].as_kind(term);
                    if token.is_eof() {
                        continue;
                    }
                    if let Some(embedding) = grammar.embedding_for_region(token.kind) {
                        self.enter_region(language, embedding, &token, parent)?;
                    } else {
                        self.token_node(grammar, &token, parent)?;
                    }
                    self.extend_end(parent, token.end)?;
                }
                Event::Exit(_) | Event::Close(_) => {
                    if !opened.pop().unwrap_or(false) {
                        continue;
                    }
                    let Some(node) = nodes.pop() else {
                        continue;
                    };
                    if matches!(event, Event::Close(_)) {
                        let flags = self.arena.flags(node)?;
                        self.arena
                            .set_flags(node, flags | node_flags::INCOMPLETE)?;
                    }
                    self.fire_exit(language, NodeType::NonTerminal, node);
                    let end = self.arena.span(node)?.end_offset;
                    let outer = nodes.last().copied().unwrap_or(host);
                    self.extend_end(outer, end)?;
                }
            }
        }
        Ok(())
    }

    fn token_node(
        &mut self,
        grammar: &CompiledGrammar,
        token: &Token,
        parent: NodeId,
    ) -> Result<NodeId, AstError> {
        let (node_type, name) = match grammar.terminal(token.kind) {
            Some(terminal) => (
                match terminal.kind {
                    TerminalKind::Terminal => NodeType::Terminal,
                    TerminalKind::Identifier => NodeType::Identifier,
                    TerminalKind::Literal => NodeType::Literal,
                },
                terminal.name.as_str(),
            ),
            None => (NodeType::Terminal, "?"),
        };
        let span = self.span(token.start, token.end);
        let node = self
            .arena
            .create_node(node_type, name, token.text(self.source), span)?;
        self.arena.add_child(parent, node)?;
        self.fire_enter(grammar.name(), node_type, node);
        self.fire_exit(grammar.name(), node_type, node);
        Ok(node)
    }

    fn extend_end(&mut self, node: NodeId, end: u32) -> Result<(), AstError> {
        if self.arena.span(node)?.end_offset < end {
            let pos = self.position(end);
            self.arena.set_end_position(node, pos)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Embedded regions
    // -------------------------------------------------------------------------

    /// Region text kept verbatim, for regions that are not parsed.
    fn raw_region(
        &mut self,
        language: &str,
        token: &Token,
        parent: NodeId,
    ) -> Result<NodeId, AstError> {
        let span = self.span(token.start, token.end);
        let node = self.arena.create_node(
            NodeType::Embedded,
            language,
            token.text(self.source),
            span,
        )?;
        self.arena.add_child(parent, node)?;
        Ok(node)
    }

    fn enter_region(
        &mut self,
        host_language: &str,
        embedding: &CompiledEmbedding,
        token: &Token,
        parent: NodeId,
    ) -> Result<(), AstError> {
        let grammars = self.grammars;
        let language = embedding.language.as_str();
        let Some(sub) = grammars.get(language) else {
            self.raw_region(language, token, parent)?;
            return Ok(());
        };
        if self.engine.is_unwinding() || self.stop.is_some() {
            self.raw_region(language, token, parent)?;
            return Ok(());
        }

        match self.engine.push_context(language, token.start) {
            Ok(_) => {}
            Err(ContextError::Overflow { max_depth, .. }) => {
                let span = self.span(token.start, token.end);
                self.push_diagnostic(Diagnostic::warning(
                    DiagnosticKind::ContextOverflow,
                    host_language,
                    span,
                    format!(
                        "{language} region nested deeper than {max_depth} contexts; kept as raw text"
                    ),
                ));
                self.raw_region(language, token, parent)?;
                self.engine.begin_unwind();
                return Ok(());
            }
            Err(ContextError::PopRoot) => {
                self.raw_region(language, token, parent)?;
                return Ok(());
            }
        }

        let before = self.arena.child_count(parent)?;
        let outcome = self.parse_range(sub, token.start as usize..token.end as usize, parent)?;
        match outcome {
            RangeOutcome::Abandoned => {
                let errors = self.engine.current().error_count;
                self.arena.truncate_children(parent, before)?;
                let span = self.span(token.start, token.end);
                let node = self.arena.create_node(
                    NodeType::Error,
                    language,
                    token.text(self.source),
                    span,
                )?;
                self.arena.add_child(parent, node)?;
                let _ = self.engine.force_pop();
                debug!(language, errors, "embedded region abandoned");
                self.push_diagnostic(Diagnostic::warning(
                    DiagnosticKind::EmbeddedRegionAbandoned,
                    language,
                    span,
                    format!("{language} region abandoned after {errors} syntax errors"),
                ));
            }
            RangeOutcome::Finished => {
                if let Err(err) = self.engine.pop_context(self.validators) {
                    warn!(language, %err, "embedded context could not be popped");
                }
                for diagnostic in self.engine.take_diagnostics() {
                    self.push_diagnostic(diagnostic);
                }
            }
        }

        if self.engine.depth() == 0 && self.engine.is_unwinding() {
            debug!("context stack unwound to the document");
            self.engine.end_unwind();
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Semantic actions
    // -------------------------------------------------------------------------

    fn fire_enter(&mut self, language: &str, node_type: NodeType, node: NodeId) {
        if let Some(actions) = self
            .actions
            .as_deref_mut()
            .and_then(|table| table.get_mut(language, node_type))
        {
            actions.on_enter_rule(self.arena, node);
        }
    }

    fn fire_exit(&mut self, language: &str, node_type: NodeType, node: NodeId) {
        if let Some(actions) = self
            .actions
            .as_deref_mut()
            .and_then(|table| table.get_mut(language, node_type))
        {
            actions.on_exit_rule(self.arena, node);
        }
    }

    fn fire_error(&mut self, language: &str, diagnostic: &Diagnostic) {
        if let Some(actions) = self
            .actions
            .as_deref_mut()
            .and_then(|table| table.get_mut(language, NodeType::Error))
        {
            actions.on_error(diagnostic);
        }
    }
}

/// `"x"` or `'x'` becomes `x`; anything else is returned unchanged.
fn strip_quotes(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &text[1..text.len() - 1];
        }
    }
    text
}
