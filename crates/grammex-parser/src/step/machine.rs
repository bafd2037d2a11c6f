//! Multi-path step machine.
//!
//! A parse state is a stack of `(rule, pc)` frames plus a persistent list of
//! events (rule entered, token consumed, rule left). Before each token the
//! active states are closed over every non-consuming step; states whose
//! stacks are identical after closing are merged, keeping the one reached
//! first. Each token then advances the states that match it and drops the
//! rest, so every alternative is explored in lockstep without backtracking.
//! A token the lexer could not classify uniquely advances every state that
//! accepts any of its candidate terminals, so the grammar picks the reading.
//!
//! Priority is the order of the active list. Splits are explored in
//! declaration order, which makes "first" well defined; among accepting
//! paths the one that consumed the most tokens wins.

use grammex_common::CancellationToken;
use grammex_grammar::{CompiledGrammar, RuleId, Step, StepId, TermId};
use grammex_scanner::Token;
use rustc_hash::FxHashSet;
use smallvec::{SmallVec, smallvec};
use std::rc::Rc;
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    Enter(RuleId),
    /// Index into the segment's token slice and the terminal it was read as
    Token(u32, TermId),
    Exit(RuleId),
    /// Rule closed by recovery, not by its own program
    Close(RuleId),
}

#[derive(Debug)]
struct EventLink {
    event: Event,
    prev: Option<Rc<EventLink>>,
}

type Events = Option<Rc<EventLink>>;

fn link(prev: &Events, event: Event) -> Events {
    Some(Rc::new(EventLink {
        event,
        prev: prev.clone(),
    }))
}

fn collect(events: &Events) -> Vec<Event> {
    let mut out = Vec::new();
    let mut cursor = events.as_deref();
    while let Some(node) = cursor {
        out.push(node.event);
        cursor = node.prev.as_deref();
    }
    out.reverse();
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Frame {
    rule: RuleId,
    pc: StepId,
}

type Stack = SmallVec<[Frame; 16]>;

#[derive(Clone, Debug)]
struct ParseState {
    stack: Stack,
    events: Events,
}

impl ParseState {
    /// Events of this state with every open rule closed.
    fn closed_events(&self) -> Vec<Event> {
        let mut events = self.events.clone();
        for frame in self.stack.iter().rev() {
            events = link(&events, Event::Close(frame.rule));
        }
        collect(&events)
    }
}

/// How a segment ended.
#[derive(Debug)]
pub(crate) enum SegmentResult {
    /// A path accepted at or past the end of input.
    Complete { events: Vec<Event> },
    /// No path survived token `at`.
    Failed {
        /// Best partial path, its open rules closed
        events: Vec<Event>,
        incomplete: bool,
        at: usize,
        /// Terminals the live paths could have taken at `at`
        expected: Vec<TermId>,
    },
    Cancelled { events: Vec<Event>, at: usize },
}

pub(crate) struct StepMachine<'a> {
    grammar: &'a CompiledGrammar,
    tokens: &'a [Token],
    max_rule_depth: usize,
    max_active_states: usize,
    cancellation: Option<&'a CancellationToken>,
}

impl<'a> StepMachine<'a> {
    pub(crate) fn new(
        grammar: &'a CompiledGrammar,
        tokens: &'a [Token],
        max_rule_depth: usize,
        max_active_states: usize,
        cancellation: Option<&'a CancellationToken>,
    ) -> Self {
        StepMachine {
            grammar,
            tokens,
            max_rule_depth: max_rule_depth.max(1),
            max_active_states: max_active_states.max(1),
            cancellation,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancellation.is_some_and(CancellationToken::is_cancelled)
    }

    /// Follow every non-consuming step from `seeds`.
    ///
    /// Returns the states waiting on a `Match`, in priority order, and the
    /// first state that finished the start rule, if any.
    fn close(&self, seeds: Vec<ParseState>) -> (Vec<ParseState>, Option<ParseState>) {
        let mut waiting = Vec::new();
        let mut completed = None;
        let mut seen: FxHashSet<Stack> = FxHashSet::default();
        let mut work = seeds;
        work.reverse();

        while let Some(mut state) = work.pop() {
            loop {
                let Some(top) = state.stack.last_mut() else {
                    if completed.is_none() {
                        completed = Some(state);
                    }
                    break;
                };
                match self.grammar.step(top.pc) {
                    Step::Match { .. } => {
                        if seen.insert(state.stack.clone()) {
                            waiting.push(state);
                        }
                        break;
                    }
                    Step::Jump(next) => top.pc = *next,
                    Step::Split(targets) => {
                        // A stack already seen at this split means an empty
                        // loop came back around.
                        if seen.insert(state.stack.clone()) {
                            for &target in targets.iter().rev() {
                                let mut fork = state.clone();
                                if let Some(top) = fork.stack.last_mut() {
                                    top.pc = target;
                                }
                                work.push(fork);
                            }
                        }
                        break;
                    }
                    Step::Call { rule, next } => {
                        top.pc = *next;
                        if state.stack.len() >= self.max_rule_depth {
                            trace!(
                                rule = %self.grammar.rule(*rule).name,
                                depth = state.stack.len(),
                                "rule depth exceeded, path dropped"
                            );
                            break;
                        }
                        state.stack.push(Frame {
                            rule: *rule,
                            pc: self.grammar.rule(*rule).entry,
                        });
                        state.events = link(&state.events, Event::Enter(*rule));
                    }
                    Step::Accept => {
                        if let Some(frame) = state.stack.pop() {
                            state.events = link(&state.events, Event::Exit(frame.rule));
                        }
                    }
                }
            }
        }
        (waiting, completed)
    }

    /// Run the start rule from token `start`.
    pub(crate) fn run(&self, start: usize) -> SegmentResult {
        let eof = self.tokens.len().saturating_sub(1);
        let rule = self.grammar.start_rule();
        let initial = ParseState {
            stack: smallvec![Frame {
                rule,
                pc: self.grammar.rule(rule).entry,
            }],
            events: link(&None, Event::Enter(rule)),
        };

        let (mut active, completed) = self.close(vec![initial]);
        let mut accepted = completed.map(|state| (start, state));
        let mut pos = start;

        while !active.is_empty() && pos <= eof {
            if self.cancelled() {
                let events = match (&accepted, active.first()) {
                    (Some((end, state)), _) if *end == pos => collect(&state.events),
                    (_, Some(state)) => state.closed_events(),
                    _ => Vec::new(),
                };
                return SegmentResult::Cancelled { events, at: pos };
            }

            let token = &self.tokens[pos];
            let mut advanced: Vec<(usize, ParseState)> = Vec::with_capacity(active.len());
            for state in &active {
                let Some(top) = state.stack.last() else {
                    continue;
                };
                if let Step::Match { term, next } = self.grammar.step(top.pc) {
                    if let Some(rank) = token.rank(*term) {
                        let mut state = state.clone();
                        if let Some(top) = state.stack.last_mut() {
                            top.pc = *next;
                        }
                        state.events = link(&state.events, Event::Token(pos as u32, *term));
                        advanced.push((rank, state));
                    }
                }
            }
            if advanced.is_empty() {
                break;
            }
            // Readings of an ambiguous token keep the lexer's preference;
            // within one reading the previous order stands.
            advanced.sort_by_key(|(rank, _)| *rank);

            pos += 1;
            let (mut next_active, completed) =
                self.close(advanced.into_iter().map(|(_, state)| state).collect());
            if let Some(state) = completed {
                accepted = Some((pos, state));
            }
            if next_active.len() > self.max_active_states {
                trace!(
                    live = next_active.len(),
                    kept = self.max_active_states,
                    "active states pruned"
                );
                next_active.truncate(self.max_active_states);
            }
            active = next_active;
            trace!(pos, live = active.len(), "step");
        }

        if let Some((end, state)) = &accepted {
            if *end >= eof {
                return SegmentResult::Complete {
                    events: collect(&state.events),
                };
            }
        }

        let mut expected: Vec<TermId> = Vec::new();
        for state in &active {
            if let Some(Step::Match { term, .. }) =
                state.stack.last().map(|top| self.grammar.step(top.pc))
            {
                if !expected.contains(term) {
                    expected.push(*term);
                }
            }
        }

        let furthest_accept = accepted.as_ref().filter(|(end, _)| *end == pos);
        if furthest_accept.is_some() && !expected.contains(&TermId::EOF) {
            expected.push(TermId::EOF);
        }
        let (events, incomplete) = match (furthest_accept, active.first()) {
            (Some((_, state)), _) => (collect(&state.events), false),
            (None, Some(state)) => (state.closed_events(), true),
            (None, None) => match &accepted {
                Some((_, state)) => (collect(&state.events), false),
                None => (Vec::new(), false),
            },
        };

        SegmentResult::Failed {
            events,
            incomplete,
            at: pos.min(eof),
            expected,
        }
    }
}
