//! Grammar-aware completion shared by the firmware and emulator consoles.
//!
//! Candidates come straight from the [`catalog`] tables: the tokens before the
//! cursor are walked through the command's grammar and the keywords of the
//! node reached are offered.

use heapless::Vec as HeaplessVec;

use super::catalog::{self, Node, ValueSpec};
use super::grammar::{self, Token, TokenKind};

const MAX_SUGGESTIONS: usize = 16;

/// Completion result returned to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionResult {
    /// Text to substitute when one candidate matches, or when the candidates
    /// share a prefix longer than what was typed.
    pub replacement: Option<Replacement>,
    /// Candidates at the cursor; empty when nothing matches.
    pub options: HeaplessVec<&'static str, MAX_SUGGESTIONS>,
}

impl CompletionResult {
    const fn empty() -> Self {
        Self {
            replacement: None,
            options: HeaplessVec::new(),
        }
    }
}

/// Portion of the buffer to replace with `value`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replacement {
    pub start: usize,
    pub end: usize,
    pub value: &'static str,
    pub append_space: bool,
}

#[derive(Default)]
pub struct CompletionEngine;

impl CompletionEngine {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes completions for `buffer` with the cursor at byte `cursor`.
    ///
    /// The caller keeps the buffer ASCII so every index is a char boundary.
    #[must_use]
    pub fn complete(&self, buffer: &str, cursor: usize) -> CompletionResult {
        if cursor > buffer.len() {
            return CompletionResult::empty();
        }

        let upto_cursor = &buffer[..cursor];
        let prefix_start = token_start(upto_cursor);
        let prefix = &upto_cursor[prefix_start..];

        let Ok(leading) = grammar::lex(&upto_cursor[..prefix_start]) else {
            return CompletionResult::empty();
        };
        if leading.iter().any(|token| token.kind == TokenKind::Error) {
            return CompletionResult::empty();
        }

        let Some(context) = determine_context(leading.as_slice()) else {
            return CompletionResult::empty();
        };

        let mut matches: HeaplessVec<Candidate, MAX_SUGGESTIONS> = HeaplessVec::new();
        for candidate in context.candidates() {
            if starts_with_ignore_ascii_case(candidate.word, prefix) {
                let _ = matches.push(candidate);
            }
        }

        let replacement = match matches.as_slice() {
            [] => None,
            [only] => Some(Replacement {
                start: prefix_start,
                end: cursor,
                value: only.word,
                append_space: only.takes_argument,
            }),
            many => {
                let lcp = longest_common_prefix(many);
                (lcp.len() > common_prefix_len_ignore_case(prefix, lcp)).then_some(Replacement {
                    start: prefix_start,
                    end: cursor,
                    value: lcp,
                    append_space: false,
                })
            }
        };

        CompletionResult {
            replacement,
            options: matches.iter().map(|candidate| candidate.word).collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Candidate {
    word: &'static str,
    takes_argument: bool,
}

#[derive(Clone, Copy, Debug)]
enum CompletionContext {
    Root,
    HelpTopic,
    Choices(&'static Node),
}

impl CompletionContext {
    fn candidates(self) -> impl Iterator<Item = Candidate> {
        let commands: &'static [catalog::CommandSpec] = match self {
            CompletionContext::Root | CompletionContext::HelpTopic => catalog::commands(),
            CompletionContext::Choices(_) => &[],
        };
        let choices: &'static [catalog::ChoiceBranch] = match self {
            CompletionContext::Choices(Node::OptionalChoice { choices, .. }) => *choices,
            _ => &[],
        };
        let root = matches!(self, CompletionContext::Root);

        commands
            .iter()
            .map(move |spec| Candidate {
                word: spec.name,
                takes_argument: root && takes_argument(spec.grammar),
            })
            .chain(choices.iter().map(|branch| Candidate {
                word: branch.keyword,
                takes_argument: branch.value != ValueSpec::None
                    || matches!(branch.next, Node::OptionalChoice { .. }),
            }))
    }
}

fn takes_argument(node: &'static Node) -> bool {
    !matches!(node, Node::End)
}

/// Walks the tokens typed so far through the command grammar.
fn determine_context(tokens: &[Token<'_>]) -> Option<CompletionContext> {
    let Some((first, rest)) = tokens.split_first() else {
        return Some(CompletionContext::Root);
    };
    let spec = catalog::find(first.lexeme)?;

    let mut node = spec.grammar;
    if let Node::Topic { .. } = node {
        return rest.is_empty().then_some(CompletionContext::HelpTopic);
    }

    let mut remaining = rest;
    while let Some((token, tail)) = remaining.split_first() {
        match node {
            Node::OptionalChoice { choices, default } => {
                let branch = (token.kind == TokenKind::Ident)
                    .then(|| {
                        choices
                            .iter()
                            .find(|branch| branch.keyword.eq_ignore_ascii_case(token.lexeme))
                    })
                    .flatten();
                if let Some(branch) = branch {
                    node = branch.next;
                    remaining = if branch.value == ValueSpec::None {
                        tail
                    } else {
                        tail.get(1..)?
                    };
                } else {
                    // Re-examine the same token against the default branch.
                    node = default.as_ref()?.next;
                }
            }
            Node::OptionalValue { next, .. } => {
                node = next;
                remaining = tail;
            }
            Node::End | Node::Topic { .. } => return None,
        }
    }

    match node {
        Node::OptionalChoice { .. } => Some(CompletionContext::Choices(node)),
        _ => None,
    }
}

fn token_start(buffer: &str) -> usize {
    buffer
        .rfind([' ', '\t'])
        .map_or(0, |index| index + 1)
}

fn starts_with_ignore_ascii_case(candidate: &str, prefix: &str) -> bool {
    candidate
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn common_prefix_len_ignore_case(lhs: &str, rhs: &str) -> usize {
    lhs.as_bytes()
        .iter()
        .zip(rhs.as_bytes())
        .take_while(|(l, r)| l.eq_ignore_ascii_case(r))
        .count()
}

fn longest_common_prefix(candidates: &[Candidate]) -> &'static str {
    let Some((first, rest)) = candidates.split_first() else {
        return "";
    };
    let mut prefix = first.word;
    for candidate in rest {
        let len = common_prefix_len_ignore_case(prefix, candidate.word);
        prefix = &prefix[..len];
        if prefix.is_empty() {
            break;
        }
    }
    prefix
}
