#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for the power console.
//!
//! The lexer uses `regal` to produce a bounded token stream and the parser
//! walks the [`catalog`] nodes with `winnow` combinators over those tokens.

use core::fmt;
use core::ops::Range;
use core::time::Duration;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
#[allow(deprecated)]
use winnow::error::ErrorKind;
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::stream::Stream;

use super::catalog::{self, ChoiceBranch, ChoiceTag, CommandTag, DefaultChoice, Node, ValueSpec};

/// Maximum number of tokens produced per console line.
pub const MAX_TOKENS: usize = 16;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Lexical token kinds recognized by the console grammar.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Duration literal ending in `ms` or `s`.
    #[regex(r"[0-9]+(?:ms|s)", priority = 2)]
    Duration,
    /// Hexadecimal literal with a `0x` prefix.
    #[regex(r"0[xX][0-9A-Fa-f]+", priority = 3)]
    Hex,
    /// Unsuffixed decimal literal.
    #[regex(r"[0-9]+")]
    Integer,
    /// Keyword or command name; case is folded during parsing.
    #[regex(r"[A-Za-z][A-Za-z0-9-]*")]
    Ident,
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    /// End-of-line token (`\r`, `\n`, or `\r\n`).
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Anything the grammar does not know.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Token with a byte span back into the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// Input produced more tokens than the static buffer allows.
    TooManyTokens { processed: usize },
    /// Underlying lexer reported an unrecoverable error.
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "token buffer exhausted after {processed} items")
            }
            LexError::Engine => write!(f, "lexer engine error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarErrorKind<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: Option<TokenKind>,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    InvalidNumber {
        span: Range<usize>,
    },
    InvalidDuration {
        span: Range<usize>,
    },
    InvalidToken {
        span: Range<usize>,
        lexeme: &'a str,
    },
}

impl fmt::Display for GrammarErrorKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarErrorKind::UnexpectedToken {
                expected,
                found,
                span,
            } => write!(f, "expected {expected}, found {found:?} at {span:?}"),
            GrammarErrorKind::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            GrammarErrorKind::InvalidNumber { span } => {
                write!(f, "invalid number at {span:?}")
            }
            GrammarErrorKind::InvalidDuration { span } => {
                write!(f, "invalid duration literal at {span:?}")
            }
            GrammarErrorKind::InvalidToken { span, lexeme } => {
                write!(f, "unsupported token `{lexeme}` at {span:?}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrammarError<'a> {
    pub kind: GrammarErrorKind<'a>,
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        GrammarError {
            kind: match token {
                Some(tok) => GrammarErrorKind::UnexpectedToken {
                    expected,
                    found: Some(tok.kind),
                    span: tok.span.clone(),
                },
                None => GrammarErrorKind::UnexpectedEnd { expected },
            },
        }
    }

    fn invalid_number(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidNumber {
                span: token.span.clone(),
            },
        }
    }

    fn invalid_duration(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidDuration {
                span: token.span.clone(),
            },
        }
    }

    fn invalid_token(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidToken {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }
}

type Input<'src, 'slice> = &'slice [Token<'src>];

#[allow(deprecated)]
impl<'src, 'slice> ParserError<Input<'src, 'slice>> for GrammarError<'src>
where
    'src: 'slice,
{
    fn from_error_kind(input: &Input<'src, 'slice>, _kind: ErrorKind) -> Self {
        GrammarError::unexpected("token", input.first())
    }

    fn append(
        self,
        _input: &Input<'src, 'slice>,
        _token_start: &<Input<'src, 'slice> as Stream>::Checkpoint,
        _kind: ErrorKind,
    ) -> Self {
        self
    }

    fn or(self, other: Self) -> Self {
        other
    }
}

/// Combined lex/parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// Structured console commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    PowerInfo,
    /// `None` reports the current mask.
    PowerInDebug(Option<u32>),
    S5Timeout(S5TimeoutCommand),
    Shutdown,
    Reset,
    PowerOn,
    Lid(LidCommand),
    PowerBtn(PowerBtnCommand),
    SigLog(SigLogCommand),
    Sysjump,
    Help(HelpCommand<'a>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum S5TimeoutCommand {
    Show,
    Seconds(u32),
    Never,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LidCommand {
    Open,
    Close,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerBtnCommand {
    /// Press for the given time, or the default hold.
    Press(Option<Duration>),
    ShowPulse,
    SetPulse(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigLogCommand {
    Show,
    Clear,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

pub(crate) fn parse_tokens_partial<'src, 'slice>(
    tokens: &'slice [Token<'src>],
) -> Result<(Command<'src>, &'slice [Token<'src>]), GrammarError<'src>>
where
    'src: 'slice,
{
    let mut input = tokens;
    match command().parse_next(&mut input) {
        Ok(cmd) => Ok((cmd, input)),
        Err(ErrMode::Backtrack(err) | ErrMode::Cut(err)) => Err(err),
        Err(ErrMode::Incomplete(_)) => Err(GrammarError::unexpected("token", input.first())),
    }
}

/// Tokenizes `line`.
///
/// # Errors
///
/// Returns [`LexError`] when the line overflows the token buffer.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }

        let span = record.start..record.end;
        let lexeme = &line[span.clone()];
        push_token(
            &mut buffer,
            Token {
                kind: record.token,
                lexeme,
                span,
            },
        )?;
    }

    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let start = partial.start;
        let span = start..start + partial.fragment.len();
        push_token(
            &mut buffer,
            Token {
                kind: TokenKind::Error,
                lexeme: partial.fragment,
                span,
            },
        )?;
    }

    Ok(buffer)
}

fn push_token<'a>(buffer: &mut TokenBuffer<'a>, token: Token<'a>) -> Result<(), LexError> {
    buffer.push(token).map_err(|_| LexError::TooManyTokens {
        processed: buffer.len() + 1,
    })
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parses one console line.
///
/// # Errors
///
/// Returns [`ParseError`] for unknown tokens, unknown commands and malformed
/// arguments.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Error) {
        return Err(ParseError::Grammar(GrammarError::invalid_token(token)));
    }

    let (command, mut rest) =
        parse_tokens_partial(tokens.as_slice()).map_err(ParseError::Grammar)?;

    while let Some((token, remaining)) = rest.split_first() {
        if token.kind == TokenKind::Eol {
            rest = remaining;
        } else {
            return Err(ParseError::Grammar(GrammarError::unexpected(
                "end of command",
                Some(token),
            )));
        }
    }

    Ok(command)
}

fn command<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, Command<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let snapshot = *input;
        let command_token = expect_kind(TokenKind::Ident, "command keyword").parse_next(input)?;

        if let Some(spec) = catalog::find(command_token.lexeme) {
            let mut state = CommandState::new(spec.tag);
            parse_node(spec.grammar, input, &mut state)?;
            state.finish()
        } else {
            *input = snapshot;
            Err(ErrMode::Backtrack(GrammarError::unexpected(
                "command keyword",
                Some(&command_token),
            )))
        }
    }
}

fn at_line_end(input: &Input<'_, '_>) -> bool {
    input.first().is_none_or(|token| token.kind == TokenKind::Eol)
}

fn parse_node<'src, 'slice>(
    node: &'static Node,
    input: &mut Input<'src, 'slice>,
    state: &mut CommandState<'src>,
) -> Result<(), ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    match node {
        Node::End => Ok(()),
        Node::OptionalChoice { choices, default } => {
            parse_optional_choice(input, choices, *default, state)
        }
        Node::OptionalValue { tag, value, next } => {
            if at_line_end(input) {
                return Ok(());
            }
            let value = parse_value(input, *value)?;
            state.apply(*tag, value);
            parse_node(next, input, state)
        }
        Node::Topic { next } => {
            match input.split_first() {
                Some((token, rest)) if token.kind == TokenKind::Ident => {
                    state.topic = Some(token.lexeme);
                    *input = rest;
                }
                Some((token, _)) if token.kind != TokenKind::Eol => {
                    return Err(ErrMode::Backtrack(GrammarError::unexpected(
                        "command name",
                        Some(token),
                    )));
                }
                _ => {}
            }
            parse_node(next, input, state)
        }
    }
}

fn parse_optional_choice<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    choices: &'static [ChoiceBranch],
    default: Option<DefaultChoice>,
    state: &mut CommandState<'src>,
) -> Result<(), ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    if let Some((token, rest)) = input.split_first() {
        if token.kind == TokenKind::Ident {
            let Some(branch) = find_choice(choices, token.lexeme) else {
                return Err(ErrMode::Backtrack(GrammarError::unexpected(
                    choice_expected_label(choices),
                    Some(token),
                )));
            };
            *input = rest;
            let value = parse_value(input, branch.value)?;
            state.apply(branch.tag, value);
            return parse_node(branch.next, input, state);
        }
    }

    match default {
        Some(default_choice) => {
            state.apply(default_choice.tag, ChoiceValue::None);
            parse_node(default_choice.next, input, state)
        }
        None if at_line_end(input) => Ok(()),
        None => Err(ErrMode::Backtrack(GrammarError::unexpected(
            choice_expected_label(choices),
            input.first(),
        ))),
    }
}

fn parse_value<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    spec: ValueSpec,
) -> Result<ChoiceValue, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    match spec {
        ValueSpec::None => Ok(ChoiceValue::None),
        ValueSpec::Duration => {
            let token = expect_kind(TokenKind::Duration, "duration").parse_next(input)?;
            let duration = parse_duration(&token).map_err(ErrMode::Cut)?;
            Ok(ChoiceValue::Duration(duration))
        }
        ValueSpec::Integer => {
            let token = expect_kind(TokenKind::Integer, "integer").parse_next(input)?;
            let value = parse_number(&token, 10).map_err(ErrMode::Cut)?;
            Ok(ChoiceValue::Number(value))
        }
        ValueSpec::Mask => match input.split_first() {
            Some((token, rest)) if token.kind == TokenKind::Hex => {
                *input = rest;
                let value = parse_number(token, 16).map_err(ErrMode::Cut)?;
                Ok(ChoiceValue::Number(value))
            }
            _ => {
                let token = expect_kind(TokenKind::Integer, "mask").parse_next(input)?;
                let value = parse_number(&token, 10).map_err(ErrMode::Cut)?;
                Ok(ChoiceValue::Number(value))
            }
        },
    }
}

fn find_choice(choices: &'static [ChoiceBranch], lexeme: &str) -> Option<&'static ChoiceBranch> {
    choices
        .iter()
        .find(|choice| choice.keyword.eq_ignore_ascii_case(lexeme))
}

fn choice_expected_label(choices: &'static [ChoiceBranch]) -> &'static str {
    choices.first().map_or("keyword", |choice| choice.keyword)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChoiceValue {
    None,
    Duration(Duration),
    Number(u32),
}

/// Keyword and value collected while walking a command's grammar.
struct CommandState<'a> {
    tag: CommandTag,
    choice: Option<ChoiceTag>,
    value: ChoiceValue,
    topic: Option<&'a str>,
}

impl<'a> CommandState<'a> {
    fn new(tag: CommandTag) -> Self {
        Self {
            tag,
            choice: None,
            value: ChoiceValue::None,
            topic: None,
        }
    }

    fn apply(&mut self, tag: ChoiceTag, value: ChoiceValue) {
        self.choice = Some(tag);
        if value != ChoiceValue::None {
            self.value = value;
        }
    }

    fn finish(self) -> Result<Command<'a>, ErrMode<GrammarError<'a>>> {
        let number = match self.value {
            ChoiceValue::Number(value) => Some(value),
            _ => None,
        };
        let command = match (self.tag, self.choice) {
            (CommandTag::PowerInfo, _) => Command::PowerInfo,
            (CommandTag::PowerInDebug, _) => Command::PowerInDebug(number),
            (CommandTag::S5Timeout, Some(ChoiceTag::S5Never)) => {
                Command::S5Timeout(S5TimeoutCommand::Never)
            }
            (CommandTag::S5Timeout, _) => Command::S5Timeout(
                number.map_or(S5TimeoutCommand::Show, S5TimeoutCommand::Seconds),
            ),
            (CommandTag::Shutdown, _) => Command::Shutdown,
            (CommandTag::Reset, _) => Command::Reset,
            (CommandTag::PowerOn, _) => Command::PowerOn,
            (CommandTag::Lid, Some(ChoiceTag::LidOpen)) => Command::Lid(LidCommand::Open),
            (CommandTag::Lid, Some(ChoiceTag::LidClose)) => Command::Lid(LidCommand::Close),
            (CommandTag::Lid, _) => {
                return Err(ErrMode::Backtrack(GrammarError::unexpected("open", None)));
            }
            (CommandTag::PowerBtn, Some(ChoiceTag::Pulse)) => {
                Command::PowerBtn(PowerBtnCommand::ShowPulse)
            }
            (CommandTag::PowerBtn, Some(ChoiceTag::PulseOn)) => {
                Command::PowerBtn(PowerBtnCommand::SetPulse(true))
            }
            (CommandTag::PowerBtn, Some(ChoiceTag::PulseOff)) => {
                Command::PowerBtn(PowerBtnCommand::SetPulse(false))
            }
            (CommandTag::PowerBtn, _) => Command::PowerBtn(PowerBtnCommand::Press(
                match self.value {
                    ChoiceValue::Duration(duration) => Some(duration),
                    _ => None,
                },
            )),
            (CommandTag::SigLog, Some(ChoiceTag::SigLogClear)) => {
                Command::SigLog(SigLogCommand::Clear)
            }
            (CommandTag::SigLog, _) => Command::SigLog(SigLogCommand::Show),
            (CommandTag::Sysjump, _) => Command::Sysjump,
            (CommandTag::Help, _) => Command::Help(HelpCommand { topic: self.topic }),
        };
        Ok(command)
    }
}

fn expect_kind<'src, 'slice>(
    kind: TokenKind,
    label: &'static str,
) -> impl Parser<Input<'src, 'slice>, Token<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == kind => {
            *input = rest;
            Ok(token.clone())
        }
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            label,
            Some(token),
        ))),
        None => Err(ErrMode::Backtrack(GrammarError::unexpected(label, None))),
    }
}

fn parse_number<'a>(token: &Token<'a>, radix: u32) -> Result<u32, GrammarError<'a>> {
    let digits = if radix == 16 {
        &token.lexeme[2..]
    } else {
        token.lexeme
    };
    u32::from_str_radix(digits, radix).map_err(|_| GrammarError::invalid_number(token))
}

fn parse_duration<'a>(token: &Token<'a>) -> Result<Duration, GrammarError<'a>> {
    let text = token.lexeme;
    if let Some(rest) = text.strip_suffix("ms") {
        let millis = rest
            .parse::<u32>()
            .map_err(|_| GrammarError::invalid_duration(token))?;
        Ok(Duration::from_millis(millis.into()))
    } else if let Some(rest) = text.strip_suffix('s') {
        let seconds = rest
            .parse::<u32>()
            .map_err(|_| GrammarError::invalid_duration(token))?;
        Ok(Duration::from_secs(seconds.into()))
    } else {
        Err(GrammarError::invalid_duration(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Command<'_> {
        parse(input).expect("command should parse")
    }

    #[test]
    fn parses_bare_commands() {
        assert_eq!(parse_ok("powerinfo"), Command::PowerInfo);
        assert_eq!(parse_ok("shutdown\r\n"), Command::Shutdown);
        assert_eq!(parse_ok("reset"), Command::Reset);
        assert_eq!(parse_ok("poweron"), Command::PowerOn);
        assert_eq!(parse_ok("sysjump"), Command::Sysjump);
    }

    #[test]
    fn parses_debug_mask_in_hex_and_decimal() {
        assert_eq!(parse_ok("powerindebug"), Command::PowerInDebug(None));
        assert_eq!(parse_ok("powerindebug 0x1f"), Command::PowerInDebug(Some(0x1f)));
        assert_eq!(parse_ok("powerindebug 3"), Command::PowerInDebug(Some(3)));
    }

    #[test]
    fn parses_s5_timeout_variants() {
        assert_eq!(
            parse_ok("s5timeout"),
            Command::S5Timeout(S5TimeoutCommand::Show)
        );
        assert_eq!(
            parse_ok("s5timeout 30"),
            Command::S5Timeout(S5TimeoutCommand::Seconds(30))
        );
        assert_eq!(
            parse_ok("s5timeout never"),
            Command::S5Timeout(S5TimeoutCommand::Never)
        );
    }

    #[test]
    fn parses_lid_and_requires_a_direction() {
        assert_eq!(parse_ok("lid open"), Command::Lid(LidCommand::Open));
        assert_eq!(parse_ok("LID Close"), Command::Lid(LidCommand::Close));
        assert!(parse("lid").is_err());
        assert!(parse("lid sideways").is_err());
    }

    #[test]
    fn parses_power_button_forms() {
        assert_eq!(
            parse_ok("powerbtn"),
            Command::PowerBtn(PowerBtnCommand::Press(None))
        );
        assert_eq!(
            parse_ok("powerbtn press 4500ms"),
            Command::PowerBtn(PowerBtnCommand::Press(Some(Duration::from_millis(4_500))))
        );
        assert_eq!(
            parse_ok("powerbtn pulse"),
            Command::PowerBtn(PowerBtnCommand::ShowPulse)
        );
        assert_eq!(
            parse_ok("powerbtn pulse off"),
            Command::PowerBtn(PowerBtnCommand::SetPulse(false))
        );
    }

    #[test]
    fn parses_siglog_and_help() {
        assert_eq!(parse_ok("siglog"), Command::SigLog(SigLogCommand::Show));
        assert_eq!(
            parse_ok("siglog clear"),
            Command::SigLog(SigLogCommand::Clear)
        );
        assert_eq!(
            parse_ok("help s5timeout"),
            Command::Help(HelpCommand {
                topic: Some("s5timeout")
            })
        );
    }

    #[test]
    fn rejects_trailing_and_invalid_tokens() {
        assert!(matches!(
            parse("poweron now"),
            Err(ParseError::Grammar(GrammarError {
                kind: GrammarErrorKind::UnexpectedToken { .. }
            }))
        ));
        match parse("shutdown$") {
            Err(ParseError::Grammar(err)) => {
                assert!(matches!(err.kind, GrammarErrorKind::InvalidToken { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn lexer_distinguishes_number_forms() {
        let tokens = lex("0x10 16 16ms").expect("lexing should succeed");
        let kinds: HeaplessVec<TokenKind, 4> = tokens.iter().map(|token| token.kind).collect();
        assert_eq!(
            kinds.as_slice(),
            &[TokenKind::Hex, TokenKind::Integer, TokenKind::Duration]
        );
    }
}
