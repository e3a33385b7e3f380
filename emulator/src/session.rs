use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::mem;
use std::path::Path;
use std::time::Duration;

use chipset_core::board::reference::PROFILE;
use chipset_core::console::commands::{CommandExecutor, ConsoleTarget};
use chipset_core::console::completion::{CompletionEngine, Replacement};
use chipset_core::console::status::{write_error, write_outcome};
use chipset_core::persist::{ButtonJumpState, ChipsetJumpState, JumpDataError, JumpTags};
use chipset_core::power::{
    ChipsetEngine, ChipsetRequest, PowerInfo, PowerState, ResetCause, StepOutcome,
};
use chipset_core::signals::{InputSpec, SignalMask};
use chipset_core::sim::{SimBoard, SimCharger, SimInstant, SimKnobs};
use chipset_core::telemetry::{EventRecord, TelemetryInstant};
use chipset_core::timer::Clock;
use embassy_futures::block_on;

/// Idle engine passes move virtual time by this much.
const TICK: Duration = Duration::from_millis(1);
/// The engine counts as settled once nothing changed for this long.
const QUIET: Duration = Duration::from_millis(100);
/// Deadlines closer than this are run through before returning.
const HORIZON: Duration = Duration::from_secs(1);
/// Upper bound on a single settle pass.
const SETTLE_LIMIT: Duration = Duration::from_secs(30);
const MAX_ADVANCE: Duration = Duration::from_secs(600);
const JUMP_CAPACITY: usize = 32;

pub const SIM_HELP: &[&str] = &[
    "advance <ms|Ns>               - let virtual time pass",
    "sim <knob> on|off             - inject a board fault",
    "sim charger ready|never       - let the charge gate pass or block",
    "sim critical on|off           - battery asks for shutdown",
];

type SimEngine = ChipsetEngine<SimBoard, SimCharger>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Boot,
    Button,
    Faults,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Boot => "transcripts/emulator-boot.log",
            TranscriptProfile::Button => "transcripts/emulator-button.log",
            TranscriptProfile::Faults => "transcripts/emulator-faults.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Boot => "Chipset emulator boot and shutdown transcript",
            TranscriptProfile::Button => "Chipset emulator power button and lid transcript",
            TranscriptProfile::Faults => "Chipset emulator fault injection transcript",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("boot") {
            Ok(Self::Boot)
        } else if tag.eq_ignore_ascii_case("button") {
            Ok(Self::Button)
        } else if tag.eq_ignore_ascii_case("faults") {
            Ok(Self::Faults)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }
}

#[derive(Debug)]
pub enum CompletionResponse {
    NoMatches,
    Applied { replacement: Replacement },
    Suggestions { options: Vec<&'static str> },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SimError {
    Jump(JumpDataError),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Jump(error) => write!(f, "sysjump failed: {error}"),
        }
    }
}

/// Engine and simulated board behind the console.
pub struct SimTarget {
    engine: SimEngine,
}

impl SimTarget {
    /// Board with every rail down after a cold power-on.
    pub fn new() -> Self {
        let mut engine = ChipsetEngine::new(SimBoard::new(), SimCharger::ready());
        engine.init(ResetCause::PowerOn, None, None);
        Self { engine }
    }

    pub fn engine(&self) -> &SimEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SimEngine {
        &mut self.engine
    }

    /// Steps the engine for at least `min`, then until it goes quiet.
    pub fn run(&mut self, min: Duration) {
        let start = self.engine.board().now();
        let limit = start + min + SETTLE_LIMIT;
        let mut last_change = start;
        loop {
            let outcome = block_on(self.engine.step());
            let now = self.engine.board().now();
            if now >= limit {
                break;
            }
            match outcome {
                StepOutcome::Transitioned { .. } => last_change = now,
                StepOutcome::Idle { wake_at } => {
                    let settled =
                        now >= start + min && now.saturating_duration_since(last_change) >= QUIET;
                    let pending = wake_at.is_some_and(|at| at <= now + HORIZON);
                    if settled && !pending {
                        break;
                    }
                    self.engine.board_mut().advance(TICK);
                }
            }
        }
    }

    /// Stages the jump tags, restarts the engine on the same board and
    /// resumes from them.
    fn warm_restart(&mut self) -> Result<PowerState, JumpDataError> {
        let (chipset, button) = self.engine.jump_state();
        let mut tags = JumpTags::<JUMP_CAPACITY>::new();
        chipset.save(&mut tags)?;
        button.save(&mut tags)?;
        let staged = JumpTags::<JUMP_CAPACITY>::decode(tags.as_bytes())?;

        let parked = ChipsetEngine::new(SimBoard::new(), SimCharger::ready());
        let (board, gate) = mem::replace(&mut self.engine, parked).into_parts();
        let mut engine = ChipsetEngine::new(board, gate);
        let state = engine.init(
            ResetCause::Sysjump,
            ChipsetJumpState::restore(&staged),
            ButtonJumpState::restore(&staged),
        );
        self.engine = engine;
        Ok(state)
    }
}

impl Default for SimTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleTarget for SimTarget {
    type Instant = SimInstant;
    type Error = SimError;

    fn now(&self) -> SimInstant {
        self.engine.board().now()
    }

    fn power_info(&self) -> PowerInfo {
        self.engine.power_info()
    }

    fn inputs(&self) -> &'static [InputSpec] {
        PROFILE.inputs
    }

    fn debug_mask(&self) -> SignalMask {
        self.engine.debug_mask()
    }

    fn s5_timeout(&self) -> Option<Duration> {
        self.engine.s5_timeout()
    }

    fn pulse_enabled(&self) -> bool {
        self.engine.button().pulse_enabled()
    }

    fn submit(&mut self, request: ChipsetRequest) -> Result<(), SimError> {
        self.engine.handle_request(request);
        Ok(())
    }

    fn sysjump(&mut self) -> Result<(), SimError> {
        self.warm_restart().map(|_| ()).map_err(SimError::Jump)
    }

    fn visit_log(&self, visit: &mut dyn FnMut(&EventRecord<SimInstant>)) {
        for record in self.engine.log().oldest_first() {
            visit(record);
        }
    }

    fn clear_log(&mut self) {
        self.engine.clear_log();
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Knob {
    PmicDead,
    RailFault,
    RailsStuck,
    StandbyDead,
    LongPressOff,
    ApSuspended,
    ApWatchdog,
    WarmReset,
    ShutdownRequest,
    NoCutoff,
}

impl Knob {
    const ALL: [Self; 10] = [
        Knob::PmicDead,
        Knob::RailFault,
        Knob::RailsStuck,
        Knob::StandbyDead,
        Knob::LongPressOff,
        Knob::ApSuspended,
        Knob::ApWatchdog,
        Knob::WarmReset,
        Knob::ShutdownRequest,
        Knob::NoCutoff,
    ];

    fn name(self) -> &'static str {
        match self {
            Knob::PmicDead => "pmic-dead",
            Knob::RailFault => "rail-fault",
            Knob::RailsStuck => "rails-stuck",
            Knob::StandbyDead => "standby-dead",
            Knob::LongPressOff => "long-press-off",
            Knob::ApSuspended => "ap-suspended",
            Knob::ApWatchdog => "ap-watchdog",
            Knob::WarmReset => "warm-reset",
            Knob::ShutdownRequest => "shutdown-req",
            Knob::NoCutoff => "no-cutoff",
        }
    }

    fn find(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|knob| knob.name().eq_ignore_ascii_case(name))
    }

    fn slot(self, knobs: &mut SimKnobs) -> &mut bool {
        match self {
            Knob::PmicDead => &mut knobs.pmic_dead,
            Knob::RailFault => &mut knobs.rail_fault,
            Knob::RailsStuck => &mut knobs.rails_stuck,
            Knob::StandbyDead => &mut knobs.standby_dead,
            Knob::LongPressOff => &mut knobs.long_press_off,
            Knob::ApSuspended => &mut knobs.ap_suspended,
            Knob::ApWatchdog => &mut knobs.ap_watchdog,
            Knob::WarmReset => &mut knobs.warm_reset_request,
            Knob::ShutdownRequest => &mut knobs.shutdown_request,
            Knob::NoCutoff => &mut knobs.no_cutoff,
        }
    }
}

/// Commands only the emulator understands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum SimCommand {
    Advance(Duration),
    Knob(Knob, bool),
    ChargerReady(bool),
    Critical(bool),
}

impl SimCommand {
    /// `None` when the line belongs to the shared console.
    fn parse(line: &str) -> Option<Result<Self, String>> {
        let mut words = line.split_whitespace();
        let head = words.next()?;
        let command = if head.eq_ignore_ascii_case("advance") {
            words
                .next()
                .ok_or_else(|| "advance needs a duration".to_string())
                .and_then(parse_duration)
                .map(SimCommand::Advance)
        } else if head.eq_ignore_ascii_case("sim") {
            parse_sim(words.next(), words.next())
        } else {
            return None;
        };
        Some(command)
    }
}

fn parse_sim(subject: Option<&str>, value: Option<&str>) -> Result<SimCommand, String> {
    let subject = subject.ok_or_else(|| "sim needs a knob".to_string())?;
    let value = value.ok_or_else(|| format!("sim {subject} needs a value"))?;

    if subject.eq_ignore_ascii_case("charger") {
        return match value {
            "ready" => Ok(SimCommand::ChargerReady(true)),
            "never" => Ok(SimCommand::ChargerReady(false)),
            other => Err(format!("charger state `{other}` is not ready|never")),
        };
    }

    let enabled = parse_switch(value)?;
    if subject.eq_ignore_ascii_case("critical") {
        return Ok(SimCommand::Critical(enabled));
    }
    Knob::find(subject)
        .map(|knob| SimCommand::Knob(knob, enabled))
        .ok_or_else(|| format!("unknown knob `{subject}` (try {})", knob_list()))
}

fn parse_switch(value: &str) -> Result<bool, String> {
    if value.eq_ignore_ascii_case("on") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("off") {
        Ok(false)
    } else {
        Err(format!("`{value}` is not on|off"))
    }
}

/// Accepts `250`, `250ms` or `2s`.
fn parse_duration(token: &str) -> Result<Duration, String> {
    let (digits, scale) = if let Some(rest) = token.strip_suffix("ms") {
        (rest, 1)
    } else if let Some(rest) = token.strip_suffix('s') {
        (rest, 1_000)
    } else {
        (token, 1)
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("bad duration `{token}`"))?;
    let duration = value
        .checked_mul(scale)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration `{token}` too long"))?;
    if duration > MAX_ADVANCE {
        return Err(format!("duration `{token}` exceeds {}s", MAX_ADVANCE.as_secs()));
    }
    Ok(duration)
}

fn knob_list() -> String {
    let mut buffer = String::new();
    for (index, knob) in Knob::ALL.iter().enumerate() {
        if index > 0 {
            buffer.push_str(", ");
        }
        buffer.push_str(knob.name());
    }
    buffer
}

pub struct Session {
    executor: CommandExecutor<SimTarget>,
    transcript: TranscriptLogger,
    completion: CompletionEngine,
}

impl Session {
    pub fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(profile)?;
        Ok(Self {
            executor: CommandExecutor::new(SimTarget::new()),
            transcript,
            completion: CompletionEngine::new(),
        })
    }

    /// Lets the cold boot run and reports what happened.
    pub fn boot(&mut self) -> io::Result<Vec<String>> {
        self.executor.target_mut().run(Duration::ZERO);
        let lines = self.narrate(Vec::new());
        self.record_output(&lines)?;
        Ok(lines)
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.elapsed();
        self.transcript
            .append_line(elapsed, TranscriptRole::Host, trimmed)?;

        let (lines, run_for) = match SimCommand::parse(trimmed) {
            Some(Ok(command)) => (self.apply(command), command_run_time(command)),
            Some(Err(message)) => (vec![format!("error: {message}")], Duration::ZERO),
            None => {
                let mut lines = self.execute(trimmed);
                if trimmed.eq_ignore_ascii_case("help") {
                    lines.extend(SIM_HELP.iter().map(|line| (*line).to_string()));
                }
                (lines, Duration::ZERO)
            }
        };

        self.executor.target_mut().run(run_for);
        let lines = self.narrate(lines);
        self.record_output(&lines)?;
        Ok(lines)
    }

    pub fn handle_completion(
        &mut self,
        buffer: &str,
        cursor: usize,
    ) -> io::Result<CompletionResponse> {
        let cursor = cursor.min(buffer.len());
        let (prefix, suffix) = buffer.split_at(cursor);
        let elapsed = self.elapsed();
        self.transcript
            .log_completion_request(elapsed, prefix, suffix, cursor)?;

        let result = self.completion.complete(buffer, cursor);
        if result.options.is_empty() {
            self.transcript.log_completion_none(elapsed)?;
            return Ok(CompletionResponse::NoMatches);
        }

        let options: Vec<&'static str> = result.options.iter().copied().collect();
        if let [candidate] = options.as_slice() {
            self.transcript
                .log_completion_applied(elapsed, candidate, result.replacement.as_ref())?;
            return Ok(match result.replacement {
                Some(replacement) => CompletionResponse::Applied { replacement },
                None => CompletionResponse::NoMatches,
            });
        }

        self.transcript.log_completion_options(elapsed, &options)?;
        Ok(CompletionResponse::Suggestions { options })
    }

    /// Chipset state after the last command settled.
    pub fn power_state(&self) -> PowerState {
        self.executor.target().engine().state()
    }

    /// Virtual time since the board powered up.
    fn elapsed(&self) -> Duration {
        Duration::from_micros(self.executor.target().engine().board().now().as_micros())
    }

    fn execute(&mut self, line: &str) -> Vec<String> {
        let mut text = String::new();
        let written = match self.executor.execute(line) {
            Ok(outcome) => write_outcome(&mut text, &outcome, self.executor.target()),
            Err(error) => write_error(&mut text, &error),
        };
        if written.is_err() {
            text.push_str("error: output formatting failed\r\n");
        }
        text.lines().map(str::to_string).collect()
    }

    fn apply(&mut self, command: SimCommand) -> Vec<String> {
        let engine = self.executor.target_mut().engine_mut();
        let line = match command {
            SimCommand::Advance(duration) => format!("advancing {}ms", duration.as_millis()),
            SimCommand::Knob(knob, enabled) => {
                *knob.slot(engine.board_mut().knobs_mut()) = enabled;
                format!("sim {} {}", knob.name(), on_off(enabled))
            }
            SimCommand::ChargerReady(true) => {
                engine.gate_mut().charge();
                engine.handle_request(ChipsetRequest::ChargeStateChanged);
                "sim charger ready".to_string()
            }
            SimCommand::ChargerReady(false) => {
                *engine.gate_mut() = SimCharger::never();
                "sim charger never".to_string()
            }
            SimCommand::Critical(enabled) => {
                engine.gate_mut().set_want_shutdown(enabled);
                format!("sim critical {}", on_off(enabled))
            }
        };
        vec![line]
    }

    /// Appends the events the board captured and the resulting state.
    fn narrate(&mut self, mut lines: Vec<String>) -> Vec<String> {
        let board = self.executor.target_mut().engine_mut().board_mut();
        lines.extend(
            board
                .events()
                .map(|(at, event)| format!("  [{at}] {event}")),
        );
        board.clear_logs();

        let target = self.executor.target();
        lines.push(format!("[{}] {}", target.now(), target.power_info()));
        lines
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        let elapsed = self.elapsed();
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

fn command_run_time(command: SimCommand) -> Duration {
    match command {
        SimCommand::Advance(duration) => duration,
        _ => Duration::ZERO,
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

struct TranscriptLogger {
    writer: BufWriter<fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds of virtual time since power-up"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }

    fn log_completion_request(
        &mut self,
        elapsed: Duration,
        prefix: &str,
        suffix: &str,
        cursor: usize,
    ) -> io::Result<()> {
        let message = format!("[TAB] prefix={prefix:?} suffix={suffix:?} cursor={cursor}");
        self.append_line(elapsed, TranscriptRole::Host, &message)
    }

    fn log_completion_none(&mut self, elapsed: Duration) -> io::Result<()> {
        self.append_line(elapsed, TranscriptRole::Emulator, "completion: no matches")
    }

    fn log_completion_applied(
        &mut self,
        elapsed: Duration,
        candidate: &str,
        replacement: Option<&Replacement>,
    ) -> io::Result<()> {
        let message = match replacement {
            Some(rep) => format!(
                "completion applied: {candidate} (range={}..{})",
                rep.start, rep.end
            ),
            None => format!("completion candidate: {candidate} (no replacement applied)"),
        };
        self.append_line(elapsed, TranscriptRole::Emulator, &message)
    }

    fn log_completion_options(
        &mut self,
        elapsed: Duration,
        options: &[&'static str],
    ) -> io::Result<()> {
        let summary = format!("completion options ({})", options.len());
        self.append_line(elapsed, TranscriptRole::Emulator, &summary)?;
        for option in options {
            let line = format!("  {option}");
            self.append_line(elapsed, TranscriptRole::Emulator, &line)?;
        }
        Ok(())
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
