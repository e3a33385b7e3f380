//! Console command dispatcher.
//!
//! Parsed commands become [`ChipsetRequest`]s posted to whatever owns the
//! engine. Front-ends implement [`ConsoleTarget`]; the firmware forwards over
//! a channel while the emulator talks to its engine directly.

use core::time::Duration;

use super::catalog::{self, CommandSpec};
use super::grammar::{
    self, Command, LidCommand, PowerBtnCommand, S5TimeoutCommand, SigLogCommand,
};
use crate::events::{ENABLE_PULSE, HostCommand, LidEvent};
use crate::power::engine::PowerInfo;
use crate::power::{ChipsetRequest, ShutdownReason};
use crate::signals::{InputSpec, SignalMask};
use crate::telemetry::{EventRecord, TelemetryInstant};

/// Hold time used by a bare `powerbtn`.
pub const DEFAULT_PRESS: Duration = Duration::from_millis(200);

/// Whatever the console drives.
pub trait ConsoleTarget {
    type Instant: TelemetryInstant;
    type Error;

    fn now(&self) -> Self::Instant;

    fn power_info(&self) -> PowerInfo;

    /// Input table used to name signal bits.
    fn inputs(&self) -> &'static [InputSpec];

    fn debug_mask(&self) -> SignalMask;

    fn s5_timeout(&self) -> Option<Duration>;

    fn pulse_enabled(&self) -> bool;

    /// Posts a request to the engine.
    ///
    /// # Errors
    ///
    /// Returns the target's error when the request cannot be delivered.
    fn submit(&mut self, request: ChipsetRequest) -> Result<(), Self::Error>;

    /// Warm-restarts the controller.
    ///
    /// # Errors
    ///
    /// Returns the target's error when the restart cannot be staged.
    fn sysjump(&mut self) -> Result<(), Self::Error>;

    /// Visits the retained event log, oldest first.
    fn visit_log(&self, visit: &mut dyn FnMut(&EventRecord<Self::Instant>));

    fn clear_log(&mut self);
}

/// Command execution successes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    PowerInfo(PowerInfo),
    DebugMask(SignalMask),
    S5Timeout(Option<Duration>),
    /// A request was handed to the engine.
    Submitted(ChipsetRequest),
    Pulse(bool),
    SignalLog,
    SignalLogCleared,
    Sysjump,
    /// `None` lists every command.
    Help(Option<&'static CommandSpec>),
}

/// Errors surfaced while executing a command.
#[derive(Debug, PartialEq)]
pub enum CommandError<'a, E> {
    Parse(grammar::ParseError<'a>),
    Unsupported(&'static str),
    Rejected(E),
}

impl<'a, E> From<grammar::ParseError<'a>> for CommandError<'a, E> {
    fn from(error: grammar::ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

type CommandResult<'a, T> = Result<CommandOutcome, CommandError<'a, <T as ConsoleTarget>::Error>>;

/// Dispatches console commands into a [`ConsoleTarget`].
pub struct CommandExecutor<T> {
    target: T,
}

impl<T> CommandExecutor<T> {
    pub const fn new(target: T) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn into_inner(self) -> T {
        self.target
    }
}

impl<T> CommandExecutor<T>
where
    T: ConsoleTarget,
{
    /// Parses and executes one console line.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Parse`] for malformed input,
    /// [`CommandError::Unsupported`] for out-of-range arguments and
    /// [`CommandError::Rejected`] when the target refuses a request.
    pub fn execute<'a>(&mut self, line: &'a str) -> CommandResult<'a, T> {
        let command = grammar::parse(line)?;
        self.dispatch(command)
    }

    fn dispatch<'a>(&mut self, command: Command<'a>) -> CommandResult<'a, T> {
        match command {
            Command::PowerInfo => Ok(CommandOutcome::PowerInfo(self.target.power_info())),
            Command::PowerInDebug(None) => Ok(CommandOutcome::DebugMask(self.target.debug_mask())),
            Command::PowerInDebug(Some(bits)) => {
                let mask = SignalMask::from_bits(bits);
                self.submit(ChipsetRequest::SetDebugMask(mask))?;
                Ok(CommandOutcome::DebugMask(mask))
            }
            Command::S5Timeout(action) => self.handle_s5_timeout(action),
            Command::Shutdown => self.submit(ChipsetRequest::ForceShutdown(ShutdownReason::Console)),
            Command::Reset => self.submit(ChipsetRequest::RequestReset(ShutdownReason::Console)),
            Command::PowerOn => self.submit(ChipsetRequest::ExitHardOff),
            Command::Lid(LidCommand::Open) => self.submit(ChipsetRequest::Lid(LidEvent::Opened)),
            Command::Lid(LidCommand::Close) => self.submit(ChipsetRequest::Lid(LidEvent::Closed)),
            Command::PowerBtn(action) => self.handle_power_button(action),
            Command::SigLog(SigLogCommand::Show) => Ok(CommandOutcome::SignalLog),
            Command::SigLog(SigLogCommand::Clear) => {
                self.target.clear_log();
                Ok(CommandOutcome::SignalLogCleared)
            }
            Command::Sysjump => {
                self.target.sysjump().map_err(CommandError::Rejected)?;
                Ok(CommandOutcome::Sysjump)
            }
            Command::Help(help) => match help.topic {
                None => Ok(CommandOutcome::Help(None)),
                Some(topic) => catalog::find(topic)
                    .map(|spec| CommandOutcome::Help(Some(spec)))
                    .ok_or(CommandError::Unsupported("unknown command")),
            },
        }
    }

    fn handle_s5_timeout<'a>(&mut self, action: S5TimeoutCommand) -> CommandResult<'a, T> {
        let timeout = match action {
            S5TimeoutCommand::Show => return Ok(CommandOutcome::S5Timeout(self.target.s5_timeout())),
            S5TimeoutCommand::Never => None,
            S5TimeoutCommand::Seconds(seconds) => Some(Duration::from_secs(seconds.into())),
        };
        self.submit(ChipsetRequest::SetS5Timeout(timeout))?;
        Ok(CommandOutcome::S5Timeout(timeout))
    }

    fn handle_power_button<'a>(&mut self, action: PowerBtnCommand) -> CommandResult<'a, T> {
        match action {
            PowerBtnCommand::Press(hold) => {
                let hold = hold.unwrap_or(DEFAULT_PRESS);
                if hold.is_zero() {
                    return Err(CommandError::Unsupported("press duration must be non-zero"));
                }
                self.submit(ChipsetRequest::PressButton(hold))
            }
            PowerBtnCommand::ShowPulse => Ok(CommandOutcome::Pulse(self.target.pulse_enabled())),
            PowerBtnCommand::SetPulse(enabled) => {
                let flags = if enabled { ENABLE_PULSE } else { 0 };
                self.submit(ChipsetRequest::Host(HostCommand::ConfigPowerButton { flags }))?;
                Ok(CommandOutcome::Pulse(enabled))
            }
        }
    }

    fn submit<'a>(&mut self, request: ChipsetRequest) -> CommandResult<'a, T> {
        self.target
            .submit(request)
            .map_err(CommandError::Rejected)?;
        Ok(CommandOutcome::Submitted(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::reference::PROFILE;
    use crate::power::{EngineFlags, PowerState};
    use crate::signals::OutputLevels;
    use crate::telemetry::{EventLog, PowerEvent};
    use core::ops::Add;
    use heapless::Vec as HeaplessVec;

    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    struct MockInstant(u64);

    impl Add<Duration> for MockInstant {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self::Output {
            Self(self.0 + u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX))
        }
    }

    impl TelemetryInstant for MockInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_micros(self.0.saturating_sub(earlier.0))
        }
    }

    struct MockTarget {
        requests: HeaplessVec<ChipsetRequest, 8>,
        log: EventLog<MockInstant, 4>,
        jumps: u8,
        refuse: bool,
    }

    impl MockTarget {
        fn new() -> Self {
            Self {
                requests: HeaplessVec::new(),
                log: EventLog::new(),
                jumps: 0,
                refuse: false,
            }
        }
    }

    impl ConsoleTarget for MockTarget {
        type Instant = MockInstant;
        type Error = ();

        fn now(&self) -> MockInstant {
            MockInstant(5_000)
        }

        fn power_info(&self) -> PowerInfo {
            PowerInfo {
                state: PowerState::S5,
                signals: SignalMask::from_bits(0b11),
                flags: EngineFlags::default(),
                outputs: OutputLevels::default(),
            }
        }

        fn inputs(&self) -> &'static [InputSpec] {
            PROFILE.inputs
        }

        fn debug_mask(&self) -> SignalMask {
            SignalMask::from_bits(0x3f)
        }

        fn s5_timeout(&self) -> Option<Duration> {
            Some(Duration::from_secs(10))
        }

        fn pulse_enabled(&self) -> bool {
            true
        }

        fn submit(&mut self, request: ChipsetRequest) -> Result<(), ()> {
            if self.refuse {
                return Err(());
            }
            self.requests.push(request).map_err(|_| ())
        }

        fn sysjump(&mut self) -> Result<(), ()> {
            self.jumps += 1;
            Ok(())
        }

        fn visit_log(&self, visit: &mut dyn FnMut(&EventRecord<MockInstant>)) {
            self.log.oldest_first().for_each(visit);
        }

        fn clear_log(&mut self) {
            self.log.clear();
        }
    }

    #[test]
    fn power_commands_become_requests() {
        let mut executor = CommandExecutor::new(MockTarget::new());
        executor.execute("shutdown").expect("shutdown");
        executor.execute("reset").expect("reset");
        executor.execute("poweron").expect("poweron");
        executor.execute("lid close").expect("lid");

        assert_eq!(
            executor.target().requests.as_slice(),
            &[
                ChipsetRequest::ForceShutdown(ShutdownReason::Console),
                ChipsetRequest::RequestReset(ShutdownReason::Console),
                ChipsetRequest::ExitHardOff,
                ChipsetRequest::Lid(LidEvent::Closed),
            ]
        );
    }

    #[test]
    fn queries_do_not_post_requests() {
        let mut executor = CommandExecutor::new(MockTarget::new());
        assert_eq!(
            executor.execute("s5timeout"),
            Ok(CommandOutcome::S5Timeout(Some(Duration::from_secs(10))))
        );
        assert_eq!(
            executor.execute("powerindebug"),
            Ok(CommandOutcome::DebugMask(SignalMask::from_bits(0x3f)))
        );
        assert_eq!(executor.execute("powerbtn pulse"), Ok(CommandOutcome::Pulse(true)));
        assert!(executor.target().requests.is_empty());
    }

    #[test]
    fn settings_are_forwarded() {
        let mut executor = CommandExecutor::new(MockTarget::new());
        executor.execute("s5timeout never").expect("never");
        executor.execute("s5timeout 0").expect("zero");
        executor.execute("powerindebug 0x5").expect("mask");
        executor.execute("powerbtn pulse off").expect("pulse");

        assert_eq!(
            executor.target().requests.as_slice(),
            &[
                ChipsetRequest::SetS5Timeout(None),
                ChipsetRequest::SetS5Timeout(Some(Duration::ZERO)),
                ChipsetRequest::SetDebugMask(SignalMask::from_bits(0x5)),
                ChipsetRequest::Host(HostCommand::ConfigPowerButton { flags: 0 }),
            ]
        );
    }

    #[test]
    fn power_button_presses_use_default_hold() {
        let mut executor = CommandExecutor::new(MockTarget::new());
        assert_eq!(
            executor.execute("powerbtn"),
            Ok(CommandOutcome::Submitted(ChipsetRequest::PressButton(
                DEFAULT_PRESS
            )))
        );
        executor.execute("powerbtn press 9s").expect("long press");
        assert_eq!(
            executor.target().requests.last(),
            Some(&ChipsetRequest::PressButton(Duration::from_secs(9)))
        );
        assert_eq!(
            executor.execute("powerbtn press 0ms"),
            Err(CommandError::Unsupported("press duration must be non-zero"))
        );
    }

    #[test]
    fn siglog_clear_and_sysjump_reach_the_target() {
        let mut target = MockTarget::new();
        target.log.record(PowerEvent::ForcingPmicOff, MockInstant(1));
        let mut executor = CommandExecutor::new(target);

        assert_eq!(executor.execute("siglog"), Ok(CommandOutcome::SignalLog));
        assert_eq!(
            executor.execute("siglog clear"),
            Ok(CommandOutcome::SignalLogCleared)
        );
        assert!(executor.target().log.is_empty());

        assert_eq!(executor.execute("sysjump"), Ok(CommandOutcome::Sysjump));
        assert_eq!(executor.target().jumps, 1);
    }

    #[test]
    fn refused_requests_and_bad_topics_surface_errors() {
        let mut target = MockTarget::new();
        target.refuse = true;
        let mut executor = CommandExecutor::new(target);

        assert_eq!(executor.execute("shutdown"), Err(CommandError::Rejected(())));
        assert_eq!(
            executor.execute("help reboot"),
            Err(CommandError::Unsupported("unknown command"))
        );
        assert!(matches!(executor.execute("reboot"), Err(CommandError::Parse(_))));
        assert!(matches!(
            executor.execute("help lid"),
            Ok(CommandOutcome::Help(Some(spec))) if spec.name == "lid"
        ));
    }
}
