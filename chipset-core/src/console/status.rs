//! Text rendering for console outcomes.
//!
//! Front-ends call [`write_outcome`] so the firmware and emulator print the
//! same lines for the same command.

use core::fmt;
use core::time::Duration;

use super::catalog::{self, CommandSpec};
use super::commands::{CommandError, CommandOutcome, ConsoleTarget};
use crate::power::engine::PowerInfo;
use crate::signals::{InputSpec, MaskNames};
use crate::telemetry::{EventRecord, TelemetryInstant};

/// Writes the lines describing `outcome`, each terminated by `\r\n`.
///
/// # Errors
///
/// Propagates writer failures.
pub fn write_outcome<T, W>(writer: &mut W, outcome: &CommandOutcome, target: &T) -> fmt::Result
where
    T: ConsoleTarget,
    W: fmt::Write,
{
    match outcome {
        CommandOutcome::PowerInfo(info) => write_power_info(writer, info, target.inputs()),
        CommandOutcome::DebugMask(mask) => {
            write!(writer, "power input debug mask {mask} ")?;
            writeln_crlf(writer, MaskNames {
                inputs: target.inputs(),
                mask: *mask,
            })
        }
        CommandOutcome::S5Timeout(timeout) => {
            writer.write_str("s5 inactivity timeout ")?;
            match timeout {
                None => writeln_crlf(writer, "never"),
                Some(duration) => {
                    write_duration(writer, *duration)?;
                    writer.write_str("\r\n")
                }
            }
        }
        CommandOutcome::Submitted(request) => writeln_crlf(writer, format_args!("ok {request:?}")),
        CommandOutcome::Pulse(enabled) => writeln_crlf(
            writer,
            if *enabled {
                "power button pulse on"
            } else {
                "power button pulse off"
            },
        ),
        CommandOutcome::SignalLog => write_signal_log(writer, target),
        CommandOutcome::SignalLogCleared => writeln_crlf(writer, "signal log cleared"),
        CommandOutcome::Sysjump => writeln_crlf(writer, "jumping"),
        CommandOutcome::Help(Some(spec)) => write_help_entry(writer, spec),
        CommandOutcome::Help(None) => {
            for spec in catalog::commands() {
                write_help_entry(writer, spec)?;
            }
            Ok(())
        }
    }
}

/// Writes `power state 3 = S0, in 0x001f` plus the asserted input names.
///
/// # Errors
///
/// Propagates writer failures.
pub fn write_power_info<W: fmt::Write>(
    writer: &mut W,
    info: &PowerInfo,
    inputs: &[InputSpec],
) -> fmt::Result {
    writeln_crlf(writer, info)?;
    writeln_crlf(
        writer,
        format_args!(
            "  asserted: {}",
            MaskNames {
                inputs,
                mask: info.signals,
            }
        ),
    )?;
    let flags = &info.flags;
    writeln_crlf(
        writer,
        format_args!(
            "  boot={} forcing={} inhibited={} ap-shutdown={} reboot-at-g3={}",
            u8::from(flags.boot_pending),
            u8::from(flags.forcing_shutdown),
            u8::from(flags.boot_inhibited),
            u8::from(flags.ap_shutdown),
            u8::from(flags.reboot_at_g3),
        ),
    )
}

/// Writes the retained log, oldest first, with each entry's age.
///
/// # Errors
///
/// Propagates writer failures.
pub fn write_signal_log<T, W>(writer: &mut W, target: &T) -> fmt::Result
where
    T: ConsoleTarget,
    W: fmt::Write,
{
    let now = target.now();
    let mut result = Ok(());
    let mut empty = true;
    target.visit_log(&mut |record| {
        empty = false;
        if result.is_ok() {
            result = write_record(writer, record, now);
        }
    });
    result?;
    if empty {
        writeln_crlf(writer, "signal log empty")?;
    }
    Ok(())
}

/// Writes one log line, e.g. `#12 -1.250s state S5 -> S3`.
///
/// # Errors
///
/// Propagates writer failures.
pub fn write_record<I, W>(writer: &mut W, record: &EventRecord<I>, now: I) -> fmt::Result
where
    I: TelemetryInstant,
    W: fmt::Write,
{
    write!(writer, "#{} -", record.id)?;
    write_duration(writer, now.saturating_duration_since(record.timestamp))?;
    writeln_crlf(writer, format_args!(" {}", record.event))
}

/// Writes the single `error: ...` line for a failed command.
///
/// # Errors
///
/// Propagates writer failures.
pub fn write_error<E, W>(writer: &mut W, error: &CommandError<'_, E>) -> fmt::Result
where
    E: fmt::Display,
    W: fmt::Write,
{
    match error {
        CommandError::Parse(err) => writeln_crlf(writer, format_args!("error: {err}")),
        CommandError::Unsupported(reason) => writeln_crlf(writer, format_args!("error: {reason}")),
        CommandError::Rejected(err) => writeln_crlf(writer, format_args!("error: {err}")),
    }
}

fn write_help_entry<W: fmt::Write>(writer: &mut W, spec: &CommandSpec) -> fmt::Result {
    writeln_crlf(writer, format_args!("{:<44} {}", spec.usage, spec.summary))
}

fn writeln_crlf<W: fmt::Write>(writer: &mut W, line: impl fmt::Display) -> fmt::Result {
    write!(writer, "{line}\r\n")
}

fn write_duration<W: fmt::Write>(writer: &mut W, duration: Duration) -> fmt::Result {
    let millis = duration.as_millis();
    write!(writer, "{}.{:03}s", millis / 1_000, millis % 1_000)
}
