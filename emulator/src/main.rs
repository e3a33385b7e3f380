//! Interactive front end for the chipset power emulator.
//!
//! Reads console commands from stdin and runs them against the engine on the
//! simulated reference board. The prompt shows the chipset state once each
//! command has settled.

mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use chipset_core::board::reference::PROFILE;
use session::{Session, TranscriptProfile};

const USAGE: &str = "usage: chipset-emulator [--profile <boot|button|faults>]";

fn main() -> ExitCode {
    let profile = match profile_from_args(env::args().skip(1)) {
        Ok(profile) => profile,
        Err(message) => {
            eprintln!("chipset-emulator: {message}");
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(profile) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("chipset-emulator: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile)?;
    let mut input = io::stdin().lock();
    let mut out = io::stdout().lock();

    writeln!(
        out,
        "{} board, virtual time; transcript in {}",
        PROFILE.name,
        profile.log_path()
    )?;
    writeln!(out, "`help` lists console and sim commands, `quit` leaves.")?;
    print_lines(&mut out, &session.boot()?)?;

    let mut line = String::new();
    loop {
        write!(out, "{}> ", session.power_state())?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            return Ok(());
        }

        match line.trim() {
            "" => {}
            "quit" | "exit" => return Ok(()),
            command => print_lines(&mut out, &session.handle_command(command)?)?,
        }
    }
}

fn print_lines(out: &mut impl Write, lines: &[String]) -> io::Result<()> {
    lines.iter().try_for_each(|line| writeln!(out, "{line}"))
}

fn profile_from_args(mut args: impl Iterator<Item = String>) -> Result<TranscriptProfile, String> {
    let Some(arg) = args.next() else {
        return Ok(TranscriptProfile::Boot);
    };
    let tag = match arg.strip_prefix("--profile") {
        Some("") => args
            .next()
            .ok_or_else(|| "--profile needs a value".to_string())?,
        Some(rest) => rest
            .strip_prefix('=')
            .ok_or_else(|| format!("unknown option `{arg}`"))?
            .to_string(),
        None => return Err(format!("unexpected argument `{arg}`")),
    };
    if let Some(extra) = args.next() {
        return Err(format!("unexpected argument `{extra}`"));
    }
    TranscriptProfile::from_tag(&tag)
}
