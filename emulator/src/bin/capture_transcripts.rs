use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, TranscriptProfile};

fn main() -> io::Result<()> {
    record_profile(TranscriptProfile::Boot)?;
    record_profile(TranscriptProfile::Button)?;
    record_profile(TranscriptProfile::Faults)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile)?;
    session.boot()?;
    match profile {
        TranscriptProfile::Boot => record_boot(&mut session),
        TranscriptProfile::Button => record_button(&mut session),
        TranscriptProfile::Faults => record_faults(&mut session),
    }
}

fn record_boot(session: &mut Session) -> io::Result<()> {
    session.handle_completion("po", 2)?;
    session.handle_completion("poweri", 6)?;
    session.handle_completion("s5", 2)?;
    session.handle_completion("siglog ", "siglog ".len())?;

    let _ = session.handle_command("powerinfo")?;
    let _ = session.handle_command("shutdown")?;
    let _ = session.handle_command("s5timeout")?;
    let _ = session.handle_command("advance 11s")?;
    let _ = session.handle_command("poweron")?;
    let _ = session.handle_command("reset")?;
    let _ = session.handle_command("sysjump")?;
    let _ = session.handle_command("siglog")?;
    Ok(())
}

fn record_button(session: &mut Session) -> io::Result<()> {
    session.handle_completion("powerbtn ", "powerbtn ".len())?;
    session.handle_completion("powerbtn p", "powerbtn p".len())?;
    session.handle_completion("lid ", "lid ".len())?;

    let _ = session.handle_command("powerbtn")?;
    let _ = session.handle_command("powerbtn pulse")?;
    let _ = session.handle_command("powerbtn press 9s")?;
    let _ = session.handle_command("advance 9s")?;
    let _ = session.handle_command("lid open")?;
    let _ = session.handle_command("lid close")?;
    let _ = session.handle_command("help powerbtn")?;
    Ok(())
}

fn record_faults(session: &mut Session) -> io::Result<()> {
    session.handle_completion("sim", 3)?;

    let _ = session.handle_command("sim rail-fault on")?;
    let _ = session.handle_command("advance 100ms")?;
    let _ = session.handle_command("sim rail-fault off")?;
    let _ = session.handle_command("sim charger never")?;
    let _ = session.handle_command("poweron")?;
    let _ = session.handle_command("advance 2s")?;
    let _ = session.handle_command("sim charger ready")?;
    let _ = session.handle_command("sim ap-watchdog on")?;
    let _ = session.handle_command("advance 500ms")?;
    let _ = session.handle_command("sim ap-watchdog off")?;
    let _ = session.handle_command("siglog")?;
    Ok(())
}
