//! Line-editing console session for the USB CDC port.
//!
//! Bytes from the host are assembled into a line buffer with echo, backspace
//! and tab completion. A carriage return runs the line through the shared
//! [`CommandExecutor`] and renders the outcome.

use core::fmt::{self, Write};
use core::str;

use chipset_core::console::commands::{CommandExecutor, ConsoleTarget};
use chipset_core::console::completion::CompletionEngine;
use chipset_core::console::status::{write_error, write_outcome};
use heapless::Vec;

/// Maximum number of bytes accepted on a single console line.
pub const MAX_LINE_LEN: usize = 96;

pub const PROMPT: &str = "> ";

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;
const TAB: u8 = b'\t';

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SessionState {
    Disconnected,
    Connected,
}

/// Console state for one attached host.
pub struct ConsoleSession<T> {
    executor: CommandExecutor<T>,
    completion: CompletionEngine,
    buffer: Vec<u8, MAX_LINE_LEN>,
    state: SessionState,
}

impl<T> ConsoleSession<T>
where
    T: ConsoleTarget,
    T::Error: fmt::Display,
{
    pub const fn new(target: T) -> Self {
        Self {
            executor: CommandExecutor::new(target),
            completion: CompletionEngine::new(),
            buffer: Vec::new(),
            state: SessionState::Disconnected,
        }
    }

    pub fn target(&self) -> &T {
        self.executor.target()
    }

    /// Host opened the port; prints the banner and prompt.
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn on_connect<W: Write>(&mut self, out: &mut W) -> fmt::Result {
        self.state = SessionState::Connected;
        self.buffer.clear();
        out.write_str("chipset console, 'help' lists commands\r\n")?;
        out.write_str(PROMPT)
    }

    pub fn on_disconnect(&mut self) {
        self.state = SessionState::Disconnected;
        self.buffer.clear();
    }

    /// Feeds host bytes, writing echo and command output to `out`.
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn ingest<W: Write>(&mut self, bytes: &[u8], out: &mut W) -> fmt::Result {
        if self.state != SessionState::Connected {
            return Ok(());
        }
        for &byte in bytes {
            self.ingest_byte(byte, out)?;
        }
        Ok(())
    }

    fn ingest_byte<W: Write>(&mut self, byte: u8, out: &mut W) -> fmt::Result {
        match byte {
            b'\r' => self.process_line(out),
            // CRLF hosts already ran the line on the CR.
            b'\n' => Ok(()),
            BACKSPACE | DELETE => {
                if self.buffer.pop().is_some() {
                    out.write_str("\x08 \x08")?;
                }
                Ok(())
            }
            TAB => self.complete(out),
            value if value.is_ascii_graphic() || value == b' ' => {
                if self.buffer.push(value).is_ok() {
                    out.write_char(char::from(value))?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn process_line<W: Write>(&mut self, out: &mut W) -> fmt::Result {
        out.write_str("\r\n")?;
        let line = self.buffer.clone();
        self.buffer.clear();

        // Only ASCII is ever pushed.
        let text = str::from_utf8(&line).unwrap_or("");
        if !text.trim().is_empty() {
            match self.executor.execute(text) {
                Ok(outcome) => write_outcome(out, &outcome, self.executor.target())?,
                Err(error) => write_error(out, &error)?,
            }
        }
        out.write_str(PROMPT)
    }

    fn complete<W: Write>(&mut self, out: &mut W) -> fmt::Result {
        let text = str::from_utf8(&self.buffer).unwrap_or("");
        let result = self.completion.complete(text, text.len());

        if let Some(replacement) = result.replacement {
            for _ in replacement.start..replacement.end {
                self.buffer.pop();
                out.write_str("\x08 \x08")?;
            }
            for byte in replacement.value.bytes() {
                if self.buffer.push(byte).is_ok() {
                    out.write_char(char::from(byte))?;
                }
            }
            if replacement.append_space && self.buffer.push(b' ').is_ok() {
                out.write_char(' ')?;
            }
            if result.options.len() <= 1 {
                return Ok(());
            }
        }

        if result.options.len() > 1 {
            out.write_str("\r\n")?;
            for (index, option) in result.options.iter().enumerate() {
                if index > 0 {
                    out.write_char(' ')?;
                }
                out.write_str(option)?;
            }
            out.write_str("\r\n")?;
            out.write_str(PROMPT)?;
            out.write_str(str::from_utf8(&self.buffer).unwrap_or(""))?;
        }
        Ok(())
    }
}
