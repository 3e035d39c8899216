//! The seam between the core and a character stream. `ConsoleIo` is
//! implemented once for real use (`StdConsoleIo`, backed by stdin/stdout
//! and a non-blocking `select` on the input descriptor) and once for tests
//! (`ScriptedIo`, a fixed input queue and a capturing output buffer).

use std::io::{self, Read, Write};

/// The character-stream surface the core needs: a non-blocking keyboard
/// poll, a blocking read, and buffered output with an explicit flush point.
pub trait ConsoleIo {
    /// Non-blocking check for whether a character is available to read.
    fn poll_keyboard(&mut self) -> bool;
    /// Read one character. May block if none is buffered.
    fn read_char(&mut self) -> u8;
    /// Queue one character of output.
    fn write_char(&mut self, byte: u8);
    /// Flush any buffered output to the underlying stream.
    fn flush_output(&mut self);
}

/// Standard input/output, with a non-blocking poll implemented via
/// `select(2)` on file descriptor 0, mirroring the reference C
/// implementation's `check_key`.
pub struct StdConsoleIo {
    stdout: io::Stdout,
}

impl StdConsoleIo {
    pub fn new() -> Self {
        StdConsoleIo {
            stdout: io::stdout(),
        }
    }

    fn stdin_ready() -> bool {
        // SAFETY: `fds` is a single, fully-initialized fd_set containing only
        // fd 0, and `timeout` is a valid zeroed `timeval` (a poll, not a wait).
        unsafe {
            let mut fds: libc::fd_set = std::mem::zeroed();
            libc::FD_ZERO(&mut fds);
            libc::FD_SET(0, &mut fds);
            let mut timeout = libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            };
            libc::select(1, &mut fds, std::ptr::null_mut(), std::ptr::null_mut(), &mut timeout) > 0
        }
    }
}

impl Default for StdConsoleIo {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleIo for StdConsoleIo {
    fn poll_keyboard(&mut self) -> bool {
        Self::stdin_ready()
    }

    fn read_char(&mut self) -> u8 {
        let mut byte = [0u8; 1];
        match io::stdin().read_exact(&mut byte) {
            Ok(()) => byte[0],
            Err(_) => 0,
        }
    }

    fn write_char(&mut self, byte: u8) {
        let _ = self.stdout.write_all(&[byte]);
    }

    fn flush_output(&mut self) {
        let _ = self.stdout.flush();
    }
}

/// A scripted adapter for tests: a fixed queue of input bytes and a
/// capturing output buffer, with no real terminal involved.
#[derive(Debug, Default)]
pub struct ScriptedIo {
    input: std::collections::VecDeque<u8>,
    pub output: Vec<u8>,
}

impl ScriptedIo {
    pub fn new(input: impl IntoIterator<Item = u8>) -> Self {
        ScriptedIo {
            input: input.into_iter().collect(),
            output: Vec::new(),
        }
    }

    pub fn output_as_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl ConsoleIo for ScriptedIo {
    fn poll_keyboard(&mut self) -> bool {
        !self.input.is_empty()
    }

    fn read_char(&mut self) -> u8 {
        self.input.pop_front().unwrap_or(0)
    }

    fn write_char(&mut self, byte: u8) {
        self.output.push(byte);
    }

    fn flush_output(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_io_drains_input_in_order() {
        let mut io = ScriptedIo::new([b'h', b'i']);
        assert!(io.poll_keyboard());
        assert_eq!(io.read_char(), b'h');
        assert!(io.poll_keyboard());
        assert_eq!(io.read_char(), b'i');
        assert!(!io.poll_keyboard());
    }

    #[test]
    fn scripted_io_captures_output() {
        let mut io = ScriptedIo::new([]);
        io.write_char(b'H');
        io.write_char(b'i');
        io.flush_output();
        assert_eq!(io.output_as_string(), "Hi");
    }
}
