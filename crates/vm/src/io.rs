use quill_core::VMError;
use std::fmt::{Debug, Formatter};
use std::io::{BufRead, BufReader, Cursor, Write};
use std::sync::{Arc, Mutex, PoisonError};

pub type Input = Arc<Mutex<dyn BufRead + Send>>;
pub type Output = Arc<Mutex<dyn Write + Send>>;

/// Standard streams handed to a running program.
#[derive(Clone)]
pub struct VMIo {
    stdin: Input,
    stdout: Output,
    stderr: Output,
}

impl Default for VMIo {
    fn default() -> Self {
        VMIo {
            stdin: Arc::new(Mutex::new(BufReader::new(std::io::stdin()))),
            stdout: Arc::new(Mutex::new(std::io::stdout())),
            stderr: Arc::new(Mutex::new(std::io::stderr())),
        }
    }
}

impl Debug for VMIo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "VMIo")
    }
}

fn io_error(e: std::io::Error) -> VMError {
    VMError::RuntimeError(format!("IO failed: {e}"))
}

impl VMIo {
    pub fn new(stdin: Input, stdout: Output, stderr: Output) -> Self {
        VMIo {
            stdin,
            stdout,
            stderr,
        }
    }

    /// In-memory streams, `input` is served to reads and writes land in the returned buffers.
    pub fn captured(input: &str) -> (Self, CapturedOutput, CapturedOutput) {
        let stdout = CapturedOutput::default();
        let stderr = CapturedOutput::default();
        let io = VMIo {
            stdin: Arc::new(Mutex::new(Cursor::new(input.as_bytes().to_vec()))),
            stdout: Arc::new(Mutex::new(stdout.clone())),
            stderr: Arc::new(Mutex::new(stderr.clone())),
        };
        (io, stdout, stderr)
    }

    pub fn write_line(&self, line: &str) -> Result<(), VMError> {
        let mut out = self.stdout.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}").map_err(io_error)
    }

    pub fn error_line(&self, line: &str) -> Result<(), VMError> {
        let mut err = self.stderr.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(err, "{line}").map_err(io_error)
    }

    /// Next line without its terminator, `None` at end of input.
    pub fn read_line(&self) -> Result<Option<String>, VMError> {
        let mut line = String::new();
        let read = self
            .stdin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read_line(&mut line)
            .map_err(io_error)?;
        if read == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}

#[derive(Clone, Debug, Default)]
pub struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

impl CapturedOutput {
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test(unsupported = test)]
    fn captured_round_trip() {
        let (io, out, err) = VMIo::captured("first\r\nsecond");
        assert_eq!(io.read_line(), Ok(Some("first".to_string())));
        assert_eq!(io.read_line(), Ok(Some("second".to_string())));
        assert_eq!(io.read_line(), Ok(None));
        io.write_line("hello").unwrap();
        io.error_line("oops").unwrap();
        assert_eq!(out.contents(), "hello\n");
        assert_eq!(err.contents(), "oops\n");
    }
}
