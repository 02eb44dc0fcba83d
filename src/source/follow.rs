use super::{Origin, Pull};
use crate::error::CopipeResult;
use crate::logger::LogLevel;
use crate::pipe_log;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// How a [`LineOrigin`] treats end of input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowMode {
    /// End of input means "not yet": keep waiting for appended lines, like `tail -f`
    #[default]
    Follow,
    /// End of input means the origin is exhausted
    UntilEof,
}

/// Line-by-line origin over a reader
///
/// Each item is one line including its trailing newline. When following, a last line
/// without a newline is held back until the rest of it is written. Bytes that are not
/// valid UTF-8 are replaced with U+FFFD rather than failing the read.
pub struct LineOrigin<R> {
    reader: R,
    mode: FollowMode,
    partial: Vec<u8>,
    label: String,
}

impl<R: BufRead> LineOrigin<R> {
    pub fn new(reader: R, mode: FollowMode) -> Self {
        Self {
            reader,
            mode,
            partial: Vec::new(),
            label: "line reader".to_string(),
        }
    }

    pub fn mode(&self) -> FollowMode {
        self.mode
    }

    fn end_of_input(&mut self) -> Pull<String> {
        match self.mode {
            FollowMode::Follow => Pull::Pending,
            FollowMode::UntilEof if !self.partial.is_empty() => Pull::Item(self.take_line()),
            FollowMode::UntilEof => Pull::Exhausted,
        }
    }

    fn take_line(&mut self) -> String {
        let bytes = std::mem::take(&mut self.partial);
        match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(e) => {
                pipe_log!(
                    LogLevel::Warn,
                    "source::follow",
                    "Invalid UTF-8 in a line of {}; replacing bad bytes",
                    self.label
                );
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        }
    }
}

impl LineOrigin<BufReader<File>> {
    /// Open a file, optionally positioned at its current end so only new lines are read
    pub fn open(path: impl AsRef<Path>, mode: FollowMode, from_end: bool) -> CopipeResult<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        if from_end {
            file.seek(SeekFrom::End(0))?;
        }

        let mut origin = Self::new(BufReader::new(file), mode);
        origin.label = path.display().to_string();
        Ok(origin)
    }
}

impl<R: BufRead> Origin<String> for LineOrigin<R> {
    fn pull(&mut self) -> CopipeResult<Pull<String>> {
        loop {
            let read = self.reader.read_until(b'\n', &mut self.partial)?;
            if read == 0 {
                return Ok(self.end_of_input());
            }

            if self.partial.ends_with(b"\n") {
                return Ok(Pull::Item(self.take_line()));
            }

            // Line cut short by end of input
            if self.mode == FollowMode::Follow {
                return Ok(Pull::Pending);
            }
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
