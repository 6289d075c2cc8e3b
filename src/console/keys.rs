use std::collections::VecDeque;
use std::future::Future;
use std::io;

use tokio::io::{AsyncBufReadExt, BufReader, Stdin};

/// Where operator keystrokes come from.
pub trait KeySource {
    /// The next key, or `None` once input is exhausted.
    fn next_key(&mut self) -> impl Future<Output = io::Result<Option<char>>>;
}

/// Keys typed on standard input.
///
/// Terminals hand input over a line at a time, so every non-whitespace
/// character of a line is delivered as its own key, in order.
pub struct StdinKeys {
    reader: BufReader<Stdin>,
    pending: VecDeque<char>,
    line: String,
}

impl StdinKeys {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            pending: VecDeque::new(),
            line: String::new(),
        }
    }
}

impl Default for StdinKeys {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySource for StdinKeys {
    async fn next_key(&mut self) -> io::Result<Option<char>> {
        loop {
            if let Some(key) = self.pending.pop_front() {
                return Ok(Some(key));
            }
            self.line.clear();
            if self.reader.read_line(&mut self.line).await? == 0 {
                return Ok(None);
            }
            self.pending
                .extend(self.line.chars().filter(|c| !c.is_whitespace()));
        }
    }
}

/// A fixed sequence of keys, for scripted sessions and tests.
///
/// Whitespace in the script is ignored, so `"1 4 x"` is three keys.
#[derive(Debug, Clone, Default)]
pub struct ScriptedKeys {
    keys: VecDeque<char>,
}

impl ScriptedKeys {
    pub fn new(script: &str) -> Self {
        Self {
            keys: script.chars().filter(|c| !c.is_whitespace()).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.keys.len()
    }
}

impl KeySource for ScriptedKeys {
    async fn next_key(&mut self) -> io::Result<Option<char>> {
        Ok(self.keys.pop_front())
    }
}
