use std::io::{self, Write};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use super::InputSource;

const CONTINUATION_PROMPT: &str = "... ";

/// Joins physical lines ending in `\` into one logical line.
#[derive(Debug, Default)]
pub struct LineAccumulator {
    buffer: String,
}

impl LineAccumulator {
    /// Adds a physical line; returns the logical line once it is complete.
    pub fn push(&mut self, line: &str) -> Option<String> {
        let line = line.trim_end_matches(['\r', '\n']);
        match line.strip_suffix('\\') {
            Some(head) => {
                self.buffer.push_str(head);
                self.buffer.push('\n');
                None
            }
            None => {
                self.buffer.push_str(line);
                Some(std::mem::take(&mut self.buffer))
            }
        }
    }

    pub fn is_continuing(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Whatever was collected before input ended.
    pub fn take(&mut self) -> Option<String> {
        let pending = std::mem::take(&mut self.buffer);
        let pending = pending.trim_end_matches('\n');
        (!pending.is_empty()).then(|| pending.to_string())
    }
}

/// Line input from stdin. Ctrl+C at the prompt ends input like EOF does.
pub struct StdinInput {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinInput {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

fn show_prompt(prompt: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "{prompt}")?;
    stdout.flush()
}

#[async_trait]
impl InputSource for StdinInput {
    async fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let mut accumulator = LineAccumulator::default();
        show_prompt(prompt)?;

        loop {
            let next = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    return Ok(None);
                }
                line = self.lines.next_line() => line?,
            };

            let Some(line) = next else {
                return Ok(accumulator.take());
            };
            if let Some(complete) = accumulator.push(&line) {
                return Ok(Some(complete));
            }
            show_prompt(CONTINUATION_PROMPT)?;
        }
    }
}
