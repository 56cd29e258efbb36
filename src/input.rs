use std::collections::VecDeque;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::Result;

/// One read from the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    /// Ctrl-C at the prompt.
    Interrupted,
    /// Ctrl-D or closed stdin.
    Eof,
}

/// Where operator lines come from.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Result<Input>;
}

/// Interactive line editor with history.
pub struct Editor {
    rl: DefaultEditor,
}

impl Editor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            rl: DefaultEditor::new()?,
        })
    }
}

impl LineSource for Editor {
    fn read_line(&mut self, prompt: &str) -> Result<Input> {
        match self.rl.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.rl.add_history_entry(line.as_str());
                }
                Ok(Input::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(Input::Interrupted),
            Err(ReadlineError::Eof) => Ok(Input::Eof),
            Err(err) => Err(err.into()),
        }
    }
}

/// Replays a fixed list of inputs, then reports end of input.
#[derive(Debug, Default, Clone)]
pub struct Script {
    inputs: VecDeque<Input>,
}

impl Script {
    pub fn new(inputs: impl IntoIterator<Item = Input>) -> Self {
        Self {
            inputs: inputs.into_iter().collect(),
        }
    }

    /// A script made of plain operator lines.
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(lines.into_iter().map(|line| Input::Line(line.into())))
    }

    /// Inputs not read yet.
    pub fn remaining(&self) -> usize {
        self.inputs.len()
    }
}

impl LineSource for Script {
    fn read_line(&mut self, _prompt: &str) -> Result<Input> {
        Ok(self.inputs.pop_front().unwrap_or(Input::Eof))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_ends_with_eof() {
        let mut script = Script::lines(["set 1 90"]);
        assert_eq!(script.read_line(">>> ").unwrap(), Input::Line("set 1 90".into()));
        assert_eq!(script.read_line(">>> ").unwrap(), Input::Eof);
        assert_eq!(script.read_line(">>> ").unwrap(), Input::Eof);
    }
}
