//! Prompting seam for interactive installation
//!
//! The terminal implementation lives in the CLI; [`ScriptedPrompter`] replays
//! canned answers so interactive flows can be tested without a TTY.

use std::collections::VecDeque;

use crate::credentials::Password;
use crate::error::CredentialError;

/// Source of interactive answers
///
/// Every method returns [`CredentialError::PromptCancelled`] when the user
/// aborts (EOF, interrupt), which aborts the whole installation.
pub trait Prompter {
    /// Choose one of `options`, returning its index
    fn select(&mut self, prompt: &str, options: &[&str]) -> Result<usize, CredentialError>;

    /// Read a line of visible input
    fn input(&mut self, prompt: &str) -> Result<String, CredentialError>;

    /// Read a line of masked input
    fn password(&mut self, prompt: &str) -> Result<Password, CredentialError>;
}

/// A canned answer for [`ScriptedPrompter`]
#[derive(Debug, Clone)]
pub enum Answer {
    Select(usize),
    Text(String),
    Cancel,
}

/// Prompter that replays a fixed list of answers
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<Answer>,
    /// Prompts shown so far, in order
    pub asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    /// Remaining unanswered entries
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next(&mut self, prompt: &str) -> Result<Answer, CredentialError> {
        self.asked.push(prompt.to_string());
        match self.answers.pop_front() {
            Some(Answer::Cancel) | None => Err(CredentialError::PromptCancelled),
            Some(answer) => Ok(answer),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn select(&mut self, prompt: &str, options: &[&str]) -> Result<usize, CredentialError> {
        match self.next(prompt)? {
            Answer::Select(i) if i < options.len() => Ok(i),
            _ => Err(CredentialError::PromptCancelled),
        }
    }

    fn input(&mut self, prompt: &str) -> Result<String, CredentialError> {
        match self.next(prompt)? {
            Answer::Text(text) => Ok(text),
            _ => Err(CredentialError::PromptCancelled),
        }
    }

    fn password(&mut self, prompt: &str) -> Result<Password, CredentialError> {
        self.input(prompt).map(Password::new)
    }
}
