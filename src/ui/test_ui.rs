//! Test utilities for UI testing

use crate::error::Result;
use crate::ui::UI;
use std::collections::VecDeque;

/// A UI implementation for testing that captures output in vectors and
/// answers prompts from a queue
pub struct TestUI {
    pub output: Vec<String>,
    pub errors: Vec<String>,
    pub bytes_output: Vec<Vec<u8>>,
    pub questions: Vec<String>,
    pub answers: VecDeque<bool>,
}

impl TestUI {
    pub fn new() -> Self {
        TestUI {
            output: Vec::new(),
            errors: Vec::new(),
            bytes_output: Vec::new(),
            questions: Vec::new(),
            answers: VecDeque::new(),
        }
    }

    /// Queue up answers for ask_yes_no; once exhausted, prompts fall back
    /// to their default.
    pub fn with_answers(answers: &[bool]) -> Self {
        let mut ui = Self::new();
        ui.answers = answers.iter().copied().collect();
        ui
    }

    /// All captured byte output as one string.
    pub fn captured_text(&self) -> String {
        let bytes: Vec<u8> = self.bytes_output.iter().flatten().copied().collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Default for TestUI {
    fn default() -> Self {
        Self::new()
    }
}

impl UI for TestUI {
    fn output(&mut self, message: &str) -> Result<()> {
        self.output.push(message.to_string());
        Ok(())
    }

    fn error(&mut self, message: &str) -> Result<()> {
        self.errors.push(message.to_string());
        Ok(())
    }

    fn warning(&mut self, message: &str) -> Result<()> {
        self.errors.push(format!("Warning: {}", message));
        Ok(())
    }

    fn ask_yes_no(&mut self, prompt: &str, default: bool) -> Result<bool> {
        self.questions.push(prompt.to_string());
        Ok(self.answers.pop_front().unwrap_or(default))
    }

    fn output_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.bytes_output.push(bytes.to_vec());
        Ok(())
    }
}
