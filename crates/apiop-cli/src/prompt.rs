//! Terminal prompts

use std::io::{BufRead, Write};

use console::{Term, style};

use apiop_core::{CredentialError, Password, Prompter};

/// Prompts on stderr, reading answers from stdin
///
/// End of input, or a prompt that cannot be written, cancels the prompt.
pub struct TerminalPrompter {
    term: Term,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self { term: Term::stderr() }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for TerminalPrompter {
    fn select(&mut self, prompt: &str, options: &[&str]) -> Result<usize, CredentialError> {
        choose(&mut self.term, &mut std::io::stdin().lock(), prompt, options)
    }

    fn input(&mut self, prompt: &str) -> Result<String, CredentialError> {
        ask(&mut self.term, &mut std::io::stdin().lock(), prompt)
    }

    fn password(&mut self, prompt: &str) -> Result<Password, CredentialError> {
        rpassword::prompt_password(format!("{} {}: ", style("?").cyan().bold(), prompt))
            .map(Password::new)
            .map_err(|_| CredentialError::PromptCancelled)
    }
}

fn say(out: &mut dyn Write, line: &str) -> Result<(), CredentialError> {
    writeln!(out, "{line}").map_err(|_| CredentialError::PromptCancelled)
}

fn ask(out: &mut dyn Write, input: &mut dyn BufRead, prompt: &str) -> Result<String, CredentialError> {
    write!(out, "{} {}: ", style("?").cyan().bold(), prompt)
        .and_then(|()| out.flush())
        .map_err(|_| CredentialError::PromptCancelled)?;

    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => Err(CredentialError::PromptCancelled),
        Ok(_) => Ok(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

/// Numbered menu, asked again until the answer is in range
fn choose(
    out: &mut dyn Write,
    input: &mut dyn BufRead,
    prompt: &str,
    options: &[&str],
) -> Result<usize, CredentialError> {
    say(out, &format!("{} {}", style("?").cyan().bold(), prompt))?;
    for (i, option) in options.iter().enumerate() {
        say(out, &format!("  {}) {}", i + 1, option))?;
    }

    loop {
        let answer = ask(out, input, "Enter choice")?;
        match answer.trim().parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
            _ => say(
                out,
                &format!(
                    "  {} choose a number between 1 and {}",
                    style("!").yellow(),
                    options.len()
                ),
            )?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const OPTIONS: [&str; 3] = ["DOCKER_HUB", "AMAZON_ECR", "GCR"];

    /// Writer whose every write fails, like a closed stderr
    struct ClosedOutput;

    impl Write for ClosedOutput {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn test_choose_asks_again_until_in_range() {
        let mut out = Vec::new();
        let mut input = Cursor::new("9\nsecond\n2\n");

        let choice = choose(&mut out, &mut input, "Registry type", &OPTIONS).unwrap();

        assert_eq!(choice, 1);
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("3) GCR"));
        assert_eq!(shown.matches("between 1 and 3").count(), 2);
    }

    #[test]
    fn test_choose_cancelled_on_end_of_input() {
        let mut out = Vec::new();
        let mut input = Cursor::new("0\n");

        let err = choose(&mut out, &mut input, "Registry type", &OPTIONS).unwrap_err();
        assert!(matches!(err, CredentialError::PromptCancelled));
    }

    #[test]
    fn test_choose_cancelled_when_output_closed() {
        let mut input = Cursor::new("1\n");

        let err = choose(&mut ClosedOutput, &mut input, "Registry type", &OPTIONS).unwrap_err();
        assert!(matches!(err, CredentialError::PromptCancelled));
        assert_eq!(input.position(), 0, "no answer is read without a visible prompt");
    }

    #[test]
    fn test_ask_strips_line_ending() {
        let mut out = Vec::new();
        let mut input = Cursor::new("myorg\r\n");

        assert_eq!(ask(&mut out, &mut input, "Repository").unwrap(), "myorg");
    }
}
