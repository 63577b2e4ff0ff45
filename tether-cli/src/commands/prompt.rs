//! Decision prompts selectable with `tether host start --approve`.

use std::io::{self, BufRead, Write};
use std::str::FromStr;

use colored::Colorize;
use tether_sync::{
    AlwaysCancel, AutoApprove, Choice, DecisionPrompt, DecisionRequest, Diagnostic, Severity,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApproveMode {
    /// Take the first offered option.
    #[default]
    Auto,
    /// Refuse every batch.
    Cancel,
    /// Ask on the host's terminal.
    Ask,
}

impl FromStr for ApproveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cancel" => Ok(Self::Cancel),
            "ask" => Ok(Self::Ask),
            other => Err(format!(
                "unknown approve mode '{other}'; expected: auto, cancel, ask"
            )),
        }
    }
}

impl ApproveMode {
    pub fn prompt(self) -> Box<dyn DecisionPrompt> {
        match self {
            ApproveMode::Auto => Box::new(AutoApprove),
            ApproveMode::Cancel => Box::new(AlwaysCancel),
            ApproveMode::Ask => Box::new(TerminalPrompt::stdio()),
        }
    }
}

/// Numbered menu on a line-oriented terminal.
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompt<io::BufReader<io::Stdin>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, request: &DecisionRequest) -> io::Result<Choice> {
        let options = request.options();
        writeln!(self.output, "{}", request.message().bold())?;
        for (i, option) in options.iter().enumerate() {
            writeln!(self.output, "  {}) {}", i + 1, option)?;
        }
        write!(self.output, "choice [1-{}]: ", options.len())?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(Choice::Cancel);
        }
        let picked = line
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| options.get(i).copied());
        Ok(picked.unwrap_or(Choice::Cancel))
    }
}

impl<R: BufRead + Send, W: Write + Send> DecisionPrompt for TerminalPrompt<R, W> {
    fn choose(&mut self, request: &DecisionRequest) -> Choice {
        self.ask(request).unwrap_or(Choice::Cancel)
    }

    fn report(&mut self, diagnostics: &[Diagnostic]) {
        for d in diagnostics {
            let line = match d.severity {
                Severity::Warning => d.to_string().yellow(),
                Severity::Error => d.to_string().red(),
            };
            let _ = writeln!(self.output, "{line}");
        }
    }
}
