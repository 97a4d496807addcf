//! Two-step operator confirmation before any object is deleted.
//!
//! [`ConfirmationGate`] is a small state machine:
//!
//! ```text
//! Idle -> AwaitingFirstConfirmation -> AwaitingFinalConfirmation -> Confirmed
//!              |    ^                        |    ^
//!              |    +-- invalid input        |    +-- invalid input
//!              +--------- "n" ---------------+--------> Aborted
//! ```
//!
//! There is no default answer. Anything other than `y` or `n` re-asks the
//! same question. Input closing (EOF) counts as `n`.
//!
//! The gate talks to an [`Operator`], so the terminal can be swapped for a
//! [`ScriptedOperator`] in tests.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use yansi::Paint;

/// First question.
pub const FIRST_PROMPT: &str = "Do you want to delete duplicate objects (y/n): ";
/// Shown before the second question.
pub const IRREVERSIBLE_WARNING: &str = "WARNING: deleting objects is not reversible.";
/// Second question.
pub const FINAL_PROMPT: &str = "Please confirm you want to delete duplicate objects (y/n): ";

/// A yes/no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
}

impl Answer {
    /// Parse a reply line. Only `y` and `n` are accepted, surrounding
    /// whitespace ignored.
    ///
    /// ```
    /// use s3dedupe::actions::confirm::Answer;
    ///
    /// assert_eq!(Answer::parse("y\n"), Some(Answer::Yes));
    /// assert_eq!(Answer::parse("n"), Some(Answer::No));
    /// assert_eq!(Answer::parse("yes"), None);
    /// assert_eq!(Answer::parse(""), None);
    /// ```
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "y" => Some(Self::Yes),
            "n" => Some(Self::No),
            _ => None,
        }
    }
}

/// Source of operator replies.
pub trait Operator {
    /// Show `prompt` and read one reply line. `Ok(None)` means the input is
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the underlying streams.
    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Show a warning line.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the underlying stream.
    fn warn(&mut self, message: &str) -> io::Result<()>;
}

/// Operator reading replies from a line reader and writing prompts to a writer.
pub struct ConsoleOperator<R, W> {
    input: R,
    output: W,
}

impl ConsoleOperator<io::StdinLock<'static>, io::Stdout> {
    /// Operator on the process's stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleOperator<R, W> {
    #[must_use]
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Give back the output stream, e.g. to inspect what was written.
    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Operator for ConsoleOperator<R, W> {
    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(line))
    }

    fn warn(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "{}", message.yellow().bold())
    }
}

/// Operator replaying canned replies, for tests.
///
/// Once the replies run out it behaves like closed input.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    replies: VecDeque<String>,
    prompts: Vec<String>,
    warnings: Vec<String>,
}

impl ScriptedOperator {
    #[must_use]
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Prompts shown so far, in order.
    #[must_use]
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Warnings shown so far, in order.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl Operator for ScriptedOperator {
    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.replies.pop_front())
    }

    fn warn(&mut self, message: &str) -> io::Result<()> {
        self.warnings.push(message.to_string());
        Ok(())
    }
}

/// Where the gate currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    AwaitingFirstConfirmation,
    AwaitingFinalConfirmation,
    Confirmed,
    Aborted,
}

impl GateState {
    /// `Confirmed` and `Aborted` are final.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Aborted)
    }
}

/// The two-prompt confirmation state machine.
#[derive(Debug)]
pub struct ConfirmationGate {
    state: GateState,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmationGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: GateState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Feed one reply line and return the new state.
    ///
    /// From `Idle` any input just opens the first question. Replies in a
    /// terminal state are ignored.
    pub fn advance(&mut self, reply: Option<&str>) -> GateState {
        self.state = match self.state {
            GateState::Idle => GateState::AwaitingFirstConfirmation,
            GateState::AwaitingFirstConfirmation => match reply.map(Answer::parse) {
                None | Some(Some(Answer::No)) => GateState::Aborted,
                Some(Some(Answer::Yes)) => GateState::AwaitingFinalConfirmation,
                Some(None) => GateState::AwaitingFirstConfirmation,
            },
            GateState::AwaitingFinalConfirmation => match reply.map(Answer::parse) {
                None | Some(Some(Answer::No)) => GateState::Aborted,
                Some(Some(Answer::Yes)) => GateState::Confirmed,
                Some(None) => GateState::AwaitingFinalConfirmation,
            },
            terminal => terminal,
        };
        self.state
    }

    /// Ask both questions through `operator` until a terminal state.
    ///
    /// Returns `true` only when both answers were `y`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the operator.
    pub fn run<O: Operator + ?Sized>(&mut self, operator: &mut O) -> io::Result<bool> {
        if self.state == GateState::Idle {
            self.advance(None);
        }

        while !self.state.is_terminal() {
            let reply = match self.state {
                GateState::AwaitingFirstConfirmation => operator.ask(FIRST_PROMPT)?,
                _ => {
                    operator.warn(IRREVERSIBLE_WARNING)?;
                    operator.ask(FINAL_PROMPT)?
                }
            };
            let before = self.state;
            let after = self.advance(reply.as_deref());
            if before == after {
                log::debug!("Rejected reply {:?}", reply.as_deref().map(str::trim));
            }
        }

        log::debug!("Confirmation finished in state {:?}", self.state);
        Ok(self.state == GateState::Confirmed)
    }
}
