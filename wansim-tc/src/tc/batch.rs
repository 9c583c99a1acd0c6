//! Building `tc` batch scripts.
//!
//! Every change to an interface is expressed as "delete the root qdisc, then optionally add a
//! netem root qdisc". Deleting first makes the sequence converge to the same state regardless
//! of what was installed before, and a clear is simply the delete without the add.

use std::fmt;

use super::impairment::Impairment;

/// A single line of a `tc` batch script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QdiscCommand {
    /// `qdisc del dev <dev> root`
    DeleteRoot {
        /// Target interface.
        dev: String,
    },
    /// `qdisc add dev <dev> root netem <impairment>`
    AddNetemRoot {
        /// Target interface.
        dev: String,
        /// The netem parameters.
        impairment: Impairment,
    },
}

impl QdiscCommand {
    /// The interface this command targets.
    pub fn dev(&self) -> &str {
        match self {
            Self::DeleteRoot { dev } | Self::AddNetemRoot { dev, .. } => dev,
        }
    }

    /// Returns `true` for a root qdisc delete.
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::DeleteRoot { .. })
    }
}

impl fmt::Display for QdiscCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteRoot { dev } => write!(f, "qdisc del dev {dev} root"),
            Self::AddNetemRoot { dev, impairment } => {
                write!(f, "qdisc add dev {dev} root netem {impairment}")
            }
        }
    }
}

/// An ordered list of [`QdiscCommand`]s submitted together as one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSequence {
    commands: Vec<QdiscCommand>,
}

impl CommandSequence {
    /// An empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the commands bringing `dev` to `impairment`.
    pub fn impair(mut self, dev: &str, impairment: Impairment) -> Self {
        self.push_impair(dev, impairment);
        self
    }

    /// Appends the delete-only clause for `dev`.
    pub fn clear(mut self, dev: &str) -> Self {
        self.push_clear(dev);
        self
    }

    /// In-place variant of [`CommandSequence::impair`].
    pub fn push_impair(&mut self, dev: &str, impairment: Impairment) {
        self.push_clear(dev);
        self.commands.push(QdiscCommand::AddNetemRoot { dev: dev.to_string(), impairment });
    }

    /// In-place variant of [`CommandSequence::clear`].
    pub fn push_clear(&mut self, dev: &str) {
        self.commands.push(QdiscCommand::DeleteRoot { dev: dev.to_string() });
    }

    /// The commands, in submission order.
    pub fn commands(&self) -> &[QdiscCommand] {
        &self.commands
    }

    /// Returns `true` if there is nothing to submit.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of script lines.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Renders the batch script, one command per line.
    pub fn to_script(&self) -> String {
        let mut script = String::new();
        for cmd in &self.commands {
            script.push_str(&cmd.to_string());
            script.push('\n');
        }
        script
    }

    /// Maps a `tc -batch` stderr report back to the commands that failed.
    ///
    /// `tc` reports each failed line as `Command failed <file>:<line>`, with 1-based line
    /// numbers. Returns `None` if the report names no line of this sequence.
    pub fn failed_commands(&self, stderr: &str) -> Option<Vec<&QdiscCommand>> {
        let failed: Vec<_> = stderr
            .lines()
            .filter_map(|line| line.trim().strip_prefix("Command failed "))
            .filter_map(|loc| loc.rsplit_once(':'))
            .filter_map(|(_, n)| n.trim().parse::<usize>().ok())
            .filter_map(|n| n.checked_sub(1).and_then(|i| self.commands.get(i)))
            .collect();

        (!failed.is_empty()).then_some(failed)
    }
}

/// Builds the sequence bringing `dev` to `impairment` from any prior state.
pub fn build(dev: &str, impairment: Impairment) -> CommandSequence {
    CommandSequence::new().impair(dev, impairment)
}

/// Builds the delete-only sequence for `dev`.
pub fn clear(dev: &str) -> CommandSequence {
    CommandSequence::new().clear(dev)
}
