//! Interactive confirmation of table removal
//!
//! Removing tables is the only destructive step that asks first. The
//! confirmer walks an explicit state machine over the removal candidates
//! and resolves to a [`TableRemoval`]; it never touches the database.

use dialoguer::Input;

use crate::error::{Error, Result};
use crate::schema::types::ExistingTable;

/// The outcome of the confirmation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRemoval {
    /// Remove nothing
    Skip,
    /// Remove each listed table with its own statement
    OneByOne(Vec<ExistingTable>),
    /// Remove every listed table with one statement per module
    All(Vec<ExistingTable>),
}

impl TableRemoval {
    pub fn tables(&self) -> &[ExistingTable] {
        match self {
            TableRemoval::Skip => &[],
            TableRemoval::OneByOne(tables) | TableRemoval::All(tables) => tables,
        }
    }

    pub fn is_batched(&self) -> bool {
        matches!(self, TableRemoval::All(_))
    }
}

/// Source of answers for the confirmer
pub trait LineReader {
    /// Ask `prompt` and return the answer, or `None` once input is exhausted
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;

    /// Show an informational line to the user
    fn show(&mut self, message: &str);
}

/// Reads answers from the terminal
#[derive(Debug, Default)]
pub struct TerminalLineReader;

impl LineReader for TerminalLineReader {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map(Some)
            .map_err(|e| Error::UserAbort(format!("Could not read input: {}", e)))
    }

    fn show(&mut self, message: &str) {
        println!("{}", message);
    }
}

/// Answers from a fixed script, for unattended runs and tests
#[derive(Debug, Default)]
pub struct ScriptedLineReader {
    answers: std::collections::VecDeque<String>,
    pub prompts: Vec<String>,
    pub output: Vec<String>,
}

impl ScriptedLineReader {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
            output: Vec::new(),
        }
    }
}

impl LineReader for ScriptedLineReader {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.answers.pop_front())
    }

    fn show(&mut self, message: &str) {
        self.output.push(message.to_string());
    }
}

const MAIN_PROMPT: &str = "How would you like to proceed?
    - Type 'y' to confirm & remove one-by-one;
    - Type 'all' to remove all;
    - Type 'none' to skip removing any tables;
    - Type 'list' to show tables that will be removed (y|all|none|list)";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfirmState {
    Prompting,
    Listing,
    ConfirmingEach {
        next: usize,
        approved: Vec<ExistingTable>,
    },
    Resolved(TableRemoval),
}

/// Decide which removal candidates to drop
pub fn confirm_removal<R: LineReader + ?Sized>(
    candidates: &[ExistingTable],
    skip_user_prompts: bool,
    reader: &mut R,
) -> Result<TableRemoval> {
    if candidates.is_empty() {
        tracing::info!("There are no tables to remove");
        return Ok(TableRemoval::Skip);
    }

    if skip_user_prompts {
        tracing::info!(
            candidates = candidates.len(),
            "Skipping table removal, prompts are disabled"
        );
        return Ok(TableRemoval::Skip);
    }

    reader.show(&format!(
        "Removing tables that are not defined in the provided data model...\n{} tables should be removed.",
        candidates.len()
    ));

    let mut state = ConfirmState::Prompting;
    loop {
        state = match state {
            ConfirmState::Prompting => {
                let answer = ask(reader, MAIN_PROMPT)?;
                match answer.as_str() {
                    "y" | "yes" => ConfirmState::ConfirmingEach {
                        next: 0,
                        approved: Vec::new(),
                    },
                    "all" => ConfirmState::Resolved(TableRemoval::All(candidates.to_vec())),
                    "none" => ConfirmState::Resolved(TableRemoval::Skip),
                    "list" => ConfirmState::Listing,
                    _ => {
                        reader.show("Invalid selection. Please try again.");
                        ConfirmState::Prompting
                    }
                }
            }
            ConfirmState::Listing => {
                for table in candidates {
                    reader.show(&format!("{} ({})", table.name, table.table_type));
                }
                ConfirmState::Prompting
            }
            ConfirmState::ConfirmingEach { next, mut approved } => match candidates.get(next) {
                None => ConfirmState::Resolved(TableRemoval::OneByOne(approved)),
                Some(table) => {
                    let answer = ask(reader, &format!("Drop table '{}'? (y/n)", table.name))?;
                    match answer.as_str() {
                        "y" | "yes" => {
                            approved.push(table.clone());
                            ConfirmState::ConfirmingEach { next: next + 1, approved }
                        }
                        "n" | "no" => ConfirmState::ConfirmingEach { next: next + 1, approved },
                        _ => {
                            reader.show("Please answer 'y' or 'n'.");
                            ConfirmState::ConfirmingEach { next, approved }
                        }
                    }
                }
            },
            ConfirmState::Resolved(removal) => return Ok(removal),
        };
    }
}

fn ask<R: LineReader + ?Sized>(reader: &mut R, prompt: &str) -> Result<String> {
    match reader.read_line(prompt)? {
        Some(answer) => Ok(answer.trim().to_lowercase()),
        None => Err(Error::UserAbort(
            "Input ended before table removal was confirmed".into(),
        )),
    }
}
