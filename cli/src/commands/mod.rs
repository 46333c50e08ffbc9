//! The shell command table, built explicitly at startup.
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::{CommandError, Shell};

mod execution;
mod files;
mod graph;
mod impressions;
mod navigation;
mod runners;

/// Runs a command with its arguments, returning the lines to print.
pub type Handler = fn(&mut Shell, &[String]) -> Result<Vec<String>, CommandError>;

#[derive(Clone)]
pub struct Command {
    pub name: &'static str,
    pub args: &'static str,
    pub summary: &'static str,
    /// Accepted number of arguments.
    pub arity: RangeInclusive<usize>,
    pub run: Handler,
}

impl Command {
    pub fn usage(&self) -> String {
        if self.args.is_empty() {
            self.name.to_string()
        } else {
            format!("{} {}", self.name, self.args)
        }
    }
}

pub struct CommandTable(BTreeMap<&'static str, Command>);

impl CommandTable {
    pub fn new() -> Self {
        let mut table = Self(BTreeMap::new());
        navigation::register(&mut table);
        graph::register(&mut table);
        files::register(&mut table);
        impressions::register(&mut table);
        execution::register(&mut table);
        runners::register(&mut table);
        table
    }

    pub(crate) fn add(
        &mut self,
        name: &'static str,
        args: &'static str,
        summary: &'static str,
        arity: RangeInclusive<usize>,
        run: Handler,
    ) {
        let previous = self.0.insert(
            name,
            Command {
                name,
                args,
                summary,
                arity,
                run,
            },
        );
        debug_assert!(previous.is_none(), "command {} registered twice", name);
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }

    /// One line per command, sorted by name.
    pub fn help(&self) -> Vec<String> {
        let width = self.0.values().map(|c| c.usage().len()).max().unwrap_or(0);
        let mut lines: Vec<String> = self
            .0
            .values()
            .map(|c| format!("  {:<width$}  {}", c.usage(), c.summary, width = width))
            .collect();
        lines.push(format!("  {:<width$}  {}", "help [command]", "show this text", width = width));
        lines.push(format!("  {:<width$}  {}", "quit", "leave the shell", width = width));
        lines
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}
