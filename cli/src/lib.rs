use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chern_dite::Dispatcher;
use chern_store::fsutil::{normalize_within, project_root_of, slash_path};
use chern_store::object::{HasImpression, Project, Task};
use chern_store::{Node, Session};
use tracing::{debug, warn};

pub mod args;
mod commands;
mod errors;
pub mod repl;

pub use args::Args;
pub use commands::{Command, CommandTable};
pub use errors::CommandError;
pub use repl::Repl;

/// A parsed line of shell input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Empty,
    Quit,
    Help(Option<String>),
    Run { name: String, args: Vec<String> },
}

impl ShellCommand {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words = split_words(line)?.into_iter();
        let Some(name) = words.next() else {
            return Ok(Self::Empty);
        };
        Ok(match name.as_str() {
            "quit" | "exit" => Self::Quit,
            "help" => Self::Help(words.next()),
            _ => Self::Run {
                name,
                args: words.collect(),
            },
        })
    }
}

/// Splits on whitespace. Single or double quotes group words.
fn split_words(line: &str) -> Result<Vec<String>, CommandError> {
    let mut words = Vec::new();
    let mut current: Option<String> = None;
    let mut quote = None;
    for c in line.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.get_or_insert_with(String::new).push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                current.get_or_insert_with(String::new);
            }
            (None, c) if c.is_whitespace() => words.extend(current.take()),
            (None, c) => current.get_or_insert_with(String::new).push(c),
        }
    }
    if quote.is_some() {
        return Err(CommandError::UnterminatedQuote(line.to_string()));
    }
    words.extend(current);
    Ok(words)
}

/// Result of one line of shell input.
pub struct CommandOutput {
    output: String,
    success: bool,
}

impl CommandOutput {
    fn from_lines(lines: Vec<String>) -> Self {
        let mut output = lines.join("\n");
        if !output.is_empty() {
            output.push('\n');
        }
        Self {
            output,
            success: true,
        }
    }

    fn from_error(error: &CommandError) -> Self {
        Self {
            output: format!("error: {}\n", error),
            success: false,
        }
    }

    /// Writes the output to `out` and returns whether the command succeeded.
    pub fn finalize(self, out: &mut impl Write) -> bool {
        if let Err(e) = out.write_all(self.output.as_bytes()) {
            warn!(err = %e, "unable to write command output");
        }
        self.success
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn success(&self) -> bool {
        self.success
    }
}

/// The shell: a [Session], a current node and the command table.
pub struct Shell {
    session: Session,
    cwd: Option<PathBuf>,
    dite_timeout: Duration,
    table: CommandTable,
    quit: bool,
}

impl Shell {
    /// A shell positioned at the root of the current project, if there is one.
    pub fn new(session: Session, dite_timeout: Duration) -> Result<Self, CommandError> {
        let cwd = session
            .current_project()?
            .map(|project| project.root().to_path_buf());
        Ok(Self::at(session, dite_timeout, cwd))
    }

    pub fn at(session: Session, dite_timeout: Duration, cwd: Option<PathBuf>) -> Self {
        Self {
            session,
            cwd,
            dite_timeout,
            table: CommandTable::new(),
            quit: false,
        }
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// True once `quit` or `exit` was sent.
    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn prompt(&self) -> String {
        match self.cwd().and_then(|cwd| self.display_path(cwd)) {
            Ok(path) => format!("chern:{}> ", path),
            Err(_) => "chern> ".to_string(),
        }
    }

    /// Runs one line of input. Every line starts a new consult, so run
    /// status answers are reused within a command but not across commands.
    pub fn send(&mut self, line: &str) -> CommandOutput {
        self.session.begin_consult();
        match self.dispatch(line) {
            Ok(lines) => CommandOutput::from_lines(lines),
            Err(e) => {
                debug!(err = ?e, line, "command failed");
                CommandOutput::from_error(&e)
            }
        }
    }

    fn dispatch(&mut self, line: &str) -> Result<Vec<String>, CommandError> {
        match ShellCommand::parse(line)? {
            ShellCommand::Empty => Ok(vec![]),
            ShellCommand::Quit => {
                self.quit = true;
                Ok(vec![])
            }
            ShellCommand::Help(None) => Ok(self.table.help()),
            ShellCommand::Help(Some(name)) => {
                let command = self
                    .table
                    .get(&name)
                    .ok_or(CommandError::UnknownCommand(name))?;
                Ok(vec![command.usage(), format!("  {}", command.summary)])
            }
            ShellCommand::Run { name, args } => {
                let command = self
                    .table
                    .get(&name)
                    .cloned()
                    .ok_or(CommandError::UnknownCommand(name))?;
                if !command.arity.contains(&args.len()) {
                    return Err(CommandError::Usage(command.usage()));
                }
                (command.run)(self, &args)
            }
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Absolute path of the current node.
    pub fn cwd(&self) -> Result<&Path, CommandError> {
        self.cwd.as_deref().ok_or(CommandError::NoProject)
    }

    pub(crate) fn set_cwd(&mut self, path: PathBuf) {
        self.cwd = Some(path);
    }

    pub(crate) fn root(&self) -> Result<PathBuf, CommandError> {
        Ok(project_root_of(self.cwd()?)?)
    }

    pub(crate) fn project(&self) -> Result<Project, CommandError> {
        Ok(Project::open(&self.root()?)?)
    }

    /// `@` for the project root, `@/<invariant path>` below it.
    pub(crate) fn display_path(&self, path: &Path) -> Result<String, CommandError> {
        let root = self.root()?;
        let relative = path.strip_prefix(&root).map(slash_path).unwrap_or_default();
        if relative.is_empty() {
            Ok("@".to_string())
        } else {
            Ok(format!("@/{}", relative))
        }
    }

    pub(crate) fn display(&self, node: &Node) -> Result<String, CommandError> {
        self.display_path(node.path())
    }

    /// Resolves a node argument: `@` is the project root, `@/<path>` is
    /// relative to it, anything else is relative to the current node.
    /// Paths may not leave the project.
    pub(crate) fn resolve(&self, arg: &str) -> Result<PathBuf, CommandError> {
        let root = self.root()?;
        let relative = if arg == "@" {
            String::new()
        } else if let Some(rest) = arg.strip_prefix("@/") {
            rest.to_string()
        } else {
            let cwd = slash_path(self.cwd()?.strip_prefix(&root).unwrap_or(Path::new("")));
            if cwd.is_empty() || Path::new(arg).is_absolute() {
                arg.to_string()
            } else {
                format!("{}/{}", cwd, arg)
            }
        };
        Ok(normalize_within(&root, &relative)?)
    }

    pub(crate) fn node_at(&self, arg: &str) -> Result<Node, CommandError> {
        Ok(Node::open(self.root()?, self.resolve(arg)?))
    }

    pub(crate) fn current_node(&self) -> Result<Node, CommandError> {
        Ok(Node::open(self.root()?, self.cwd()?))
    }

    pub(crate) fn current_task(&self) -> Result<Task, CommandError> {
        match self.current_node()? {
            Node::Task(task) => Ok(task),
            other => Err(not_a(&other, "task")),
        }
    }

    /// A path outside the graph, such as a file to import, relative to the current node.
    pub(crate) fn local_path(&self, arg: &str) -> Result<PathBuf, CommandError> {
        Ok(self.cwd()?.join(arg))
    }

    pub(crate) fn dispatcher(&self) -> Result<Dispatcher<'_>, CommandError> {
        Ok(Dispatcher::new(
            &self.session,
            &self.project()?,
            self.dite_timeout,
        )?)
    }
}

pub(crate) fn not_a(node: &Node, what: &str) -> CommandError {
    CommandError::Store(chern_store::Error::InvalidTarget(format!(
        "{} is not a {}",
        node, what
    )))
}

/// The node as a task or algorithm.
pub(crate) fn impressible(node: &Node) -> Result<&dyn HasImpression, CommandError> {
    node.as_impressible()
        .ok_or_else(|| not_a(node, "task or algorithm"))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{split_words, ShellCommand};

    #[rstest]
    #[case("", &[])]
    #[case("  ls  ", &["ls"])]
    #[case("add_input ../t1 gen", &["add_input", "../t1", "gen"])]
    #[case("add_parameter title \"two words\"", &["add_parameter", "title", "two words"])]
    #[case("add_parameter empty ''", &["add_parameter", "empty", ""])]
    fn words(#[case] line: &str, #[case] expected: &[&str]) {
        assert_eq!(expected, split_words(line).unwrap());
    }

    #[test]
    fn unterminated_quote() {
        assert!(split_words("cat \"a.py").is_err());
    }

    #[test]
    fn commands() {
        assert_eq!(ShellCommand::Quit, ShellCommand::parse("exit").unwrap());
        assert_eq!(
            ShellCommand::Help(Some("cd".into())),
            ShellCommand::parse("help cd").unwrap()
        );
        assert_eq!(
            ShellCommand::Run {
                name: "cd".into(),
                args: vec!["@".into()]
            },
            ShellCommand::parse("cd @").unwrap()
        );
    }
}
