use std::path::PathBuf;

use chern_tracing::TracingHandle;
use rustyline::{error::ReadlineError, Editor};
use tracing::warn;

use crate::Shell;

fn state_dir() -> Option<PathBuf> {
    let mut path = dirs::data_dir();
    if let Some(p) = path.as_mut() {
        p.push("chern")
    }
    path
}

pub struct Repl {
    rl: Editor<()>,
}

impl Repl {
    pub fn new() -> Result<Self, ReadlineError> {
        Ok(Self {
            rl: Editor::<()>::new()?,
        })
    }

    /// Reads lines into `shell` until `quit`, end of input or an interrupt.
    /// Output goes through the stdout writer of `tracing_handle`.
    pub fn run(&mut self, shell: &mut Shell, tracing_handle: &TracingHandle) {
        let mut stdout = tracing_handle.get_stdout_writer();
        let history_path = match state_dir() {
            // Attempt to set up these paths, but do not hard fail if it
            // doesn't work.
            Some(mut path) => {
                let _ = std::fs::create_dir_all(&path);
                path.push("history.txt");
                let _ = self.rl.load_history(&path);
                Some(path)
            }

            None => None,
        };

        while !shell.should_quit() {
            match self.rl.readline(&shell.prompt()) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    self.rl.add_history_entry(line.as_str());
                    shell.send(&line).finalize(&mut stdout);
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,

                Err(err) => {
                    eprintln!("error: {}", err);
                    break;
                }
            }
        }

        if let Some(path) = history_path {
            if let Err(e) = self.rl.save_history(&path) {
                warn!(err = %e, path = %path.display(), "unable to save history");
            }
        }
    }
}
