use std::io::Write;
use std::process::ExitCode;

use chern_cli::args::Commands;
use chern_cli::{Args, Repl, Shell};
use chern_store::config::LocalConfig;
use chern_store::object::{create_project, Project};
use chern_store::Session;
use clap::Parser;
use tracing::debug;

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let tracing_handle = chern_tracing::TracingBuilder::default()
        .level(args.log_level)
        .enable_progressbar()
        .build()?;
    let mut stdout = tracing_handle.get_stdout_writer();

    let tokio_runtime = tokio::runtime::Runtime::new()?;
    let local_config = match &args.config_dir {
        Some(dir) => LocalConfig::at(dir),
        None => LocalConfig::open_default()?,
    };
    let session = Session::new(tokio_runtime.handle().clone(), local_config);
    let current_dir = std::env::current_dir()?;

    match &args.subcommand {
        Some(Commands::Init { name }) => {
            let name = match name {
                Some(name) => name.clone(),
                None => current_dir
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .ok_or("the current directory has no name, pass one to chern init")?,
            };
            let project = create_project(session.local_config(), &name, &current_dir)?;
            writeln!(
                stdout,
                "created project {} at {}",
                name,
                project.root().display()
            )?;
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::Use { path }) => {
            let project = Project::open(&current_dir.join(path))?;
            let name = project.name();
            session
                .local_config()
                .register_project(&name, project.root())?;
            session.local_config().set_current_project(&name)?;
            writeln!(stdout, "using project {}", name)?;
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::Projects) => {
            let current = session.local_config().current_project()?;
            for (name, path) in session.local_config().projects()? {
                let marker = if current.as_deref() == Some(name.as_str()) {
                    '*'
                } else {
                    ' '
                };
                writeln!(stdout, "{} {}: {}", marker, name, path.display())?;
            }
            return Ok(ExitCode::SUCCESS);
        }
        None => {}
    }

    // Inside a project the shell starts where the user is, otherwise at the
    // root of the current project.
    let mut shell = match Project::containing(&current_dir) {
        Ok(project) => {
            debug!(root = %project.root().display(), "starting inside a project");
            Shell::at(session, args.dite_timeout(), Some(current_dir))
        }
        Err(_) => Shell::new(session, args.dite_timeout())?,
    };

    if let Some(line) = &args.command {
        return Ok(if shell.send(line).finalize(&mut stdout) {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    Repl::new()?.run(&mut shell, &tracing_handle);
    Ok(ExitCode::SUCCESS)
}
