use super::{HasArcs, HasImpression, ObjectHandle};
use crate::config::YamlFile;
use crate::object::task::DEFAULT_ENVIRONMENT;
use crate::Error;

/// Code shared by tasks: an environment and the commands running it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Algorithm(pub(crate) ObjectHandle);

impl HasArcs for Algorithm {
    fn as_arcs(&self) -> &dyn HasArcs {
        self
    }
}

impl HasImpression for Algorithm {
    fn as_impressible(&self) -> &dyn HasImpression {
        self
    }
}

impl Algorithm {
    pub fn settings(&self) -> YamlFile {
        self.0.yaml_file()
    }

    pub fn environment(&self) -> Result<String, Error> {
        Ok(self
            .settings()
            .read_variable("environment")?
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()))
    }

    pub fn set_environment(&self, environment: &str) -> Result<(), Error> {
        self.settings().write_variable("environment", environment)
    }

    pub fn commands(&self) -> Result<Vec<String>, Error> {
        self.settings().read_or_default("commands")
    }

    pub fn add_command(&self, command: &str) -> Result<(), Error> {
        let yaml = self.settings();
        yaml.update(|table| {
            let mut commands: Vec<String> = yaml.get_from(table, "commands")?;
            commands.push(command.to_string());
            yaml.set_in(table, "commands", &commands)
        })
    }

    /// Tasks using this algorithm.
    pub fn users(&self) -> Result<Vec<String>, Error> {
        self.successor_paths()
    }
}
