use std::collections::BTreeMap;

use tracing::debug;

use super::{Algorithm, HasArcs, HasConfig, HasImpression, Node, ObjectHandle};
use crate::config::YamlFile;
use crate::fsutil::is_identifier;
use crate::Error;

pub const DEFAULT_ENVIRONMENT: &str = "reanahub/reana-env-root6:6.18.04";
pub const DEFAULT_MEMORY_LIMIT: &str = "256Mi";
/// Environment marking a task whose execution is a data upload.
pub const RAWDATA_ENVIRONMENT: &str = "rawdata";

/// A unit of work: parameters, an environment, one optional algorithm and
/// any number of aliased task inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task(pub(crate) ObjectHandle);

impl HasArcs for Task {
    fn as_arcs(&self) -> &dyn HasArcs {
        self
    }
}

impl HasImpression for Task {
    fn as_impressible(&self) -> &dyn HasImpression {
        self
    }
}

impl Task {
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

    pub fn is_rawdata(&self) -> Result<bool, Error> {
        Ok(self.environment()? == RAWDATA_ENVIRONMENT)
    }

    pub fn memory_limit(&self) -> Result<String, Error> {
        Ok(self
            .settings()
            .read_variable("kubernetes_memory_limit")?
            .unwrap_or_else(|| DEFAULT_MEMORY_LIMIT.to_string()))
    }

    pub fn set_memory_limit(&self, limit: &str) -> Result<(), Error> {
        self.settings()
            .write_variable("kubernetes_memory_limit", limit)
    }

    /// Parameters from `chern.yaml`. Non-string values written by hand are rendered as YAML scalars.
    pub fn parameters(&self) -> Result<BTreeMap<String, String>, Error> {
        let raw: BTreeMap<String, serde_json::Value> =
            self.settings().read_or_default("parameters")?;
        Ok(raw
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect())
    }

    pub fn add_parameter(&self, key: &str, value: &str) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::InvalidTarget("parameter name is empty".into()));
        }
        let yaml = self.settings();
        yaml.update(|table| {
            let mut parameters: BTreeMap<String, serde_json::Value> =
                yaml.get_from(table, "parameters")?;
            parameters.insert(key.to_string(), serde_json::Value::String(value.to_string()));
            yaml.set_in(table, "parameters", &parameters)
        })
    }

    pub fn remove_parameter(&self, key: &str) -> Result<(), Error> {
        let yaml = self.settings();
        yaml.update(|table| {
            let mut parameters: BTreeMap<String, serde_json::Value> =
                yaml.get_from(table, "parameters")?;
            if parameters.remove(key).is_none() {
                return Err(Error::InvalidTarget(format!("no parameter named {}", key)));
            }
            yaml.set_in(table, "parameters", &parameters)
        })
    }

    pub fn auto_download(&self) -> Result<bool, Error> {
        self.config_file().read_or_default("auto_download")
    }

    pub fn set_auto_download(&self, enabled: bool) -> Result<(), Error> {
        self.config_file().write_variable("auto_download", &enabled)
    }

    pub fn default_runner(&self) -> Result<String, Error> {
        Ok(self
            .config_file()
            .read_variable::<String>("default_runner")?
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "local".to_string()))
    }

    pub fn set_default_runner(&self, runner: &str) -> Result<(), Error> {
        self.config_file().write_variable("default_runner", runner)
    }

    /// MD5 of the data directory last sent for a rawdata task.
    pub fn input_md5(&self) -> Result<Option<String>, Error> {
        Ok(self
            .config_file()
            .read_variable::<String>("input_md5")?
            .filter(|md5| !md5.is_empty()))
    }

    pub fn set_input_md5(&self, md5: &str) -> Result<(), Error> {
        self.config_file().write_variable("input_md5", md5)
    }

    /// The `alias` order list of `chern.yaml`.
    pub fn alias_order(&self) -> Result<Vec<String>, Error> {
        self.settings().read_or_default("alias")
    }

    /// Aliased inputs, in `alias` list order followed by any alias missing from it.
    pub fn inputs(&self) -> Result<Vec<(String, Node)>, Error> {
        let mut alias_to_path = self.alias_to_path()?;
        let mut inputs = Vec::new();
        for alias in self.alias_order()? {
            if let Some(path) = alias_to_path.remove(&alias) {
                inputs.push((alias, Node::from_handle(self.0.sibling(&path))));
            }
        }
        for (alias, path) in alias_to_path {
            inputs.push((alias, Node::from_handle(self.0.sibling(&path))));
        }
        Ok(inputs)
    }

    /// Adds the task `input` as a predecessor known as `alias`. An alias already
    /// bound to another input is rebound, dropping the old arc.
    pub fn add_input(&self, input: &Node, alias: &str) -> Result<(), Error> {
        let Node::Task(input) = input else {
            return Err(Error::InvalidTarget(format!("{} is not a task", input)));
        };
        if !is_identifier(alias) {
            return Err(Error::ConstraintViolation(format!(
                "{} is not a valid alias",
                alias
            )));
        }

        let input_path = input.invariant_path();
        let previous = self.path_of(alias)?;
        if previous.as_deref() == Some(input_path.as_str()) {
            return Err(Error::ConstraintViolation(format!(
                "{} is already the input {}",
                input.handle(),
                alias
            )));
        }
        self.check_arc_from(input)?;

        if let Some(previous) = previous {
            debug!(alias, from = %previous, to = %input_path, "rebinding input");
            match Node::from_handle(self.0.sibling(&previous)).as_arcs() {
                Some(old) => self.remove_arc_from(old, false)?,
                None => self.unlink_predecessor(&previous)?,
            }
        }
        self.add_arc_from(input)?;
        self.set_alias(alias, &input_path)
    }

    pub fn remove_input(&self, alias: &str) -> Result<(), Error> {
        let path = self
            .path_of(alias)?
            .ok_or_else(|| Error::InvalidTarget(format!("no input named {}", alias)))?;
        match Node::from_handle(self.0.sibling(&path)).as_arcs() {
            Some(input) => self.remove_arc_from(input, false),
            None => self.unlink_predecessor(&path),
        }
    }

    pub fn algorithm(&self) -> Result<Option<Algorithm>, Error> {
        Ok(self.predecessors()?.into_iter().find_map(|p| match p {
            Node::Algorithm(a) => Some(a),
            _ => None,
        }))
    }

    /// Makes `algorithm` the algorithm of this task, replacing the current one.
    pub fn add_algorithm(&self, algorithm: &Node) -> Result<(), Error> {
        let Node::Algorithm(algorithm) = algorithm else {
            return Err(Error::InvalidTarget(format!(
                "{} is not an algorithm",
                algorithm
            )));
        };
        if self.is_rawdata()? {
            return Err(Error::InvalidTarget(format!(
                "{} holds raw data and takes no algorithm",
                self.0
            )));
        }
        let current = self.algorithm()?;
        if current.as_ref() == Some(algorithm) {
            return Ok(());
        }
        let replaced = current.as_ref().map(|c| c.invariant_path());
        self.check_arc_replacing(algorithm, replaced.as_deref())?;
        if let Some(current) = &current {
            self.remove_arc_from(current, false)?;
        }
        self.add_arc_from(algorithm)
    }

    pub fn remove_algorithm(&self) -> Result<(), Error> {
        match self.algorithm()? {
            Some(current) => self.remove_arc_from(&current, false),
            None => Err(Error::InvalidTarget(format!(
                "{} has no algorithm",
                self.0
            ))),
        }
    }

    /// Rewrites the `alias` order list to the aliases actually bound, keeping their order.
    pub(crate) fn sync_alias_order(&self) -> Result<(), Error> {
        let bound = self.alias_to_path()?;
        let yaml = self.settings();
        yaml.update(|table| {
            let mut order: Vec<String> = yaml.get_from(table, "alias")?;
            order.retain(|alias| bound.contains_key(alias));
            for alias in bound.keys() {
                if !order.contains(alias) {
                    order.push(alias.clone());
                }
            }
            yaml.set_in(table, "alias", &order)
        })
    }
}
