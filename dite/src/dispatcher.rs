//! Synchronous operations against the runner service, on behalf of a [Session].
//!
//! Transfers (deposit, submit, execute, export, runner registration) return
//! errors. Queries return a sentinel when the service cannot be reached:
//! [RunStatus::Unconnected], [UNCONNECTED_LIST] or `false`.
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use chern_store::fsutil::dir_md5;
use chern_store::impression::{pack, Impression};
use chern_store::object::{HasArcs, HasConfig, HasImpression, Project, Task};
use chern_store::{Node, Session};
use tracing::{debug, info, instrument, warn};

use crate::client::{DiteClient, DEFAULT_TIMEOUT};
use crate::status::{RunStatus, Workflow, UNCONNECTED_LIST};
use crate::Error;

/// The default runner of submissions.
pub const DEFAULT_RUNNER: &str = "local";

pub struct Dispatcher<'a> {
    session: &'a Session,
    client: DiteClient,
}

fn unconnected_list() -> Vec<String> {
    vec![UNCONNECTED_LIST.to_string()]
}

fn current_impression(node: &dyn HasImpression) -> Result<Impression, Error> {
    node.impression()?.ok_or_else(|| {
        Error::Store(chern_store::Error::NotImpressed(node.handle().to_string()))
    })
}

impl<'a> Dispatcher<'a> {
    /// A dispatcher talking to the `serverurl` of `project`.
    pub fn new(session: &'a Session, project: &Project, timeout: Duration) -> Result<Self, Error> {
        let client = DiteClient::new(&project.serverurl()?, timeout)?;
        Ok(Self { session, client })
    }

    pub fn with_default_timeout(session: &'a Session, project: &Project) -> Result<Self, Error> {
        Self::new(session, project, DEFAULT_TIMEOUT)
    }

    pub fn client(&self) -> &DiteClient {
        &self.client
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.session.tokio_handle().block_on(future)
    }

    /// Runs a query, logging and swallowing a failure into `None`.
    fn query<T>(&self, future: impl Future<Output = Result<T, Error>>) -> Option<T> {
        match self.block_on(future) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(err = %e, "DITE query failed");
                None
            }
        }
    }

    /// `ok` when the service answers, `unconnected` otherwise.
    pub fn dite_status(&self) -> String {
        self.query(self.client.dite_status())
            .unwrap_or_else(|| RunStatus::Unconnected.to_string())
    }

    pub fn is_deposited(&self, impression: &Impression) -> bool {
        self.query(self.client.deposited(impression.uuid()))
            .unwrap_or(false)
    }

    /// Impresses `node` and uploads its impression, after those of all its
    /// predecessors. Impressions the service already holds are skipped, and
    /// each impression is uploaded at most once per call.
    #[instrument(skip_all, fields(node = %node.handle()), err)]
    pub fn deposit(&self, node: &dyn HasImpression) -> Result<(), Error> {
        self.session.impress(node)?;
        self.deposit_once(node, &mut HashSet::new())
    }

    fn deposit_once(
        &self,
        node: &dyn HasImpression,
        seen: &mut HashSet<String>,
    ) -> Result<(), Error> {
        let impression = current_impression(node)?;
        if !seen.insert(impression.uuid().to_string()) {
            return Ok(());
        }
        if self.block_on(self.client.deposited(impression.uuid()))? {
            debug!(uuid = impression.uuid(), "already deposited");
            return Ok(());
        }

        for predecessor in node.predecessors()? {
            match predecessor.as_impressible() {
                Some(predecessor) => self.deposit_once(predecessor, seen)?,
                None => warn!(%predecessor, "skipping predecessor that is not a task or algorithm"),
            }
        }

        let reply = self.block_on(self.client.upload(
            &impression.tarball_path(),
            &impression.tarball_name(),
            &impression.config_path(),
        ))?;
        info!(uuid = impression.uuid(), reply = reply.trim(), "deposited");
        Ok(())
    }

    /// Deposits `node` and runs it on `runner`. A directory or the project
    /// submits every task and algorithm below it in one call.
    #[instrument(skip(self), fields(node = %node), err)]
    pub fn submit(&self, node: &Node, runner: &str) -> Result<String, Error> {
        let nodes = node.sub_objects_recursively()?;
        let impressible: Vec<&dyn HasImpression> =
            nodes.iter().filter_map(Node::as_impressible).collect();
        if impressible.is_empty() {
            return Err(Error::Store(chern_store::Error::InvalidTarget(format!(
                "nothing to submit below {}",
                node
            ))));
        }
        self.execute(&impressible, runner)
    }

    /// Deposits every node and dispatches all their impressions to `runner` at once.
    pub fn execute(&self, nodes: &[&dyn HasImpression], runner: &str) -> Result<String, Error> {
        let mut seen = HashSet::new();
        let mut uuids = Vec::new();
        for node in nodes {
            self.session.impress(*node)?;
            self.deposit_once(*node, &mut seen)?;
            uuids.push(current_impression(*node)?.uuid().to_string());
        }
        let machine = self.block_on(self.client.machine_id(runner))?;
        let reply = self.block_on(self.client.execute(&machine, &uuids))?;
        self.session.begin_consult();
        Ok(reply.trim().to_string())
    }

    pub fn kill(&self, node: &dyn HasImpression) -> Result<String, Error> {
        let impression = current_impression(node)?;
        Ok(self
            .query(self.client.kill(impression.uuid()))
            .unwrap_or_else(|| RunStatus::Unconnected.to_string()))
    }

    /// Deposits `node` and runs its impression alone on `runner`.
    #[instrument(skip(self, node), fields(node = %node.handle()), err)]
    pub fn run(&self, node: &dyn HasImpression, runner: &str) -> Result<String, Error> {
        self.deposit(node)?;
        let impression = current_impression(node)?;
        let machine = self.block_on(self.client.machine_id(runner))?;
        let reply = self.block_on(self.client.run(impression.uuid(), &machine))?;
        self.session.begin_consult();
        Ok(reply.trim().to_string())
    }

    /// Run state of `node` as `runner` itself reports it, bypassing the
    /// per-consult cache.
    pub fn runner_status(
        &self,
        node: &dyn HasImpression,
        runner: &str,
    ) -> Result<RunStatus, Error> {
        let Some(impression) = node.impression()? else {
            return Ok(RunStatus::Unsubmitted);
        };
        let reply = self
            .query(self.client.machine_id(runner))
            .and_then(|machine| self.query(self.client.run_status(impression.uuid(), &machine)));
        Ok(reply.map_or(RunStatus::Unconnected, |reply| RunStatus::parse(&reply)))
    }

    /// Asks the runner to gather the outputs of `node`.
    pub fn collect(&self, node: &dyn HasImpression) -> Result<String, Error> {
        let impression = current_impression(node)?;
        Ok(self
            .query(self.client.collect(impression.uuid()))
            .unwrap_or_else(|| RunStatus::Unconnected.to_string()))
    }

    /// Run state of the current impression of `node`, memoized for the current consult.
    pub fn status(&self, node: &dyn HasImpression) -> Result<RunStatus, Error> {
        let Some(impression) = node.impression()? else {
            return Ok(RunStatus::Unsubmitted);
        };
        let consult_id = self.session.consult_id();
        let cached = self
            .session
            .cache()
            .borrow()
            .status(node.path(), consult_id)
            .map(RunStatus::parse);
        if let Some(status) = cached {
            return Ok(status);
        }

        let status = match self.query(self.client.status(impression.uuid())) {
            Some(reply) => RunStatus::parse(&reply),
            None => RunStatus::Unconnected,
        };
        if status != RunStatus::Unconnected {
            self.session
                .cache()
                .borrow_mut()
                .record_status(node.path(), consult_id, status.to_string());
        }
        Ok(status)
    }

    /// Like [Dispatcher::status], except for raw data tasks, which are
    /// finished once the runner holds a sample with their `input_md5`.
    pub fn run_status(&self, node: &Node) -> Result<RunStatus, Error> {
        let Some(impressible) = node.as_impressible() else {
            return Err(Error::Store(chern_store::Error::InvalidTarget(format!(
                "{} is not a task or algorithm",
                node
            ))));
        };
        let Node::Task(task) = node else {
            return self.status(impressible);
        };
        if !task.is_rawdata()? {
            return self.status(impressible);
        }

        let Some(impression) = task.impression()? else {
            return Ok(RunStatus::Unsubmitted);
        };
        let Some(sample) = self.query(self.client.sample_status(impression.uuid())) else {
            return Ok(RunStatus::Unconnected);
        };
        match task.input_md5()? {
            Some(md5) if md5 == sample => Ok(RunStatus::Finished),
            _ => Ok(RunStatus::Unsubmitted),
        }
    }

    pub fn sample_status(&self, node: &dyn HasImpression) -> Result<String, Error> {
        let impression = current_impression(node)?;
        Ok(self
            .query(self.client.sample_status(impression.uuid()))
            .unwrap_or_else(|| RunStatus::Unconnected.to_string()))
    }

    pub fn set_job_status(&self, node: &dyn HasImpression, state: &str) -> Result<String, Error> {
        let impression = current_impression(node)?;
        Ok(self
            .query(self.client.set_job_status(impression.uuid(), state))
            .unwrap_or_else(|| RunStatus::Unconnected.to_string()))
    }

    pub fn workflow(&self, node: &dyn HasImpression) -> Result<Workflow, Error> {
        let Some(impression) = node.impression()? else {
            return Ok(Workflow::Undefined);
        };
        Ok(self
            .query(self.client.workflow(impression.uuid()))
            .map_or(Workflow::Unconnected, |reply| Workflow::parse(&reply)))
    }

    /// Output file names of `node` on `runner`.
    pub fn output_files(
        &self,
        node: &dyn HasImpression,
        runner: &str,
    ) -> Result<Vec<String>, Error> {
        let impression = current_impression(node)?;
        let outputs = self
            .query(self.client.machine_id(runner))
            .and_then(|machine| self.query(self.client.outputs(impression.uuid(), &machine)));
        Ok(outputs.unwrap_or_else(unconnected_list))
    }

    /// Path of an output file on the runner, for display.
    pub fn get_file(&self, node: &dyn HasImpression, file: &str) -> Result<String, Error> {
        let impression = current_impression(node)?;
        Ok(self
            .query(self.client.get_file(impression.uuid(), file))
            .unwrap_or_else(|| RunStatus::Unconnected.to_string()))
    }

    /// Downloads the output `filename` of `node` to `dest`. The node must be impressed.
    pub fn export(
        &self,
        node: &dyn HasImpression,
        filename: &str,
        dest: &Path,
    ) -> Result<(), Error> {
        if !self.session.is_impressed_fast(node)? {
            return Err(Error::Store(chern_store::Error::NotImpressed(
                node.handle().to_string(),
            )));
        }
        let impression = current_impression(node)?;
        self.block_on(self.client.export(impression.uuid(), filename, dest))
    }

    /// Uploads the impression of a raw data task together with the files
    /// below `data_dir`, then marks the job archived.
    #[instrument(skip(self, task), fields(task = %task.handle()), err)]
    pub fn deposit_with_data(&self, task: &Task, data_dir: &Path) -> Result<(), Error> {
        if !task.is_rawdata()? {
            return Err(Error::Store(chern_store::Error::InvalidTarget(format!(
                "{} does not hold raw data",
                task.handle()
            ))));
        }
        if !data_dir.is_dir() {
            return Err(Error::Store(chern_store::Error::InvalidTarget(format!(
                "{} is not a directory",
                data_dir.display()
            ))));
        }
        self.session.impress(task)?;
        let impression = current_impression(task)?;

        let scratch = tempfile::tempdir().map_err(Error::io(std::env::temp_dir()))?;
        let packed = scratch.path().join(impression.tarball_name());
        self.block_on(pack::pack_with_rawdata(
            &impression.tarball_path(),
            data_dir,
            &packed,
        ))
        .map_err(Error::io(&packed))?;

        self.block_on(self.client.upload(
            &packed,
            &impression.tarball_name(),
            &impression.config_path(),
        ))?;
        self.block_on(self.client.set_job_status(impression.uuid(), "archived"))?;
        info!(uuid = impression.uuid(), "deposited with data");
        Ok(())
    }

    /// Deposits the data with the task's impression, then records the md5 of
    /// `data_dir` as the task's `input_md5`.
    pub fn send(&self, task: &Task, data_dir: &Path) -> Result<(), Error> {
        let md5 = dir_md5(data_dir)?;
        self.deposit_with_data(task, data_dir)?;
        Ok(task.set_input_md5(&md5)?)
    }

    pub fn runners(&self) -> Vec<String> {
        self.query(self.client.runners())
            .unwrap_or_else(unconnected_list)
    }

    pub fn runners_url(&self) -> Vec<String> {
        self.query(self.client.runners_url())
            .unwrap_or_else(unconnected_list)
    }

    pub fn runner_connection(&self, runner: &str) -> String {
        self.query(self.client.runner_connection(runner))
            .unwrap_or_else(|| RunStatus::Unconnected.to_string())
    }

    pub fn machine_id(&self, runner: &str) -> Result<String, Error> {
        self.block_on(self.client.machine_id(runner))
    }

    pub fn register_runner(&self, runner: &str, url: &str, token: &str) -> Result<String, Error> {
        let reply = self.block_on(self.client.register_runner(runner, url, token))?;
        Ok(reply.trim().to_string())
    }

    pub fn remove_runner(&self, runner: &str) -> Result<(), Error> {
        self.block_on(self.client.remove_runner(runner))
    }
}
