use std::fmt;

/// Reply of list queries when the runner service cannot be reached.
pub const UNCONNECTED_LIST: &str = "unconnected to DITE";

/// Run state of an impression as reported by the runner service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Unsubmitted,
    Queued,
    Running,
    Finished,
    Failed,
    Archived,
    /// The runner service could not be reached.
    Unconnected,
    /// A reply this client does not know about, kept verbatim.
    Unknown(String),
}

impl RunStatus {
    pub fn parse(reply: &str) -> RunStatus {
        match reply.trim() {
            "unsubmitted" => RunStatus::Unsubmitted,
            "queued" => RunStatus::Queued,
            "running" => RunStatus::Running,
            "finished" => RunStatus::Finished,
            "failed" => RunStatus::Failed,
            "archived" => RunStatus::Archived,
            "unconnected" => RunStatus::Unconnected,
            other => RunStatus::Unknown(other.to_string()),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, RunStatus::Finished | RunStatus::Archived)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Unsubmitted => "unsubmitted",
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Finished => "finished",
            RunStatus::Failed => "failed",
            RunStatus::Archived => "archived",
            RunStatus::Unconnected => "unconnected",
            RunStatus::Unknown(other) => other,
        })
    }
}

/// Where an impression runs, from `/workflow/<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Workflow {
    Undefined,
    Defined { runner: String, workflow: String },
    Unconnected,
}

impl Workflow {
    pub fn parse(reply: &str) -> Workflow {
        match reply.trim().split_once(' ') {
            Some((runner, workflow)) if !runner.is_empty() => Workflow::Defined {
                runner: runner.to_string(),
                workflow: workflow.trim().to_string(),
            },
            _ => Workflow::Undefined,
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Workflow::Undefined => f.write_str("UNDEFINED"),
            Workflow::Defined { runner, workflow } => write!(f, "{} {}", runner, workflow),
            Workflow::Unconnected => f.write_str("unconnected"),
        }
    }
}
