//! An in-process stand-in for the runner service, recording what it is sent.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{self, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Form, Router};
use chern_store::fixtures::Sandbox;
use rstest::fixture;

use crate::Dispatcher;


/// Everything the fake service was told, plus the answers it gives.
#[derive(Default)]
pub struct Recorded {
    /// Archive names in upload order.
    pub uploads: Vec<String>,
    pub archives: HashMap<String, Vec<u8>>,
    /// Uuids whose upload carried a `config.json` part.
    pub configs: HashSet<String>,
    pub deposited: HashSet<String>,
    /// `(machine, uuids)` of every execute call.
    pub executions: Vec<(String, Vec<String>)>,
    pub statuses: HashMap<String, String>,
    pub status_queries: usize,
    pub samples: HashMap<String, String>,
    pub job_states: Vec<(String, String)>,
    /// runner name to `(url, secret)`
    pub runners: BTreeMap<String, (String, String)>,
}

type Shared = Arc<Mutex<Recorded>>;

type Reply = Result<String, (StatusCode, String)>;

fn not_found(what: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, what.into())
}

fn bad_request(e: impl ToString) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}

async fn dite_status() -> &'static str {
    "ok"
}

async fn upload(State(dite): State<Shared>, mut multipart: Multipart) -> Reply {
    let mut tarname = None;
    let mut archive = None;
    let mut has_config = false;
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(bad_request)?;
        match name.as_str() {
            "tarname" => tarname = Some(String::from_utf8_lossy(&bytes).into_owned()),
            "config" => {}
            "config.json" => has_config = true,
            _ => archive = Some(bytes.to_vec()),
        }
    }
    let tarname = tarname.ok_or_else(|| bad_request("missing tarname"))?;
    let archive = archive.ok_or_else(|| bad_request("missing archive"))?;
    let uuid = tarname.trim_end_matches(".tar.gz").to_string();

    let mut dite = dite.lock().unwrap();
    dite.uploads.push(tarname.clone());
    dite.archives.insert(tarname, archive);
    if has_config {
        dite.configs.insert(uuid.clone());
    }
    dite.deposited.insert(uuid);
    Ok("successful".into())
}

async fn deposited(State(dite): State<Shared>, extract::Path(uuid): extract::Path<String>) -> String {
    if dite.lock().unwrap().deposited.contains(&uuid) {
        "TRUE".into()
    } else {
        "FALSE".into()
    }
}

async fn machine_id(
    State(dite): State<Shared>,
    extract::Path(runner): extract::Path<String>,
) -> Reply {
    if dite.lock().unwrap().runners.contains_key(&runner) {
        Ok(format!("machine-{}", runner))
    } else {
        Err(not_found(format!("no runner named {}", runner)))
    }
}

async fn execute(State(dite): State<Shared>, mut multipart: Multipart) -> Reply {
    let mut machine = None;
    let mut uuids = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or_default().to_string();
        let text = field.text().await.map_err(bad_request)?;
        match name.as_str() {
            "machine" => machine = Some(text),
            "impressions" => uuids = text.split_whitespace().map(str::to_string).collect(),
            _ => {}
        }
    }
    let machine = machine.ok_or_else(|| bad_request("missing machine"))?;

    let mut dite = dite.lock().unwrap();
    for uuid in &uuids {
        if !dite.deposited.contains(uuid) {
            return Err(bad_request(format!("{} was never deposited", uuid)));
        }
        dite.statuses.insert(uuid.clone(), "queued".into());
    }
    dite.executions.push((machine, uuids));
    Ok("ok".into())
}

async fn status(State(dite): State<Shared>, extract::Path(uuid): extract::Path<String>) -> String {
    let mut dite = dite.lock().unwrap();
    dite.status_queries += 1;
    dite.statuses
        .get(&uuid)
        .cloned()
        .unwrap_or_else(|| "unsubmitted".into())
}

async fn sample_status(
    State(dite): State<Shared>,
    extract::Path(uuid): extract::Path<String>,
) -> String {
    dite.lock()
        .unwrap()
        .samples
        .get(&uuid)
        .cloned()
        .unwrap_or_default()
}

async fn workflow(State(dite): State<Shared>, extract::Path(uuid): extract::Path<String>) -> String {
    let dite = dite.lock().unwrap();
    match dite.executions.iter().position(|(_, uuids)| uuids.contains(&uuid)) {
        Some(i) => format!("local wf-{}", i + 1),
        None => "UNDEFINED".into(),
    }
}

async fn outputs(extract::Path((_uuid, _machine)): extract::Path<(String, String)>) -> &'static str {
    "log.txt out.root"
}

async fn get_file(extract::Path((uuid, file)): extract::Path<(String, String)>) -> String {
    format!("/dite/outputs/{}/{}", uuid, file)
}

async fn export(
    State(dite): State<Shared>,
    extract::Path((uuid, file)): extract::Path<(String, String)>,
) -> Reply {
    if !dite.lock().unwrap().deposited.contains(&uuid) {
        return Err(not_found(format!("{} is unknown", uuid)));
    }
    Ok(format!("{} of {}", file, uuid))
}

async fn run(
    State(dite): State<Shared>,
    extract::Path((uuid, machine)): extract::Path<(String, String)>,
) -> Reply {
    let mut dite = dite.lock().unwrap();
    if !dite.deposited.contains(&uuid) {
        return Err(bad_request(format!("{} was never deposited", uuid)));
    }
    dite.statuses.insert(uuid.clone(), "queued".into());
    dite.executions.push((machine, vec![uuid]));
    Ok("ok".into())
}

async fn run_status(
    State(dite): State<Shared>,
    extract::Path((uuid, _machine)): extract::Path<(String, String)>,
) -> String {
    dite.lock()
        .unwrap()
        .statuses
        .get(&uuid)
        .cloned()
        .unwrap_or_else(|| "unsubmitted".into())
}

async fn acknowledge(extract::Path(_uuid): extract::Path<String>) -> &'static str {
    "ok"
}

async fn runners(State(dite): State<Shared>) -> String {
    let dite = dite.lock().unwrap();
    dite.runners.keys().cloned().collect::<Vec<_>>().join(" ")
}

async fn runners_url(State(dite): State<Shared>) -> String {
    let dite = dite.lock().unwrap();
    dite.runners
        .values()
        .map(|(url, _)| url.clone())
        .collect::<Vec<_>>()
        .join(" ")
}

async fn register_runner(
    State(dite): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> Reply {
    let field = |name: &str| {
        form.get(name)
            .cloned()
            .ok_or_else(|| bad_request(format!("missing {}", name)))
    };
    let (runner, url, secret) = (field("runner")?, field("url")?, field("secret")?);
    dite.lock().unwrap().runners.insert(runner, (url, secret));
    Ok("successful".into())
}

async fn remove_runner(
    State(dite): State<Shared>,
    extract::Path(runner): extract::Path<String>,
) -> &'static str {
    match dite.lock().unwrap().runners.remove(&runner) {
        Some(_) => "successful",
        None => "no such runner",
    }
}

async fn runner_connection(
    State(dite): State<Shared>,
    extract::Path(runner): extract::Path<String>,
) -> String {
    let status = if dite.lock().unwrap().runners.contains_key(&runner) {
        "connected"
    } else {
        "unknown"
    };
    serde_json::json!({ "status": status }).to_string()
}

async fn set_job_status(
    State(dite): State<Shared>,
    extract::Path((uuid, state)): extract::Path<(String, String)>,
) -> &'static str {
    let mut dite = dite.lock().unwrap();
    dite.statuses.insert(uuid.clone(), state.clone());
    dite.job_states.push((uuid, state));
    "ok"
}

/// A fake runner service listening on a local port.
pub struct FakeDite {
    state: Shared,
    addr: SocketAddr,
}

impl FakeDite {
    /// Serves on the sandbox runtime, knowing the runner `local`.
    pub fn spawn(sandbox: &Sandbox) -> Self {
        let state = Shared::default();
        state.lock().unwrap().runners.insert(
            "local".into(),
            ("http://localhost:3000".into(), String::new()),
        );

        let app = Router::new()
            .route("/ditestatus", get(dite_status))
            .route("/upload", post(upload))
            .route("/deposited/:uuid", get(deposited))
            .route("/machine_id/:runner", get(machine_id))
            .route("/execute", post(execute))
            .route("/run/:uuid/:machine", get(run))
            .route("/status/:uuid", get(status))
            .route("/runstatus/:uuid/:machine", get(run_status))
            .route("/samplestatus/:uuid", get(sample_status))
            .route("/workflow/:uuid", get(workflow))
            .route("/outputs/:uuid/:machine", get(outputs))
            .route("/getfile/:uuid/:file", get(get_file))
            .route("/export/:uuid/:file", get(export))
            .route("/collect/:uuid", get(acknowledge))
            .route("/kill/:uuid", get(acknowledge))
            .route("/runners", get(runners))
            .route("/runnersurl", get(runners_url))
            .route("/registerrunner", post(register_runner))
            .route("/removerunner/:runner", get(remove_runner))
            .route("/runnerconnection/:runner", get(runner_connection))
            .route("/setjobstatus/:uuid/:state", get(set_job_status))
            .with_state(state.clone());

        let listener = sandbox
            .runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .expect("must bind");
        let addr = listener.local_addr().expect("must have an address");
        sandbox.runtime.spawn(async move {
            axum::serve(listener, app).await.expect("must serve");
        });

        Self { state, addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.state.lock().unwrap()
    }
}

/// A sandbox project whose `serverurl` points at a [FakeDite].
pub struct Served {
    pub dite: FakeDite,
    pub sandbox: Sandbox,
}

impl Served {
    pub fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher::with_default_timeout(&self.sandbox.session, &self.sandbox.project)
            .expect("must create dispatcher")
    }
}

#[fixture]
pub fn served() -> Served {
    let sandbox = Sandbox::new();
    let dite = FakeDite::spawn(&sandbox);
    sandbox
        .project
        .set_serverurl(&dite.addr().to_string())
        .expect("must set serverurl");
    Served { dite, sandbox }
}
