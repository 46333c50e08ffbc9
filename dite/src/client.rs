use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::{debug, instrument, warn, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::Error;

/// Timeout of every request unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin async client of the runner service, one method per route.
///
/// Every method fails with [Error::RunnerUnreachable] on transport errors and
/// with [Error::RunnerReportsError] on non-success replies. Mapping failures
/// to sentinels is up to the caller.
#[derive(Debug, Clone)]
pub struct DiteClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl DiteClient {
    /// `server_url` is `host:port`, optionally with a scheme.
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, Error> {
        let base_url = if server_url.starts_with("http://") || server_url.starts_with("https://")
        {
            server_url.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", server_url.trim_end_matches('/'))
        };
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.base_url, route)
    }

    async fn reply(response: reqwest::Response) -> Result<String, Error> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(%status, body, "runner service replied with an error");
            return Err(Error::RunnerReportsError(format!("{}: {}", status, body.trim())));
        }
        Ok(body)
    }

    #[instrument(skip(self), err)]
    async fn get(&self, route: &str) -> Result<String, Error> {
        let response = self.http_client.get(self.url(route)).send().await?;
        Self::reply(response).await
    }

    pub async fn dite_status(&self) -> Result<String, Error> {
        Ok(self.get("ditestatus").await?.trim().to_string())
    }

    /// Uploads an impression archive and its `config.json`.
    #[instrument(skip(self), fields(indicatif.pb_show = 1), err)]
    pub async fn upload(
        &self,
        tarball: &Path,
        tarname: &str,
        config: &Path,
    ) -> Result<String, Error> {
        let span = Span::current();
        span.pb_set_style(&chern_tracing::PB_SPINNER_STYLE);
        span.pb_set_message(&format!("Uploading {}", tarname));
        span.pb_start();

        let archive = tokio::fs::read(tarball).await.map_err(Error::io(tarball))?;
        let config_json = tokio::fs::read(config).await.map_err(Error::io(config))?;
        debug!(size = archive.len(), "read archive");

        let form = Form::new()
            .text("tarname", tarname.to_string())
            .text("config", "config.json")
            .part(
                tarname.to_string(),
                Part::bytes(archive).file_name(tarname.to_string()),
            )
            .part("config.json", Part::bytes(config_json).file_name("config.json"));

        let response = self
            .http_client
            .post(self.url("upload"))
            .multipart(form)
            .send()
            .await?;
        Self::reply(response).await
    }

    pub async fn deposited(&self, uuid: &str) -> Result<bool, Error> {
        Ok(self.get(&format!("deposited/{}", uuid)).await?.trim() == "TRUE")
    }

    pub async fn machine_id(&self, runner: &str) -> Result<String, Error> {
        Ok(self
            .get(&format!("machine_id/{}", runner))
            .await?
            .trim()
            .to_string())
    }

    /// Dispatches every impression in `uuids` to the runner known as `machine`.
    #[instrument(skip(self), err)]
    pub async fn execute(&self, machine: &str, uuids: &[String]) -> Result<String, Error> {
        let form = Form::new().text("machine", machine.to_string()).part(
            "impressions",
            Part::text(uuids.join(" ")).file_name("impressions"),
        );
        let response = self
            .http_client
            .post(self.url("execute"))
            .multipart(form)
            .send()
            .await?;
        Self::reply(response).await
    }

    pub async fn run(&self, uuid: &str, machine_id: &str) -> Result<String, Error> {
        self.get(&format!("run/{}/{}", uuid, machine_id)).await
    }

    pub async fn status(&self, uuid: &str) -> Result<String, Error> {
        self.get(&format!("status/{}", uuid)).await
    }

    pub async fn run_status(&self, uuid: &str, machine: &str) -> Result<String, Error> {
        self.get(&format!("runstatus/{}/{}", uuid, machine)).await
    }

    pub async fn sample_status(&self, uuid: &str) -> Result<String, Error> {
        Ok(self
            .get(&format!("samplestatus/{}", uuid))
            .await?
            .trim()
            .to_string())
    }

    pub async fn workflow(&self, uuid: &str) -> Result<String, Error> {
        self.get(&format!("workflow/{}", uuid)).await
    }

    pub async fn outputs(&self, uuid: &str, machine_id: &str) -> Result<Vec<String>, Error> {
        let reply = self.get(&format!("outputs/{}/{}", uuid, machine_id)).await?;
        Ok(reply.split_whitespace().map(str::to_string).collect())
    }

    /// Path of an output file on the runner.
    pub async fn get_file(&self, uuid: &str, file: &str) -> Result<String, Error> {
        Ok(self
            .get(&format!("getfile/{}/{}", uuid, file))
            .await?
            .trim()
            .to_string())
    }

    /// Downloads an output file to `dest`.
    #[instrument(skip(self), fields(indicatif.pb_show = 1), err)]
    pub async fn export(&self, uuid: &str, file: &str, dest: &Path) -> Result<(), Error> {
        let span = Span::current();
        span.pb_set_style(&chern_tracing::PB_SPINNER_STYLE);
        span.pb_set_message(&format!("Downloading {}", file));
        span.pb_start();

        let response = self
            .http_client
            .get(self.url(&format!("export/{}/{}", uuid, file)))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RunnerReportsError(format!("{}: {}", status, body.trim())));
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes).await.map_err(Error::io(dest))
    }

    pub async fn collect(&self, uuid: &str) -> Result<String, Error> {
        self.get(&format!("collect/{}", uuid)).await
    }

    pub async fn kill(&self, uuid: &str) -> Result<String, Error> {
        self.get(&format!("kill/{}", uuid)).await
    }

    pub async fn runners(&self) -> Result<Vec<String>, Error> {
        let reply = self.get("runners").await?;
        Ok(reply.split_whitespace().map(str::to_string).collect())
    }

    pub async fn runners_url(&self) -> Result<Vec<String>, Error> {
        let reply = self.get("runnersurl").await?;
        Ok(reply.split_whitespace().map(str::to_string).collect())
    }

    #[instrument(skip(self, token), err)]
    pub async fn register_runner(
        &self,
        runner: &str,
        url: &str,
        token: &str,
    ) -> Result<String, Error> {
        let response = self
            .http_client
            .post(self.url("registerrunner"))
            .form(&[("runner", runner), ("url", url), ("secret", token)])
            .send()
            .await?;
        Self::reply(response).await
    }

    /// Fails with [Error::RunnerReportsError] unless the service answers `successful`.
    pub async fn remove_runner(&self, runner: &str) -> Result<(), Error> {
        let reply = self.get(&format!("removerunner/{}", runner)).await?;
        if reply.trim() != "successful" {
            return Err(Error::RunnerReportsError(reply.trim().to_string()));
        }
        Ok(())
    }

    /// The `status` field of `/runnerconnection/<name>`.
    pub async fn runner_connection(&self, runner: &str) -> Result<String, Error> {
        let reply = self.get(&format!("runnerconnection/{}", runner)).await?;
        let value: serde_json::Value = serde_json::from_str(&reply)
            .map_err(|e| Error::RunnerReportsError(format!("malformed reply: {}", e)))?;
        Ok(match value.get("status") {
            Some(serde_json::Value::String(status)) => status.clone(),
            Some(other) => other.to_string(),
            None => "unknown".to_string(),
        })
    }

    pub async fn set_job_status(&self, uuid: &str, state: &str) -> Result<String, Error> {
        self.get(&format!("setjobstatus/{}/{}", uuid, state)).await
    }
}
