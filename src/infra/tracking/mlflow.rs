// ============================================================
// MLflow REST Tracker
// ============================================================
// Talks to an MLflow tracking server (or a hosted one such as
// DagsHub) over its REST API with a blocking reqwest client.
//
// Endpoints used (all under <base>/api/2.0/):
//
//   GET  mlflow/experiments/get-by-name
//   POST mlflow/experiments/create
//   POST mlflow/runs/create
//   POST mlflow/runs/log-batch
//   POST mlflow/runs/update
//   POST mlflow/registered-models/create
//   POST mlflow/model-versions/create
//   POST mlflow/registered-models/get-latest-versions
//   GET  mlflow-artifacts/artifacts          (list)
//   GET  mlflow-artifacts/artifacts/<path>   (download)
//   PUT  mlflow-artifacts/artifacts/<path>   (upload)
//
// Credentials come from MLFLOW_TRACKING_USERNAME /
// MLFLOW_TRACKING_PASSWORD (basic) or MLFLOW_TRACKING_TOKEN
// (bearer), the same variables the MLflow client reads.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::traits::{ExperimentTracker, RunStatus};
use crate::error::{PipelineError, PipelineResult};
use crate::infra::tracking::file_store::now_millis;

const TIMEOUT_SECS: u64 = 120;

// log-batch limits enforced by the server
const MAX_PARAMS_PER_BATCH:  usize = 100;
const MAX_METRICS_PER_BATCH: usize = 1000;

const ARTIFACT_SCHEME: &str = "mlflow-artifacts:";

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error_code: Option<String>,
    message:    Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExperimentResponse {
    experiment: ExperimentInfo,
}

#[derive(Debug, Deserialize)]
struct ExperimentInfo {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateRunResponse {
    run: RunData,
}

#[derive(Debug, Deserialize)]
struct RunData {
    info: RunInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunInfo {
    pub run_id:       String,
    pub artifact_uri: String,
}

#[derive(Debug, Serialize)]
struct Param<'a> {
    key:   &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct Metric<'a> {
    key:       &'a str,
    value:     f64,
    timestamp: u64,
    step:      u64,
}

#[derive(Debug, Deserialize)]
struct CreateVersionResponse {
    model_version: ModelVersion,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelVersion {
    pub version: String,
    #[serde(default)]
    pub source:  String,
    #[serde(default)]
    pub run_id:  String,
}

#[derive(Debug, Deserialize)]
struct LatestVersionsResponse {
    #[serde(default)]
    model_versions: Vec<ModelVersion>,
}

#[derive(Debug, Deserialize)]
struct ListArtifactsResponse {
    #[serde(default)]
    files: Vec<ArtifactFile>,
}

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    path:   String,
    #[serde(default)]
    is_dir: bool,
}

// ─── MlflowClient ─────────────────────────────────────────────────────────────
/// Thin typed wrapper over the REST endpoints.
pub struct MlflowClient {
    base: String,
    http: reqwest::blocking::Client,
}

impl MlflowClient {
    pub fn new(base_url: &str) -> PipelineResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| PipelineError::tracking(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { base: base_url.trim_end_matches('/').to_string(), http })
    }

    fn api(&self, endpoint: &str) -> String {
        format!("{}/api/2.0/mlflow/{endpoint}", self.base)
    }

    fn artifact_url(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow-artifacts/artifacts/{}", self.base, path.trim_matches('/'))
    }

    fn authorize(&self, req: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        if let Ok(token) = std::env::var("MLFLOW_TRACKING_TOKEN") {
            return req.bearer_auth(token);
        }
        match std::env::var("MLFLOW_TRACKING_USERNAME") {
            Ok(user) => req.basic_auth(user, std::env::var("MLFLOW_TRACKING_PASSWORD").ok()),
            Err(_)   => req,
        }
    }

    /// Send a request; non-2xx answers become TrackingError carrying
    /// the server's error_code.
    fn send(&self, req: reqwest::blocking::RequestBuilder, what: &str) -> Result<reqwest::blocking::Response> {
        let resp = self
            .authorize(req)
            .send()
            .map_err(|e| PipelineError::tracking(format!("{what}: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().unwrap_or_default();
        let code = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .map(|b| format!("{} {}", b.error_code.unwrap_or_default(), b.message.unwrap_or_default()))
            .unwrap_or(text);
        bail!(PipelineError::tracking(format!(
            "{what}: HTTP {} {}",
            status.as_u16(),
            code.trim()
        )))
    }

    fn post<T: DeserializeOwned>(&self, endpoint: &str, body: &Value) -> Result<T> {
        let resp = self.send(self.http.post(self.api(endpoint)).json(body), endpoint)?;
        resp.json::<T>()
            .map_err(|e| PipelineError::tracking(format!("{endpoint}: bad response: {e}")).into())
    }

    pub fn get_experiment_id(&self, name: &str) -> Result<Option<String>> {
        let req = self
            .http
            .get(self.api("experiments/get-by-name"))
            .query(&[("experiment_name", name)]);
        let resp = self.authorize(req).send().map_err(|e| {
            PipelineError::tracking(format!("experiments/get-by-name: {e}"))
        })?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let text = resp.text().unwrap_or_default();
            if text.contains("RESOURCE_DOES_NOT_EXIST") {
                return Ok(None);
            }
            bail!(PipelineError::tracking(format!("experiments/get-by-name: {text}")));
        }
        let body: ExperimentResponse = resp
            .json()
            .map_err(|e| PipelineError::tracking(format!("experiments/get-by-name: {e}")))?;
        Ok(Some(body.experiment.experiment_id))
    }

    pub fn create_experiment(&self, name: &str) -> Result<String> {
        let body: CreateExperimentResponse = self.post("experiments/create", &json!({ "name": name }))?;
        Ok(body.experiment_id)
    }

    pub fn create_run(&self, experiment_id: &str) -> Result<RunInfo> {
        let body: CreateRunResponse = self.post(
            "runs/create",
            &json!({ "experiment_id": experiment_id, "start_time": now_millis() }),
        )?;
        Ok(body.run.info)
    }

    pub fn log_batch(
        &self,
        run_id:  &str,
        params:  &BTreeMap<String, String>,
        metrics: &BTreeMap<String, f64>,
    ) -> Result<()> {
        let params: Vec<Param> = params
            .iter()
            .map(|(k, v)| Param { key: k.as_str(), value: v.as_str() })
            .collect();
        for chunk in params.chunks(MAX_PARAMS_PER_BATCH) {
            let _: Value = self.post("runs/log-batch", &json!({ "run_id": run_id, "params": chunk }))?;
        }

        let ts = now_millis();
        let metrics: Vec<Metric> = metrics
            .iter()
            .map(|(k, v)| Metric { key: k.as_str(), value: *v, timestamp: ts, step: 0 })
            .collect();
        for chunk in metrics.chunks(MAX_METRICS_PER_BATCH) {
            let _: Value = self.post("runs/log-batch", &json!({ "run_id": run_id, "metrics": chunk }))?;
        }
        Ok(())
    }

    pub fn update_run(&self, run_id: &str, status: &str) -> Result<()> {
        let _: Value = self.post(
            "runs/update",
            &json!({ "run_id": run_id, "status": status, "end_time": now_millis() }),
        )?;
        Ok(())
    }

    /// Create the registered model; an existing one is fine.
    pub fn create_registered_model(&self, name: &str) -> Result<()> {
        match self.post::<Value>("registered-models/create", &json!({ "name": name })) {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("RESOURCE_ALREADY_EXISTS") => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn create_model_version(&self, name: &str, source: &str, run_id: &str) -> Result<ModelVersion> {
        let body: CreateVersionResponse = self.post(
            "model-versions/create",
            &json!({ "name": name, "source": source, "run_id": run_id }),
        )?;
        Ok(body.model_version)
    }

    pub fn latest_version(&self, name: &str, stage: &str) -> Result<Option<ModelVersion>> {
        let body: LatestVersionsResponse = self.post(
            "registered-models/get-latest-versions",
            &json!({ "name": name, "stages": [stage] }),
        )?;
        Ok(body.model_versions.into_iter().next())
    }

    /// Upload one file to `<artifact_uri>/<rel_path>` via the artifact proxy.
    pub fn upload_artifact(&self, artifact_uri: &str, rel_path: &str, bytes: Vec<u8>) -> Result<()> {
        let root = proxy_path(artifact_uri)?;
        let url  = self.artifact_url(&format!("{root}/{}", rel_path.trim_matches('/')));
        self.send(self.http.put(url).body(bytes), "artifact upload")?;
        Ok(())
    }

    /// Download every file directly under `uri` (an `mlflow-artifacts:`
    /// URI pointing at a directory) into `dest`.
    pub fn download_artifacts(&self, uri: &str, dest: &Path) -> Result<Vec<PathBuf>> {
        let dir = proxy_path(uri)?;
        let req = self
            .http
            .get(format!("{}/api/2.0/mlflow-artifacts/artifacts", self.base))
            .query(&[("path", dir.as_str())]);
        let listing: ListArtifactsResponse = self
            .send(req, "artifact listing")?
            .json()
            .map_err(|e| PipelineError::tracking(format!("artifact listing: {e}")))?;

        fs::create_dir_all(dest)?;
        let mut written = Vec::new();
        for file in listing.files.iter().filter(|f| !f.is_dir) {
            let name = file.path.rsplit('/').next().unwrap_or(&file.path);
            let url  = self.artifact_url(&format!("{dir}/{name}"));
            let bytes = self.send(self.http.get(url), "artifact download")?.bytes()?;
            let out = dest.join(name);
            fs::write(&out, &bytes)
                .with_context(|| format!("Cannot write '{}'", out.display()))?;
            written.push(out);
        }
        Ok(written)
    }
}

/// `mlflow-artifacts:/1/abc/artifacts` or `mlflow-artifacts://host/1/abc/artifacts`
/// → `1/abc/artifacts`.
fn proxy_path(uri: &str) -> PipelineResult<String> {
    let rest = uri.strip_prefix(ARTIFACT_SCHEME).ok_or_else(|| {
        PipelineError::tracking(format!(
            "artifact store '{uri}' is not served by the tracking server's artifact proxy"
        ))
    })?;
    let rest = match rest.strip_prefix("//") {
        Some(with_host) => with_host.split_once('/').map(|(_, p)| p).unwrap_or(""),
        None => rest,
    };
    Ok(rest.trim_matches('/').to_string())
}

// ─── MlflowTracker ────────────────────────────────────────────────────────────

pub struct MlflowTracker {
    client: MlflowClient,
    run:    Option<RunInfo>,
}

impl MlflowTracker {
    pub fn new(client: MlflowClient) -> Self {
        Self { client, run: None }
    }

    fn active(&self) -> Result<&RunInfo> {
        match &self.run {
            Some(run) => Ok(run),
            None => bail!(PipelineError::tracking("no active run; call start_run first")),
        }
    }
}

impl ExperimentTracker for MlflowTracker {
    fn start_run(&mut self, experiment_name: &str) -> Result<()> {
        let experiment_id = match self.client.get_experiment_id(experiment_name)? {
            Some(id) => id,
            None => {
                tracing::info!("Creating experiment '{}'", experiment_name);
                self.client.create_experiment(experiment_name)?
            }
        };
        let run = self.client.create_run(&experiment_id)?;
        tracing::info!("Started MLflow run {} (experiment {})", run.run_id, experiment_id);
        self.run = Some(run);
        Ok(())
    }

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()> {
        let run_id = self.active()?.run_id.clone();
        self.client.log_batch(&run_id, params, &BTreeMap::new())
    }

    fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<()> {
        let run_id = self.active()?.run_id.clone();
        self.client.log_batch(&run_id, &BTreeMap::new(), metrics)
    }

    fn log_artifact(&mut self, file: &Path, artifact_dir: &str) -> Result<()> {
        let artifact_uri = self.active()?.artifact_uri.clone();
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("'{}' has no file name", file.display()))?;
        let rel = if artifact_dir.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", artifact_dir.trim_matches('/'))
        };
        let bytes = fs::read(file).with_context(|| format!("Cannot read '{}'", file.display()))?;
        self.client.upload_artifact(&artifact_uri, &rel, bytes)
    }

    fn supports_registry(&self) -> bool {
        true
    }

    fn register_model(&mut self, artifact_dir: &str, model_name: &str) -> Result<String> {
        let run    = self.active()?.clone();
        let source = format!("{}/{}", run.artifact_uri.trim_end_matches('/'), artifact_dir);

        self.client.create_registered_model(model_name)?;
        let version = self.client.create_model_version(model_name, &source, &run.run_id)?;
        tracing::info!("Registered model '{}' version {}", model_name, version.version);
        Ok(version.version)
    }

    fn end_run(&mut self, status: RunStatus) -> Result<()> {
        let Some(run) = self.run.take() else {
            bail!(PipelineError::tracking("no active run to end"));
        };
        self.client.update_run(&run.run_id, status.as_str())?;
        tracing::info!("Ended MLflow run {} ({})", run.run_id, status.as_str());
        Ok(())
    }
}

/// Fetch the files of the latest `stage` version of `model_name` into
/// `dest`. Returns the downloaded paths.
pub fn fetch_registered_model(
    client:     &MlflowClient,
    model_name: &str,
    stage:      &str,
    dest:       &Path,
) -> Result<Vec<PathBuf>> {
    let version = client.latest_version(model_name, stage)?.ok_or_else(|| {
        PipelineError::model_load(format!("no '{stage}' version of registered model '{model_name}'"))
    })?;
    tracing::info!(
        "Fetching '{}' version {} ({}) from {}",
        model_name, version.version, stage, version.source
    );
    client.download_artifacts(&version.source, dest)
}
