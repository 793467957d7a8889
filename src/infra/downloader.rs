// ============================================================
// Layer 6 — Dataset Downloader
// ============================================================
// Fetches the dataset archive from a drive-style sharing link.
//
//   https://drive.google.com/file/d/<ID>/view?usp=sharing
//                                   ^^^^ second-to-last segment
//
// becomes
//
//   https://drive.google.com/uc?/export=download&id=<ID>
//
// Large files are not served directly: Drive answers with an
// HTML "can't scan this file for viruses" page carrying a form
// whose hidden inputs (id, confirm, uuid, …) must be sent back
// to the form's action URL. We detect that page by its
// Content-Type and follow the form once.
//
// No retries. Any network or HTTP-status failure is a
// DownloadError and aborts the stage.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;

use crate::error::{PipelineError, PipelineResult};

pub const DRIVE_DOWNLOAD_PREFIX: &str = "https://drive.google.com/uc?/export=download&id=";

const TIMEOUT_SECS: u64 = 600;

pub struct DriveDownloader {
    client: reqwest::blocking::Client,
    prefix: String,
}

impl DriveDownloader {
    pub fn new() -> PipelineResult<Self> {
        Self::with_prefix(DRIVE_DOWNLOAD_PREFIX)
    }

    /// Point the downloader at another `…?id=` style endpoint.
    pub fn with_prefix(prefix: impl Into<String>) -> PipelineResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| PipelineError::download(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, prefix: prefix.into() })
    }

    /// Download the file with drive id `file_id` to `dest`.
    pub fn download(&self, file_id: &str, dest: &Path) -> PipelineResult<PathBuf> {
        let url = format!("{}{}", self.prefix, file_id);
        tracing::info!("Downloading data from {} into file {}", url, dest.display());

        let mut response = self.get(&url, &[])?;

        if is_html(&response) {
            let page = response
                .text()
                .map_err(|e| PipelineError::download(format!("cannot read response: {e}")))?;
            let form = ConfirmForm::parse(&page).ok_or_else(|| {
                PipelineError::download(format!(
                    "'{url}' returned an HTML page without a download form \
                     (is the file shared publicly?)"
                ))
            })?;
            tracing::info!("Following download confirmation form to {}", form.action);
            response = self.get(&form.action, &form.fields)?;
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                PipelineError::download(format!("cannot create '{}': {e}", parent.display()))
            })?;
        }

        let file = File::create(dest).map_err(|e| {
            PipelineError::download(format!("cannot create '{}': {e}", dest.display()))
        })?;
        let mut writer = BufWriter::new(file);
        io::copy(&mut response, &mut writer)
            .map_err(|e| PipelineError::download(format!("transfer interrupted: {e}")))?;

        Ok(dest.to_path_buf())
    }

    fn get(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> PipelineResult<reqwest::blocking::Response> {
        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request
            .send()
            .map_err(|e| PipelineError::download(format!("request to '{url}' failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::download(format!(
                "'{url}' answered HTTP {}",
                status.as_u16()
            )));
        }
        Ok(response)
    }
}

fn is_html(response: &reqwest::blocking::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"))
}

// ─── Confirmation Form ────────────────────────────────────────────────────────
#[derive(Debug, PartialEq)]
struct ConfirmForm {
    action: String,
    fields: Vec<(String, String)>,
}

impl ConfirmForm {
    fn parse(html: &str) -> Option<Self> {
        let form_re   = Regex::new(r#"<form[^>]*id="download-form"[^>]*action="([^"]+)""#).ok()?;
        let hidden_re =
            Regex::new(r#"<input[^>]*type="hidden"[^>]*name="([^"]+)"[^>]*value="([^"]*)""#).ok()?;

        if let Some(cap) = form_re.captures(html) {
            let action = cap[1].replace("&amp;", "&");
            let fields = hidden_re
                .captures_iter(html)
                .map(|c| (c[1].to_string(), c[2].to_string()))
                .collect();
            return Some(Self { action, fields });
        }

        // older pages: a plain link carrying confirm=<token>
        let link_re = Regex::new(r#"href="(/uc\?export=download[^"]*confirm=[^"]+)""#).ok()?;
        link_re.captures(html).map(|c| Self {
            action: format!("https://drive.google.com{}", c[1].replace("&amp;", "&")),
            fields: Vec::new(),
        })
    }
}
