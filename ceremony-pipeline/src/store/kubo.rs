//! Kubo RPC client.

use std::time::Duration;

use async_trait::async_trait;
use ceremony_common::CeremonyError;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use super::{AddOptions, AddedEntry, ContentStore, Mtime, StoreEntry, StoreFile};

/// Content store client for a Kubo (go-ipfs) RPC endpoint such as
/// `http://127.0.0.1:5001/api/v0`.
#[derive(Clone, Debug)]
pub struct KuboClient {
    client: reqwest::Client,
    endpoint: String,
}

impl KuboClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: normalize_endpoint(endpoint.into()),
        }
    }

    /// Client whose requests fail after `timeout`. Applies to every call
    /// separately; a timed-out call is reported as a transport failure.
    pub fn with_timeout(
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CeremonyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CeremonyError::InvalidInput(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            endpoint: normalize_endpoint(endpoint.into()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, command: &str) -> String {
        format!("{}/{}", self.endpoint, command)
    }

    async fn call(
        &self,
        command: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, reqwest::Error> {
        debug!(command, "kubo rpc call");
        self.client
            .post(self.url(command))
            .query(query)
            .send()
            .await?
            .error_for_status()
    }
}

#[async_trait]
impl ContentStore for KuboClient {
    async fn ls(&self, path: &str) -> Result<Vec<StoreEntry>, CeremonyError> {
        let fetch_err = |err: reqwest::Error| CeremonyError::Fetch {
            path: path.to_string(),
            message: err.to_string(),
        };
        let response: LsResponse = self
            .call("ls", &[("arg", path)])
            .await
            .map_err(fetch_err)?
            .json()
            .await
            .map_err(fetch_err)?;

        Ok(response
            .objects
            .into_iter()
            .flat_map(|object| object.links)
            .map(|link| StoreEntry {
                name: link.name,
                cid: link.hash,
                size: link.size,
            })
            .collect())
    }

    async fn cat(&self, path: &str) -> Result<Vec<u8>, CeremonyError> {
        let fetch_err = |err: reqwest::Error| CeremonyError::Fetch {
            path: path.to_string(),
            message: err.to_string(),
        };
        let bytes = self
            .call("cat", &[("arg", path)])
            .await
            .map_err(fetch_err)?
            .bytes()
            .await
            .map_err(fetch_err)?;
        Ok(bytes.to_vec())
    }

    async fn add_all(
        &self,
        files: Vec<StoreFile>,
        options: AddOptions,
    ) -> Result<Vec<AddedEntry>, CeremonyError> {
        // Names and file names are escaped here; Kubo expects them quoted verbatim.
        let mut form = Form::new().percent_encode_noop();
        for (index, file) in files.into_iter().enumerate() {
            let length = file.content.len() as u64;
            let part = Part::stream_with_length(file.content, length)
                .file_name(encode_file_name(&file.path))
                .mime_str("application/octet-stream")
                .map_err(|err| CeremonyError::Publish(format!("invalid multipart part: {err}")))?;
            form = form.part(field_name(index, &file.mtime), part);
        }

        let wrap = if options.wrap_with_directory {
            "true"
        } else {
            "false"
        };
        let body = self
            .client
            .post(self.url("add"))
            .query(&[
                ("wrap-with-directory", wrap),
                ("stream-channels", "true"),
                ("progress", "false"),
            ])
            .multipart(form)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|err| CeremonyError::Publish(format!("add failed: {err}")))?
            .text()
            .await
            .map_err(|err| CeremonyError::Publish(format!("add response unreadable: {err}")))?;

        parse_add_response(&body)
    }

    async fn pin(&self, cid: &str, name: &str) -> Result<(), CeremonyError> {
        self.call("pin/add", &[("arg", cid), ("name", name)])
            .await
            .map_err(|err| CeremonyError::Publish(format!("failed to pin {cid}: {err}")))?;
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsResponse {
    #[serde(default)]
    objects: Vec<LsObject>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsObject {
    #[serde(default)]
    links: Vec<LsLink>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsLink {
    name: String,
    hash: String,
    #[serde(default)]
    size: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddLine {
    name: String,
    hash: Option<String>,
    #[serde(default)]
    size: Option<String>,
}

fn normalize_endpoint(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// Multipart field name carrying the file mtime, e.g. `file-2?mtime=0&mtime-nsecs=0`.
fn field_name(index: usize, mtime: &Mtime) -> String {
    let base = if index == 0 {
        "file".to_string()
    } else {
        format!("file-{index}")
    };
    format!("{base}?mtime={}&mtime-nsecs={}", mtime.secs, mtime.nsecs)
}

fn encode_file_name(path: &str) -> String {
    url::form_urlencoded::byte_serialize(path.as_bytes()).collect()
}

/// Parse the newline-delimited JSON emitted by `add`. Progress lines carry no
/// hash and are skipped.
fn parse_add_response(body: &str) -> Result<Vec<AddedEntry>, CeremonyError> {
    let mut entries = Vec::new();
    for line in body.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let parsed: AddLine = serde_json::from_str(line)
            .map_err(|err| CeremonyError::Publish(format!("malformed add response line: {err}")))?;
        let Some(cid) = parsed.hash else {
            continue;
        };
        let size = parsed
            .size
            .as_deref()
            .map(str::parse::<u64>)
            .transpose()
            .map_err(|err| CeremonyError::Publish(format!("malformed size in add response: {err}")))?
            .unwrap_or_default();
        entries.push(AddedEntry {
            path: parsed.name,
            cid,
            size,
        });
    }
    if entries.is_empty() {
        return Err(CeremonyError::Publish("add returned no entries".into()));
    }
    Ok(entries)
}
