use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::client::{ApiResponse, OptiplyClient};
use crate::config::ApiCredentials;
use crate::payload::{build_document, write_method};
use crate::streams::StreamKind;
use crate::types::WriteMethod;

/// What happened to a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Created,
    Updated,
    /// Not sent: mandatory fields were missing.
    Skipped { missing: Vec<&'static str> },
    /// The API answered 404.
    NotFound,
}

/// Writes the records of one stream to its Optiply endpoint.
pub struct Sink {
    kind: StreamKind,
    client: OptiplyClient,
    credentials: ApiCredentials,
}

impl Sink {
    pub fn new(kind: StreamKind, client: OptiplyClient, credentials: ApiCredentials) -> Self {
        Self {
            kind,
            client,
            credentials,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Create or update one record.
    ///
    /// Records with an `id` are PATCHed, everything else is POSTed. POSTs
    /// missing a mandatory field are skipped rather than failing the run.
    pub async fn process_record(&self, record: &Map<String, Value>) -> Result<RecordOutcome> {
        let (method, id) =
            write_method(record).with_context(|| format!("invalid {} record", self.kind))?;
        tracing::debug!(stream = %self.kind, %method, "processing record");

        if method == WriteMethod::Post {
            let missing = self.kind.missing_fields(record);
            if !missing.is_empty() {
                tracing::error!(
                    stream = %self.kind,
                    "Record skipped due to missing mandatory fields: {}",
                    missing.join(", ")
                );
                return Ok(RecordOutcome::Skipped { missing });
            }
        }

        let document = build_document(self.kind, method, record, &self.credentials)
            .with_context(|| format!("invalid {} record", self.kind))?;

        let response = self
            .client
            .send(method, self.kind.endpoint(), id.as_deref(), &document)
            .await
            .with_context(|| format!("failed to {} {} record", method, self.kind))?;

        match response {
            ApiResponse::Success { status, body } => {
                tracing::debug!(stream = %self.kind, status, body = %body, "record written");
                Ok(match method {
                    WriteMethod::Post => RecordOutcome::Created,
                    WriteMethod::Patch => RecordOutcome::Updated,
                })
            }
            ApiResponse::NotFound { .. } => Ok(RecordOutcome::NotFound),
        }
    }
}
