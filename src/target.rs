//! The Singer target driver.
//!
//! Reads messages in order, routes records to the sink of their stream and
//! echoes STATE messages once every record read before them was written.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::client::OptiplyClient;
use crate::config::TargetConfig;
use crate::sink::{RecordOutcome, Sink};
use crate::singer::{Message, parse_message};
use crate::streams::StreamKind;

pub const TARGET_NAME: &str = "target-optiply";

/// Per-stream record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub not_found: u64,
}

impl StreamStats {
    fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Created => self.created += 1,
            RecordOutcome::Updated => self.updated += 1,
            RecordOutcome::Skipped { .. } => self.skipped += 1,
            RecordOutcome::NotFound => self.not_found += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.created + self.updated + self.skipped + self.not_found
    }
}

/// What a run did, keyed by stream name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub streams: BTreeMap<String, StreamStats>,
    pub states_emitted: usize,
}

pub struct Target {
    config: TargetConfig,
    client: OptiplyClient,
    sinks: HashMap<String, Sink>,
    last_state: Option<Value>,
    summary: RunSummary,
}

impl Target {
    pub fn new(config: TargetConfig) -> Result<Self> {
        let client = OptiplyClient::new(&config).context("Failed to build Optiply HTTP client")?;
        Ok(Self {
            config,
            client,
            sinks: HashMap::new(),
            last_state: None,
            summary: RunSummary::default(),
        })
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    /// Consume every message from `input`, writing STATE lines to `state_out`.
    pub async fn process<R, W>(&mut self, input: R, state_out: &mut W) -> Result<RunSummary>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut line_number = 0;

        while let Some(line) = lines
            .next_line()
            .await
            .context("Failed to read input")?
        {
            line_number += 1;
            if let Some(message) = parse_message(&line, line_number)? {
                self.handle(message, state_out).await?;
            }
        }

        for (stream, stats) in &self.summary.streams {
            tracing::info!(
                stream = %stream,
                created = stats.created,
                updated = stats.updated,
                skipped = stats.skipped,
                not_found = stats.not_found,
                "stream finished"
            );
        }

        Ok(std::mem::take(&mut self.summary))
    }

    async fn handle<W>(&mut self, message: Message, state_out: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        match message {
            Message::Schema {
                stream,
                key_properties,
                ..
            } => self.register_sink(stream, &key_properties),
            Message::Record { stream, record, .. } => {
                let Some(sink) = self.sinks.get(&stream) else {
                    bail!("RECORD for stream {stream} arrived before its SCHEMA");
                };
                let outcome = sink.process_record(&record).await?;
                self.summary
                    .streams
                    .entry(stream)
                    .or_default()
                    .record(&outcome);
                Ok(())
            }
            Message::State { value } => self.emit_state(value, state_out).await,
            Message::ActivateVersion { stream, version } => {
                tracing::debug!(%stream, version, "ignoring ACTIVATE_VERSION");
                Ok(())
            }
            Message::Unknown => {
                tracing::warn!("ignoring unsupported Singer message type");
                Ok(())
            }
        }
    }

    fn register_sink(&mut self, stream: String, key_properties: &[String]) -> Result<()> {
        let kind: StreamKind = stream.parse()?;

        if self.sinks.contains_key(&stream) {
            tracing::debug!(%stream, "schema updated");
        } else {
            tracing::info!(
                %stream,
                endpoint = kind.endpoint(),
                key_properties = ?key_properties,
                "initializing sink"
            );
        }

        let sink = Sink::new(
            kind,
            self.client.clone(),
            self.config.api_credentials.clone(),
        );
        self.sinks.insert(stream, sink);
        Ok(())
    }

    async fn emit_state<W>(&mut self, value: Value, state_out: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        if self.last_state.as_ref() == Some(&value) {
            return Ok(());
        }

        let mut line = serde_json::to_vec(&value)?;
        line.push(b'\n');
        state_out
            .write_all(&line)
            .await
            .context("Failed to write state")?;
        state_out.flush().await.context("Failed to flush state")?;

        tracing::debug!(state = %value, "emitted state");
        self.last_state = Some(value);
        self.summary.states_emitted += 1;
        Ok(())
    }
}

/// Description printed by `--about`.
pub fn about() -> Value {
    json!({
        "name": TARGET_NAME,
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "version": env!("CARGO_PKG_VERSION"),
        "capabilities": ["about"],
        "streams": StreamKind::ALL
            .iter()
            .map(|kind| json!({
                "stream": kind.stream_name(),
                "endpoint": kind.endpoint(),
                "mandatory_fields": kind.mandatory_fields(),
            }))
            .collect::<Vec<_>>(),
        "settings": [
            {"name": "auth_url", "type": "string", "required": false},
            {"name": "api_url", "type": "string", "required": false},
            {"name": "api_credentials.username", "type": "string", "required": true},
            {"name": "api_credentials.password", "type": "string", "required": true, "secret": true},
            {"name": "api_credentials.basic_token", "type": "string", "required": false, "secret": true},
            {"name": "api_credentials.client_id", "type": "string", "required": false},
            {"name": "api_credentials.client_secret", "type": "string", "required": false, "secret": true},
            {"name": "api_credentials.account_id", "type": "integer", "required": false},
            {"name": "api_credentials.coupling_id", "type": "integer", "required": false},
            {"name": "request_timeout", "type": "integer", "required": false},
            {"name": "max_tries", "type": "integer", "required": false},
            {"name": "backoff_factor_ms", "type": "integer", "required": false},
        ],
    })
}
