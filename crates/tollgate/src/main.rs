//! Tollgate command-line producer.
//!
//! Usage: tollgate --topic <topic> [--component <c>] [--operation <o>]
//!        [--strict-errors] [--key-delim <d>] [--log-file <path> | --log-jsonl]
//!
//! Reads lines from stdin, sends each one through the intercepting producer
//! and prints the record that would reach the broker as
//! `topic<TAB>partition<TAB>key<TAB>value`. Engine settings come from the
//! `TOLLGATE_ENGINE_*` environment variables; without them the binary runs in
//! pass-through mode.

use async_trait::async_trait;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tollgate::audience::{DEFAULT_COMPONENT_NAME, DEFAULT_OPERATION_NAME};
use tollgate::message::ANY_PARTITION;
use tollgate::{
    AudienceOverride, Delivery, Gate, InterceptingProducer, ProducedRecord, ProducerMessage,
    RuntimeConfig, ShimError, ShimResult, StringEncoder, Transport,
};
use tracing::{error, info};

/// Tollgate: send stdin lines through the payload interception shim.
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(about = "Send stdin lines through the payload interception shim")]
struct Args {
    /// Topic to produce to.
    #[arg(long, env = "TOLLGATE_TOPIC")]
    topic: String,

    /// Component name reported to the engine.
    #[arg(long)]
    component: Option<String>,

    /// Operation name reported to the engine (defaults to the topic).
    #[arg(long)]
    operation: Option<String>,

    /// Fail the send when the engine reports an error.
    #[arg(long)]
    strict_errors: bool,

    /// Split each line into key and value on this delimiter.
    #[arg(long)]
    key_delim: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write JSONL logs to this file instead of stderr.
    #[arg(long, env = "TOLLGATE_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Write JSONL logs to ~/.tollgate/logs/tollgate.jsonl.
    #[arg(long)]
    log_jsonl: bool,
}

/// Transport that prints records instead of sending them to a broker.
struct StdoutTransport {
    out: Mutex<tokio::io::Stdout>,
    next_offset: AtomicI64,
}

impl StdoutTransport {
    fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
            next_offset: AtomicI64::new(0),
        }
    }
}

#[async_trait]
impl Transport for StdoutTransport {
    async fn send(&self, record: ProducedRecord) -> ShimResult<Delivery> {
        let partition = if record.partition == ANY_PARTITION {
            0
        } else {
            record.partition
        };

        let line = format!(
            "{}\t{}\t{}\t{}\n",
            record.topic,
            partition,
            record
                .key
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default(),
            record
                .value
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default(),
        );

        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes())
            .await
            .map_err(|e| ShimError::Transport(format!("Failed to write record: {}", e)))?;
        out.flush()
            .await
            .map_err(|e| ShimError::Transport(format!("Failed to flush record: {}", e)))?;

        Ok(Delivery {
            partition,
            offset: self.next_offset.fetch_add(1, Ordering::SeqCst),
        })
    }
}

/// Runtime override for the flags, or `None` when every flag is at its
/// default.
fn runtime_config(args: &Args) -> Option<RuntimeConfig> {
    let component = args
        .component
        .as_deref()
        .filter(|c| *c != DEFAULT_COMPONENT_NAME);
    let operation = args
        .operation
        .as_deref()
        .filter(|o| *o != DEFAULT_OPERATION_NAME);

    if component.is_none() && operation.is_none() && !args.strict_errors {
        return None;
    }

    let mut rc = RuntimeConfig::default().with_strict_errors(args.strict_errors);
    if component.is_some() || operation.is_some() {
        rc = rc.with_audience(AudienceOverride::new(
            component.unwrap_or_default(),
            operation.unwrap_or_default(),
        ));
    }

    Some(rc)
}

/// Build a message from one input line.
fn build_message(topic: &str, line: &str, key_delim: Option<&str>) -> ProducerMessage {
    let msg = ProducerMessage::new(topic);

    match key_delim.and_then(|d| line.split_once(d)) {
        Some((key, value)) => msg
            .with_key(StringEncoder::from(key))
            .with_value(StringEncoder::from(value)),
        None => msg.with_value(StringEncoder::from(line)),
    }
}

#[tokio::main]
async fn main() -> ShimResult<()> {
    let args = Args::parse();

    let log_path = match (&args.log_file, args.log_jsonl) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => observability::default_log_path("tollgate"),
        (None, false) => None,
    };

    // Initialize logging via observability crate
    observability::init_with_config(observability::LogConfig {
        service_name: "tollgate".into(),
        default_level: args.log_level.clone(),
        log_path,
        also_stderr: false,
    });

    info!(topic = %args.topic, "Tollgate starting...");

    let runtime = runtime_config(&args);
    let gate = Gate::from_env().await;
    info!(
        engine_enabled = gate.is_enabled(),
        override_attached = runtime.is_some(),
        "Gate ready"
    );

    let producer = InterceptingProducer::new(gate, StdoutTransport::new());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let (mut sent, mut failed) = (0u64, 0u64);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut ctrl_c => {
                info!("Received shutdown signal, exiting...");
                break;
            }
        };

        let line = match line {
            Some(line) => line,
            None => break,
        };

        if line.is_empty() {
            continue;
        }

        let msg = build_message(&args.topic, &line, args.key_delim.as_deref());
        match producer.send_message(msg, runtime.as_ref()).await {
            Ok(_) => sent += 1,
            Err(e) => {
                failed += 1;
                error!(error = %e, "Failed to send message");
            }
        }
    }

    info!(sent, failed, "Tollgate finished");

    Ok(())
}
