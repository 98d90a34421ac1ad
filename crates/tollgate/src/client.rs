//! Socket client for communicating with the processing engine.

use crate::config::{EngineEndpoint, ShimConfig};
use crate::engine::{Engine, ProcessRequest, ProcessResponse};
use crate::error::{ShimError, ShimResult};
use crate::protocol::{read_frame, HelloAckFrame, HelloFrame, ProcessFrame, ProcessResultFrame};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

trait EngineStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> EngineStream for T {}

/// One authenticated connection to the engine.
struct Session {
    stream: Box<dyn EngineStream>,
    read_buf: Vec<u8>,
    /// Set while a request is written but its result not yet read.
    in_flight: bool,
}

impl Session {
    /// Connect and perform the hello handshake, all within the request
    /// deadline when one is configured.
    async fn open(config: &ShimConfig) -> ShimResult<Self> {
        with_deadline(config.request_timeout, Self::handshake(config)).await
    }

    async fn handshake(config: &ShimConfig) -> ShimResult<Self> {
        let stream = connect_stream(&config.endpoint).await?;

        let mut session = Self {
            stream,
            read_buf: Vec::with_capacity(4096),
            in_flight: false,
        };

        let hello = HelloFrame::shim(config.auth_token.as_str(), config.service_name.as_str());
        session.write(&hello.encode()?).await?;

        let body = session.read_frame_body().await?;
        let ack = HelloAckFrame::decode(&body)?;

        if !ack.accepted {
            return Err(ShimError::SessionRejected(ack.message));
        }

        debug!(endpoint = %config.endpoint, "Engine session established");

        Ok(session)
    }

    async fn write(&mut self, bytes: &[u8]) -> ShimResult<()> {
        self.stream.write_all(bytes).await.map_err(|e| {
            ShimError::EngineConnection(format!("Failed to write to engine: {}", e))
        })
    }

    /// Read one frame body (without the length prefix).
    async fn read_frame_body(&mut self) -> ShimResult<Vec<u8>> {
        loop {
            // Try to parse a complete frame from the buffer
            if let Some((frame_data, consumed)) = read_frame(&self.read_buf)? {
                let body = frame_data.to_vec();
                self.read_buf.drain(..consumed);
                return Ok(body);
            }

            // Need more data
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await.map_err(|e| {
                ShimError::EngineConnection(format!("Failed to read from engine: {}", e))
            })?;

            if n == 0 {
                return Err(ShimError::EngineConnection(
                    "Engine closed connection".to_string(),
                ));
            }

            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Send one encoded processing frame and wait for its result.
    async fn round_trip(
        &mut self,
        request_id: Uuid,
        encoded: &[u8],
    ) -> ShimResult<ProcessResultFrame> {
        self.in_flight = true;
        self.write(encoded).await?;

        let body = self.read_frame_body().await?;
        let result = ProcessResultFrame::decode(&body)?;
        self.in_flight = false;

        // Verify the request ID matches
        if result.request_id != request_id {
            return Err(ShimError::Protocol(format!(
                "Result request_id mismatch: expected {}, got {}",
                request_id, result.request_id
            )));
        }

        Ok(result)
    }
}

async fn connect_stream(endpoint: &EngineEndpoint) -> ShimResult<Box<dyn EngineStream>> {
    let connect_err =
        |e: std::io::Error| ShimError::EngineConnection(format!("Failed to connect to engine at {}: {}", endpoint, e));

    match endpoint {
        EngineEndpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr.as_str()).await.map_err(connect_err)?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        EngineEndpoint::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path).await.map_err(connect_err)?;
            Ok(Box::new(stream))
        }
        #[cfg(not(unix))]
        EngineEndpoint::Unix(_) => Err(ShimError::EngineConnection(format!(
            "Unix sockets are not supported on this platform: {}",
            endpoint
        ))),
    }
}

async fn with_deadline<T, F>(limit: Option<Duration>, fut: F) -> ShimResult<T>
where
    F: Future<Output = ShimResult<T>>,
{
    match limit {
        Some(limit) => timeout(limit, fut)
            .await
            .map_err(|_| ShimError::Timeout(limit.as_millis() as u64))?,
        None => fut.await,
    }
}

/// Client for the processing engine.
///
/// Holds one session. Calls from concurrent tasks queue on it. After an I/O
/// failure, a timeout, or an abandoned call the session is discarded and the
/// next call opens a fresh one.
pub struct EngineClient {
    config: ShimConfig,
    session: Mutex<Option<Session>>,
}

impl EngineClient {
    /// Connect to the engine and open the first session.
    ///
    /// Fails if the engine is unreachable or rejects the credentials.
    pub async fn connect(config: ShimConfig) -> ShimResult<Self> {
        let session = Session::open(&config).await?;

        Ok(Self {
            config,
            session: Mutex::new(Some(session)),
        })
    }

    pub fn endpoint(&self) -> &EngineEndpoint {
        &self.config.endpoint
    }

    async fn call(&self, request: ProcessRequest) -> ShimResult<ProcessResultFrame> {
        let frame = ProcessFrame {
            request_id: Uuid::new_v4(),
            operation_type: request.operation_type,
            component_name: request.component_name,
            operation_name: request.operation_name,
            data: request.data,
        };
        // An unencodable payload never touches the session
        let encoded = frame.encode()?;

        let mut guard = self.session.lock().await;

        if guard.as_ref().is_some_and(|s| s.in_flight) {
            warn!("Discarding engine session with an abandoned request");
            *guard = None;
        }

        if guard.is_none() {
            debug!(endpoint = %self.config.endpoint, "Reopening engine session");
            *guard = Some(Session::open(&self.config).await?);
        }

        let session = guard
            .as_mut()
            .ok_or_else(|| ShimError::EngineConnection("No engine session".to_string()))?;

        let outcome = with_deadline(
            self.config.request_timeout,
            session.round_trip(frame.request_id, &encoded),
        )
        .await;

        if outcome.is_err() {
            // Force reconnect on next attempt
            *guard = None;
        }

        outcome
    }
}

#[async_trait]
impl Engine for EngineClient {
    async fn process(&self, request: ProcessRequest) -> ProcessResponse {
        match self.call(request).await {
            Ok(result) => ProcessResponse {
                status: result.status,
                data: result.data,
                status_message: result.status_message,
            },
            Err(e) => {
                debug!(error = %e, "Engine call failed");
                ProcessResponse::error(e.to_string())
            }
        }
    }
}
