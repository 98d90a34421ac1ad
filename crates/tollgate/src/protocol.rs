//! Binary framing protocol for Tollgate-engine communication.
//!
//! All frames use little-endian byte order. Every frame is length-prefixed
//! (`[4: len][len bytes]`) and its body starts with a one-byte frame type.
//! Strings are `[4: len][utf-8 bytes]`.

use crate::audience::OperationType;
use crate::error::{ShimError, ShimResult};
use uuid::Uuid;

/// Frame type identifier for HelloFrame.
pub const FRAME_TYPE_HELLO: u8 = 0x01;

/// Frame type identifier for HelloAckFrame.
pub const FRAME_TYPE_HELLO_ACK: u8 = 0x02;

/// Frame type identifier for ProcessFrame.
pub const FRAME_TYPE_PROCESS: u8 = 0x03;

/// Frame type identifier for ProcessResultFrame.
pub const FRAME_TYPE_PROCESS_RESULT: u8 = 0x04;

pub const CLIENT_TYPE_SDK: u8 = 0x01;
pub const CLIENT_TYPE_SHIM: u8 = 0x02;

pub const OPERATION_TYPE_CONSUMER: u8 = 0x01;
pub const OPERATION_TYPE_PRODUCER: u8 = 0x02;

/// Largest frame body either side accepts, excluding the length prefix.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

pub const EXEC_STATUS_MODIFIED: u8 = 0x01;
pub const EXEC_STATUS_UNMODIFIED: u8 = 0x02;
pub const EXEC_STATUS_ERROR: u8 = 0x03;

/// Kind of client opening a session.
///
/// Lets the engine tell wrapper traffic apart from native SDK traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    Sdk,
    Shim,
}

impl ClientType {
    pub fn from_byte(byte: u8) -> ShimResult<Self> {
        match byte {
            CLIENT_TYPE_SDK => Ok(ClientType::Sdk),
            CLIENT_TYPE_SHIM => Ok(ClientType::Shim),
            other => Err(ShimError::Protocol(format!(
                "Unknown client type byte: {:#04x}",
                other
            ))),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            ClientType::Sdk => CLIENT_TYPE_SDK,
            ClientType::Shim => CLIENT_TYPE_SHIM,
        }
    }
}

/// Outcome status of one processing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    /// Engine ran and produced a (possibly different) payload.
    Modified,
    /// Engine ran and left the payload as it was.
    Unmodified,
    /// Engine could not process the payload.
    Error,
}

impl ExecStatus {
    pub fn from_byte(byte: u8) -> ShimResult<Self> {
        match byte {
            EXEC_STATUS_MODIFIED => Ok(ExecStatus::Modified),
            EXEC_STATUS_UNMODIFIED => Ok(ExecStatus::Unmodified),
            EXEC_STATUS_ERROR => Ok(ExecStatus::Error),
            other => Err(ShimError::Protocol(format!(
                "Unknown exec status byte: {:#04x}",
                other
            ))),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            ExecStatus::Modified => EXEC_STATUS_MODIFIED,
            ExecStatus::Unmodified => EXEC_STATUS_UNMODIFIED,
            ExecStatus::Error => EXEC_STATUS_ERROR,
        }
    }
}

fn operation_type_to_byte(ot: OperationType) -> u8 {
    match ot {
        OperationType::Consumer => OPERATION_TYPE_CONSUMER,
        OperationType::Producer => OPERATION_TYPE_PRODUCER,
    }
}

fn operation_type_from_byte(byte: u8) -> ShimResult<OperationType> {
    match byte {
        OPERATION_TYPE_CONSUMER => Ok(OperationType::Consumer),
        OPERATION_TYPE_PRODUCER => Ok(OperationType::Producer),
        other => Err(ShimError::Protocol(format!(
            "Unknown operation type byte: {:#04x}",
            other
        ))),
    }
}

/// Appends frame bodies and wraps them with the length prefix.
struct FrameWriter {
    buf: Vec<u8>,
    frame: &'static str,
    overflow: bool,
}

impl FrameWriter {
    fn new(frame_type: u8, frame: &'static str, capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(4 + 1 + capacity.min(MAX_FRAME_SIZE));
        // Length prefix is patched in `finish`
        buf.extend_from_slice(&[0u8; 4]);
        buf.push(frame_type);
        Self {
            buf,
            frame,
            overflow: false,
        }
    }

    fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    fn bytes(&mut self, value: &[u8]) -> &mut Self {
        match u32::try_from(value.len()) {
            Ok(len) if !self.overflow => {
                self.buf.extend_from_slice(&len.to_le_bytes());
                self.buf.extend_from_slice(value);
            }
            _ => self.overflow = true,
        }
        self
    }

    fn str(&mut self, value: &str) -> &mut Self {
        self.bytes(value.as_bytes())
    }

    fn uuid(&mut self, value: &Uuid) -> &mut Self {
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    fn finish(&mut self) -> ShimResult<Vec<u8>> {
        let body_len = self.buf.len() - 4;
        if self.overflow || body_len > MAX_FRAME_SIZE {
            return Err(ShimError::Protocol(format!(
                "{} exceeds maximum frame size of {} bytes",
                self.frame, MAX_FRAME_SIZE
            )));
        }

        let prefix = u32::try_from(body_len).map_err(|_| {
            ShimError::Protocol(format!("{} length does not fit the prefix", self.frame))
        })?;
        self.buf[0..4].copy_from_slice(&prefix.to_le_bytes());
        Ok(std::mem::take(&mut self.buf))
    }
}

/// Cursor over a frame body (excluding the length prefix).
struct FrameReader<'a> {
    data: &'a [u8],
    pos: usize,
    frame: &'static str,
}

impl<'a> FrameReader<'a> {
    fn new(data: &'a [u8], expected_type: u8, frame: &'static str) -> ShimResult<Self> {
        match data.first() {
            None => Err(ShimError::Protocol(format!("{} is empty", frame))),
            Some(&t) if t != expected_type => Err(ShimError::Protocol(format!(
                "Expected {} type {:#04x}, got {:#04x}",
                frame, expected_type, t
            ))),
            Some(_) => Ok(Self { data, pos: 1, frame }),
        }
    }

    fn take(&mut self, n: usize) -> ShimResult<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let slice = &self.data[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(ShimError::Protocol(format!(
                "{} truncated: need {} bytes at offset {}, have {}",
                self.frame,
                n,
                self.pos,
                self.data.len()
            ))),
        }
    }

    fn u8(&mut self) -> ShimResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> ShimResult<u32> {
        let raw: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| ShimError::Protocol(format!("{}: invalid length field", self.frame)))?;
        Ok(u32::from_le_bytes(raw))
    }

    fn bytes(&mut self) -> ShimResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn string(&mut self) -> ShimResult<String> {
        let raw = self.bytes()?;
        String::from_utf8(raw)
            .map_err(|e| ShimError::Protocol(format!("{}: invalid utf-8 string: {}", self.frame, e)))
    }

    fn uuid(&mut self) -> ShimResult<Uuid> {
        let raw: [u8; 16] = self
            .take(16)?
            .try_into()
            .map_err(|_| ShimError::Protocol(format!("{}: invalid request_id", self.frame)))?;
        Ok(Uuid::from_bytes(raw))
    }

    fn finish(self) -> ShimResult<()> {
        if self.pos != self.data.len() {
            return Err(ShimError::Protocol(format!(
                "{} size mismatch: got {} bytes, expected {}",
                self.frame,
                self.data.len(),
                self.pos
            )));
        }
        Ok(())
    }
}

/// Session opening frame sent from Tollgate to the engine.
///
/// Wire format:
/// ```text
/// [4: total_len][1: type=0x01][1: client_type][str: auth_token][str: service_name]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloFrame {
    pub client_type: ClientType,
    pub auth_token: String,
    pub service_name: String,
}

impl HelloFrame {
    pub fn shim(auth_token: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            client_type: ClientType::Shim,
            auth_token: auth_token.into(),
            service_name: service_name.into(),
        }
    }

    pub fn encode(&self) -> ShimResult<Vec<u8>> {
        FrameWriter::new(FRAME_TYPE_HELLO, "HelloFrame", 9 + self.auth_token.len() + self.service_name.len())
            .u8(self.client_type.to_byte())
            .str(&self.auth_token)
            .str(&self.service_name)
            .finish()
    }

    pub fn decode(data: &[u8]) -> ShimResult<Self> {
        let mut r = FrameReader::new(data, FRAME_TYPE_HELLO, "HelloFrame")?;
        let client_type = ClientType::from_byte(r.u8()?)?;
        let auth_token = r.string()?;
        let service_name = r.string()?;
        r.finish()?;

        Ok(Self {
            client_type,
            auth_token,
            service_name,
        })
    }
}

/// Session answer sent from the engine to Tollgate.
///
/// Wire format:
/// ```text
/// [4: total_len][1: type=0x02][1: accepted][str: message]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloAckFrame {
    pub accepted: bool,
    pub message: String,
}

impl HelloAckFrame {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            message: String::new(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
        }
    }

    pub fn encode(&self) -> ShimResult<Vec<u8>> {
        FrameWriter::new(FRAME_TYPE_HELLO_ACK, "HelloAckFrame", 5 + self.message.len())
            .u8(self.accepted as u8)
            .str(&self.message)
            .finish()
    }

    pub fn decode(data: &[u8]) -> ShimResult<Self> {
        let mut r = FrameReader::new(data, FRAME_TYPE_HELLO_ACK, "HelloAckFrame")?;
        let accepted = r.u8()? != 0;
        let message = r.string()?;
        r.finish()?;

        Ok(Self { accepted, message })
    }
}

/// Processing request sent from Tollgate to the engine.
///
/// Wire format:
/// ```text
/// [4: total_len][1: type=0x03][16: request_id][1: operation_type]
/// [str: component_name][str: operation_name][4: data_len][N: data]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessFrame {
    /// Correlates the request with its result.
    pub request_id: Uuid,
    pub operation_type: OperationType,
    pub component_name: String,
    pub operation_name: String,
    pub data: Vec<u8>,
}

impl ProcessFrame {
    pub fn encode(&self) -> ShimResult<Vec<u8>> {
        let capacity =
            16 + 1 + 12 + self.component_name.len() + self.operation_name.len() + self.data.len();
        FrameWriter::new(FRAME_TYPE_PROCESS, "ProcessFrame", capacity)
            .uuid(&self.request_id)
            .u8(operation_type_to_byte(self.operation_type))
            .str(&self.component_name)
            .str(&self.operation_name)
            .bytes(&self.data)
            .finish()
    }

    pub fn decode(data: &[u8]) -> ShimResult<Self> {
        let mut r = FrameReader::new(data, FRAME_TYPE_PROCESS, "ProcessFrame")?;
        let request_id = r.uuid()?;
        let operation_type = operation_type_from_byte(r.u8()?)?;
        let component_name = r.string()?;
        let operation_name = r.string()?;
        let payload = r.bytes()?;
        r.finish()?;

        Ok(Self {
            request_id,
            operation_type,
            component_name,
            operation_name,
            data: payload,
        })
    }
}

/// Processing result sent from the engine to Tollgate.
///
/// Wire format:
/// ```text
/// [4: total_len][1: type=0x04][16: request_id][1: status][1: has_message]
/// [str: status_message (if has_message)][4: data_len][N: data]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResultFrame {
    pub request_id: Uuid,
    pub status: ExecStatus,
    pub status_message: Option<String>,
    pub data: Vec<u8>,
}

impl ProcessResultFrame {
    pub fn encode(&self) -> ShimResult<Vec<u8>> {
        let message_len = self.status_message.as_ref().map_or(0, |m| 4 + m.len());
        let mut w = FrameWriter::new(
            FRAME_TYPE_PROCESS_RESULT,
            "ProcessResultFrame",
            16 + 2 + message_len + 4 + self.data.len(),
        );
        w.uuid(&self.request_id).u8(self.status.to_byte());

        match &self.status_message {
            Some(message) => {
                w.u8(1).str(message);
            }
            None => {
                w.u8(0);
            }
        }

        w.bytes(&self.data).finish()
    }

    pub fn decode(data: &[u8]) -> ShimResult<Self> {
        let mut r = FrameReader::new(data, FRAME_TYPE_PROCESS_RESULT, "ProcessResultFrame")?;
        let request_id = r.uuid()?;
        let status = ExecStatus::from_byte(r.u8()?)?;
        let status_message = match r.u8()? {
            0 => None,
            _ => Some(r.string()?),
        };
        let payload = r.bytes()?;
        r.finish()?;

        Ok(Self {
            request_id,
            status,
            status_message,
            data: payload,
        })
    }
}

/// Read a length-prefixed frame from a buffer.
///
/// Returns `Ok(None)` if there isn't enough data for a complete frame.
/// Returns `Ok(Some((frame_data, consumed)))` with the frame data (excluding
/// length prefix) and the total bytes consumed. A prefix larger than
/// [`MAX_FRAME_SIZE`] is an error as soon as the prefix is readable, so the
/// caller never buffers toward it.
pub fn read_frame(buf: &[u8]) -> ShimResult<Option<(&[u8], usize)>> {
    let prefix: [u8; 4] = match buf.get(0..4).and_then(|p| p.try_into().ok()) {
        Some(prefix) => prefix,
        None => return Ok(None),
    };

    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ShimError::Protocol(format!(
            "Frame length {} exceeds maximum of {} bytes",
            len, MAX_FRAME_SIZE
        )));
    }

    if buf.len() < 4 + len {
        return Ok(None);
    }

    Ok(Some((&buf[4..4 + len], 4 + len)))
}
