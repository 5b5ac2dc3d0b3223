//! UDP session client for the miIO protocol.
//!
//! A [`MiioDevice`] owns one socket connected to one vacuum. Requests
//! carry a non-zero wrapping id; the client sends a single datagram per
//! call and reads until the matching-id response arrives or a fixed
//! deadline passes. Unreadable datagrams and responses for other ids are
//! skipped. No retries, no reconnection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::Mutex;
use tokio::time::{self, Instant};

use super::{packet, Token};
use crate::config::RobotConfig;
use crate::device::{Connector, DeviceInfo, Vacuum};
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// How long to wait for the device to answer a single request.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for the hello handshake reply.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);

const MAX_DATAGRAM: usize = 4096;

/// An authenticated session with one vacuum.
pub struct MiioDevice {
    token: Token,
    model: Option<String>,
    inner: Mutex<Channel>,
}

// Socket plus the per-session bookkeeping that must not interleave
// between concurrent calls. A shared handle serializes calls here; a
// single UDP socket cannot demultiplex interleaved responses.
struct Channel {
    socket: UdpSocket,
    device_id: u32,
    /// Device clock at handshake; requests carry the extrapolated value.
    stamp: u32,
    stamp_at: Instant,
    next_id: u32,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Option<u32>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl Channel {
    fn request_stamp(&self) -> u32 {
        self.stamp.wrapping_add(self.stamp_at.elapsed().as_secs() as u32)
    }

    fn next_request_id(&mut self) -> u32 {
        self.next_id = self.next_id.wrapping_add(1);
        if self.next_id == 0 {
            self.next_id = 1;
        }
        self.next_id
    }

    async fn roundtrip(
        &mut self,
        token: &Token,
        method: &str,
        params: &Value,
    ) -> Result<Value> {
        let id = self.next_request_id();
        let payload = serde_json::to_vec(&json!({
            "id": id,
            "method": method,
            "params": params,
        }))?;
        let datagram =
            packet::encode(token, self.device_id, self.request_stamp(), &payload)?;
        self.socket.send(&datagram).await?;

        let deadline = Instant::now() + RESPONSE_TIMEOUT;
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout(RESPONSE_TIMEOUT));
            }
            let n = match time::timeout(remaining, self.socket.recv(&mut buf))
                .await
            {
                Ok(read) => read?,
                Err(_) => return Err(Error::Timeout(RESPONSE_TIMEOUT)),
            };

            let payload = match packet::decode(token, &buf[..n]) {
                Ok((_, payload)) => payload,
                Err(e) => {
                    warn!(error = %e, "discarding unreadable datagram");
                    continue;
                }
            };
            if payload.is_empty() {
                // Keepalive / hello-style frame.
                continue;
            }

            // Checksum-valid but unparseable payloads get the same skip
            // treatment as any other unreadable datagram.
            let response: RpcResponse = match serde_json::from_slice(&payload) {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "discarding non-JSON payload");
                    continue;
                }
            };
            if response.id != Some(id) {
                debug!(
                    got = ?response.id,
                    expected = id,
                    "skipping response for another request"
                );
                continue;
            }
            if let Some(err) = response.error {
                return Err(Error::Device {
                    code: err.code,
                    message: err.message,
                });
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }
}

impl MiioDevice {
    /// Connect to the device at `address` on the standard miIO port.
    pub async fn connect(address: &str, token: Token) -> Result<Self> {
        Self::connect_addr((address, packet::PORT), token).await
    }

    async fn connect_addr<A: ToSocketAddrs>(
        addr: A,
        token: Token,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.connect(addr).await?;

        socket.send(&packet::hello()).await?;
        let mut buf = [0u8; MAX_DATAGRAM];
        let n = time::timeout(HANDSHAKE_TIMEOUT, socket.recv(&mut buf))
            .await
            .map_err(|_| Error::Timeout(HANDSHAKE_TIMEOUT))??;
        let header = packet::parse_header(&buf[..n])?;
        debug!(
            device_id = header.device_id,
            stamp = header.stamp,
            "handshake complete"
        );

        let mut device = Self {
            token,
            model: None,
            inner: Mutex::new(Channel {
                socket,
                device_id: header.device_id,
                stamp: header.stamp,
                stamp_at: Instant::now(),
                next_id: 0,
            }),
        };

        // Resolve the model up front so the handle can report it, the way
        // node-miio populates `device.model` at creation. An unreadable
        // report is not fatal.
        match device.raw_call("miIO.info", &Value::Array(Vec::new())).await {
            Ok(raw) => {
                device.model = serde_json::from_value::<DeviceInfo>(raw)
                    .ok()
                    .and_then(|info| info.model);
            }
            Err(e) => {
                warn!(error = %e, "could not resolve device model at connect");
            }
        }

        Ok(device)
    }

    async fn raw_call(&self, method: &str, params: &Value) -> Result<Value> {
        let mut channel = self.inner.lock().await;
        channel.roundtrip(&self.token, method, params).await
    }
}

#[async_trait]
impl Vacuum for MiioDevice {
    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        debug!(method, "remote call");
        self.raw_call(method, &params).await
    }
}

/// Connects to the configured robot on first use.
pub struct MiioConnector {
    config: RobotConfig,
}

impl MiioConnector {
    pub fn new(config: RobotConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for MiioConnector {
    async fn connect(&self) -> Result<Arc<dyn Vacuum>> {
        info!(address = %self.config.address, "connecting to vacuum");
        let device =
            MiioDevice::connect(&self.config.address, self.config.token.clone())
                .await?;
        Ok(Arc::new(device))
    }
}
