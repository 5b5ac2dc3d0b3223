//! Device-facing seams and the shared connection holder.
//!
//! The HTTP layer never talks to the protocol client directly; it goes
//! through [`DeviceHolder`], which owns a [`Connector`] and caches the
//! [`Vacuum`] handle it produces. Both traits are object-safe so tests
//! can stand in a fake device.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::Result;

/// An authenticated session capable of remote method calls against one
/// physical device.
#[async_trait]
pub trait Vacuum: Send + Sync {
    /// Model reported by the handle itself, when known.
    fn model(&self) -> Option<&str>;

    /// Invoke a remote method with the given parameters.
    async fn call(&self, method: &str, params: Value) -> Result<Value>;
}

/// Establishes a [`Vacuum`] session.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Vacuum>>;
}

/// Fields of interest from a `miIO.info` report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub fw_ver: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
}

/// Lazily initialized, process-wide connection cache.
///
/// The first caller pays for connection setup; everyone after gets the
/// cached handle without renegotiating. Initialization runs at most once
/// even under concurrent first requests; a failed attempt leaves the cell
/// empty so a later request can try again. A handle that goes stale
/// afterwards is never refreshed.
pub struct DeviceHolder {
    connector: Box<dyn Connector>,
    cell: OnceCell<Arc<dyn Vacuum>>,
}

impl DeviceHolder {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            cell: OnceCell::new(),
        }
    }

    /// Return the cached handle, connecting first if none exists yet.
    pub async fn get(&self) -> Result<Arc<dyn Vacuum>> {
        self.cell
            .get_or_try_init(|| self.connector.connect())
            .await
            .map(Arc::clone)
    }
}
