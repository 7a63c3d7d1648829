//! Cart persistence backends.
//!
//! A session picks exactly one backend when it is opened: guests get an
//! [`EphemeralBackend`](super::EphemeralBackend), signed-in users a
//! [`RemoteBackend`](super::RemoteBackend). The store never branches on
//! identity after that.

use async_trait::async_trait;

use danceflow_core::{CartRowId, CartSnapshot};

use super::mutation::CartWrite;
use crate::error::RemoteError;

/// Which kind of storage a backend uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Ephemeral,
    Remote,
}

impl core::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Ephemeral => "ephemeral",
            Self::Remote => "remote",
        })
    }
}

/// Result of a successful backend write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Row id assigned to the upserted line, if the backend has rows.
    pub row_id: Option<CartRowId>,
}

/// Storage behind a [`CartStore`](super::CartStore).
#[async_trait]
pub trait CartBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Read the stored cart.
    async fn load(&self) -> Result<CartSnapshot, RemoteError>;

    /// Persist `write`. `after` is the snapshot the write was derived from.
    async fn apply(&self, write: &CartWrite, after: &CartSnapshot) -> Result<ApplyOutcome, RemoteError>;

    /// Drop storage owned only by this session. Called once the cart has been
    /// handed over to another backend.
    async fn release(&self) {}
}
