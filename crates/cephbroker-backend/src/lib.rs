//! Backend layer for the CephFS service broker.
//!
//! This crate maps the logical share operations (mount the filesystem, create,
//! delete and locate a share, read connection details) onto local directory
//! operations and a single external command, `ceph-fuse`. Process execution is
//! behind the [`Invoker`] trait so the broker can be exercised without a real
//! cluster, using [`MockInvoker`].

pub mod client;
pub mod invoker;
pub mod mock;

pub use client::{
    validate_share_name, BackendClient, CephClient, CephClientConfig, ConnectionDetails, SharePaths,
    CELL_BASE_PATH,
};
pub use invoker::{Invoker, ShellInvoker, CEPH_FUSE};
pub use mock::{Invocation, MockInvoker};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("share not found, internal error")]
    ShareNotFound,
    #[error("unable to open cephfs keyring")]
    KeyringNotFound,
    #[error("error retrieving ceph config details: {0}")]
    MissingConfig(&'static str),
    #[error("invalid share name '{0}'")]
    InvalidShareName(String),
    #[error("failed to create local directory '{0}', mount filesystem failed")]
    MountDirCreate(String),
    #[error("failed to create share '{0}'")]
    ShareCreate(String),
    #[error("failed to delete share '{0}'")]
    ShareDelete(String),
    #[error("command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },
}
