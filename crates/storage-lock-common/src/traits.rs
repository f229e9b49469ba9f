//! Storage and connection abstractions
//!
//! A lock manager talks to a [`Storage`] only; backends borrow their
//! connections from a [`ConnectionManager`] per operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::Result;
use crate::model::{LockInformation, Version};

/// Lazy, single-pass sequence of decoded lock records
pub type LockInformationStream = BoxStream<'static, Result<LockInformation>>;

/// Connection source a backend borrows from for the span of one operation
///
/// The backend never creates, pools or closes raw connections itself.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    type Connection: Send + Sync + 'static;

    fn name(&self) -> &str;

    /// Take a connection, waiting for the pool if necessary
    async fn take(&self) -> Result<Self::Connection>;

    /// Hand a connection back once the operation is done with it
    ///
    /// Called on every exit path, including drops during unwinding, so it
    /// must not block.
    fn give_back(&self, connection: Self::Connection) -> Result<()>;

    /// Release everything the manager owns
    async fn shutdown(&self) -> Result<()>;
}

/// Version-gated persistence of lock records
#[async_trait]
pub trait Storage: Send + Sync {
    fn name(&self) -> &str;

    /// Idempotently prepare the backing store
    async fn init(&self) -> Result<()>;

    /// Overwrite a record if and only if it is currently at `expected_version`
    async fn update_with_version(
        &self,
        lock_id: &str,
        expected_version: Version,
        new_version: Version,
        lock_information: &LockInformation,
    ) -> Result<()>;

    /// Insert a record that must not exist yet
    async fn create_with_version(
        &self,
        lock_id: &str,
        version: Version,
        lock_information: &LockInformation,
    ) -> Result<()>;

    /// Remove a record if and only if it is currently at `expected_version`
    async fn delete_with_version(
        &self,
        lock_id: &str,
        expected_version: Version,
        lock_information: &LockInformation,
    ) -> Result<()>;

    /// Fetch the serialized lock information of one record
    async fn get(&self, lock_id: &str) -> Result<String>;

    /// Current time as seen by the storage
    ///
    /// No correction is made for network latency or skew between storage
    /// instances.
    async fn get_time(&self) -> Result<DateTime<Utc>>;

    /// Stream every stored record in storage-defined order
    async fn list(&self) -> Result<LockInformationStream>;

    async fn close(&self) -> Result<()>;
}
