//! Kubernetes Object Store
//!
//! Key-addressed CRUD over the two kinds the Dummy controller touches:
//! `Dummy` custom resources and the `Pod`s they own.
//!
//! # Example
//!
//! ```no_run
//! use kube_store::{KubeObjectStore, ObjectStore, StoreError};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = KubeObjectStore::new(client);
//!
//! match store.get_dummy("default", "w1").await {
//!     Ok(dummy) => println!("found {:?}", dummy.spec),
//!     Err(StoreError::NotFound(_)) => println!("already gone"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The `test-util` feature enables `MockObjectStore`, an in-memory store
//! with optimistic concurrency, finalizer-aware deletion, a write journal and
//! fault injection.

pub mod client;
pub mod error;
pub mod key;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeObjectStore;
pub use error::StoreError;
pub use key::ObjectKey;
pub use store_trait::ObjectStore;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockObjectStore, StoreOp, StoreWrite};
