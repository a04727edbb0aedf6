//! karavan-state: grouped-key status store for Karavan.
//!
//! Projects, project files, runtime statuses, environments and commit
//! markers live in named caches. A process runs on exactly one backend:
//!
//! - **embedded**: a local [redb](https://docs.rs/redb) file, one table per
//!   cache, values JSON-serialized into `&[u8]` columns;
//! - **remote**: a clustered cache server reached through a
//!   [`RemoteCacheManager`](cache::RemoteCacheManager), with documents
//!   tagged by entity type so they can be queried server-side.
//!
//! [`StatusStore`] is the typed façade. It is `Clone` + `Send` + `Sync` and
//! can be shared across async tasks.

pub mod cache;
pub mod catalog;
pub mod error;
pub mod key;
pub mod query;
pub mod store;
pub mod template;
pub mod types;

pub use cache::{Backend, Mode};
pub use error::{CacheFailure, StateError, StateResult};
pub use key::{CacheKey, GroupedKey};
pub use store::StatusStore;
pub use template::PropertiesTemplate;
pub use types::*;
