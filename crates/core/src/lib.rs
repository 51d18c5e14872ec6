//! gitauthors core library.
//!
//! Maintains a cache mapping commit author emails of a GitHub repository to
//! GitHub identities. Each sync cycle reads the commits added since the last
//! run, resolves the new author emails concurrently, and persists the result.

pub mod cache;
pub mod config;
pub mod errors;
pub mod gate;
pub mod git;
pub mod identity;
pub mod race;
pub mod sync_engine;

// Re-exports for convenience.
pub use cache::{AuthorCache, CacheStore};
pub use config::AppConfig;
pub use gate::ConcurrencyGate;
pub use identity::{IdentityResolver, ResolutionRequest};
pub use sync_engine::{SyncEngine, SyncOutcome, SyncSettings};
