//! Identity resolution for commit author emails.
//!
//! The resolution order is:
//! 1. GitHub noreply address (login read from the email, no network)
//! 2. User search by email and commit author lookup, raced
//!    (first success wins)

pub mod noreply;
pub mod resolver;
pub mod service;

pub use resolver::{IdentityResolver, ResolutionRequest};
pub use service::IdentityService;
