//! Client sessions for exactly-once command application.
//!
//! A client registers once, then tags every command with a monotonically
//! increasing series ID. The session retains the result of each applied
//! command until the client acknowledges it, so a retried command is
//! answered from the session instead of being applied a second time.
//!
//! ## Module Structure
//!
//! - `record`: The per-client `Session` and the `Dedup` outcome
//! - `lru`: Bounded least-recently-used session collection
//! - `manager`: `SessionManager`, registration, hashing and serialization

mod lru;
mod manager;
mod record;

pub use lru::{Iter, LruSessions};
pub use manager::SessionManager;
pub use record::{Dedup, Session};
