//! # duosync - two-party directory synchronizer
//!
//! Keeps a managed directory on a client in sync with a managed directory on
//! a server over a length-prefixed TCP protocol, using content hashes and a
//! monotonic version counter to detect conflicting concurrent changes.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use duosync::config::Config;
//! use duosync::client::run_session;
//! use duosync::types::Direction;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None, "default").await?;
//!     let outcome = run_session(&config, Direction::Push).await?;
//!     println!("uploaded {} files", outcome.uploaded);
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(dead_code)]

pub mod cli;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod exclusion;
pub mod logging;
pub mod planner;
pub mod protocol;
pub mod scanner;
pub mod session;
pub mod state;
pub mod transfer;
pub mod types;
pub mod util;

pub use config::Config;
pub use error::{ConflictError, IntegrityError, ProtocolError, StateError, SyncError, TransportError};
pub use planner::{plan, Plan};
pub use scanner::{Change, Scanner};
pub use state::StateStore;
pub use types::{Action, Direction, EntryStatus, FileEntry, SyncItem, SyncState};

// vim: ts=4
