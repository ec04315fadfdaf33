//! Shared test doubles for the content sync workspace.
//!
//! - `ScriptedRemote`: in-memory remote content service with scripted
//!   failures, latency and a call gate
//! - `ManualClock`: clock that only moves when told to
//! - `TokioClock`: clock that follows tokio's (pausable) timer
//! - `TestCredentials`: switchable signed-in / signed-out credential source
//! - `FlakyStore`: `MemoryStore` whose commits can be made to fail
//! - `fixtures`: creators, content and remote snapshots

mod clock;
mod credentials;
pub mod fixtures;
mod remote;
mod store;

pub use clock::{ManualClock, TokioClock};
pub use credentials::TestCredentials;
pub use remote::{CallKind, RemoteCall, ScriptedRemote};
pub use store::FlakyStore;
