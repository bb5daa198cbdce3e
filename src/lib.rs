//! claude-speak-rs: reads Claude Code's output aloud.
//!
//! The library implements the whole pipeline from transcript tailing to
//! playback; the `claude-speak`, `cc-speak` and `configure` binaries are
//! thin frontends over it.

pub mod backend;
pub mod config;
pub mod error;
pub mod lock;
pub mod monitor;
pub mod normalize;
pub mod player;
pub mod scope;
pub mod segment;
pub mod server;
pub mod speech;
pub mod tailer;
pub mod transcript;

pub use error::SpeakError;
