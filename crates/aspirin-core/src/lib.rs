pub mod config;
pub mod source;
pub mod tracker;
pub mod types;

pub use config::{AspirinConfig, ConfigError};
pub use source::{CommitSource, CommitStub, RemoteError};
pub use tracker::{toggle, InvalidSha, Toggle};
pub use types::*;
