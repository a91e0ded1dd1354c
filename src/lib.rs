//! Gateway that routes chat, image-generation, transcription and
//! web-search requests to external AI providers behind one normalized
//! HTTP surface.

pub mod cache;
pub mod config;
pub mod error;
pub mod limiter;
pub mod providers;
pub mod registry;
pub mod router;
pub mod selector;
pub mod server;
pub mod stats;
pub mod testing;

pub use config::Config;
pub use error::{Error, Result};
pub use registry::ModelRegistry;
pub use router::{RequestRouter, ResponseEnvelope};
pub use server::{build_app, AppState, Gateway};
