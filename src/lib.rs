#![forbid(unsafe_code)]

pub mod cache;
pub mod compose;
pub mod config;
pub mod error;
pub mod geo;
pub mod identity;
pub mod media;
pub mod overlay;
pub mod server;
pub mod text;
pub mod video;

pub use cache::{VideoCache, cache_file_name};
pub use config::{Assets, Config, OverlayStyle, Rgba8};
pub use error::{WitsError, WitsResult};
pub use geo::Location;
pub use identity::IdentitySource;
pub use server::{AppState, MediaPipeline, Served, WitsPipeline};
