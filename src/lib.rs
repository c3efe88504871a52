pub mod atlas;
pub mod cache;
pub mod cli;
pub mod config;
pub mod database;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod favorites;
pub mod font;
pub mod manifest;
pub mod preview;
pub mod quality;
pub mod resource;
pub mod watch;

pub use database::{CollectionScope, DatabaseOptions, ResourceDatabase};
pub use error::{ErrorKind, ResourceError, Result};
pub use resource::{Collection, Resource, ResourceFilter, Source, SourceId};
