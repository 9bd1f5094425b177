pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod filename;
pub mod kv;
pub mod lookup;
pub mod metadata;
pub mod organize;
pub mod pipeline;
pub mod prelude;
pub mod resolution;
pub mod resolver;
pub mod scanner;
pub mod year;

pub use config::*;
pub use error::*;
pub use events::*;
pub use resolution::*;
