//! Request handlers.

pub mod files;
pub mod health;
pub mod jobs;
pub mod stages;

pub use files::*;
pub use health::*;
pub use jobs::*;
pub use stages::*;
