//! Common types shared by the mediafetch crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
