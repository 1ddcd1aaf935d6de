//! Data models

pub mod session;

pub use session::{Role, Session, Turn};
