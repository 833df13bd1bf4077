pub mod common;
pub mod element;
pub mod project;
pub mod user;

pub use common::*;
pub use element::*;
pub use project::*;
pub use user::*;
