mod clone;

pub use clone::{validate_clone_url, ClonedRepo, Cloner};
