//! Collaborator implementations bundled with the crate.

pub mod memory;
