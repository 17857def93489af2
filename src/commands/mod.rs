//! Command implementations for kind-images CLI

pub mod images;
pub mod interactive;
