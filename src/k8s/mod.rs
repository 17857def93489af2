//! Kind node and image inventory operations

pub mod actions;
pub mod images;
pub mod kind;
