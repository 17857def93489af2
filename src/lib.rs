//! kind-images: inspect the images in the local docker store and in a kind
//! cluster node, load images into the node and delete them from it.
//!
//! The core is [`k8s::images`] (inventory reads) and [`k8s::actions`]
//! (load/delete and the single-flight loading guard). [`view`] turns both into
//! tables; [`commands`] and the binary are the host around them.

pub mod commands;
pub mod config;
pub mod k8s;
pub mod utils;
pub mod view;
