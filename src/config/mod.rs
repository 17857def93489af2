//! Configuration handling

pub mod settings;

pub use settings::Settings;
