//! Configuration management
//!
//! Node addresses, mining and stake identities, data directory and the few
//! consensus knobs a node can be started with.

pub mod settings;

pub use settings::Config;
