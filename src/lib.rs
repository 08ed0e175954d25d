pub mod clock;
pub mod config;
pub mod db;
pub mod evening;
pub mod invariants;
pub mod lineup;
pub mod names;
pub mod ordering;
pub mod projector;
pub mod registry;

/// Application name for XDG paths
pub const APP_NAME: &str = "openmic";
