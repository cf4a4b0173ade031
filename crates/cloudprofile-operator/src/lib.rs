pub mod admission;
pub mod config;
pub mod crds;
pub mod error;
pub mod lookup;
pub mod merge;
pub mod profile_controller;
pub mod store;
pub mod strategy;
pub mod validation;
