//! Phase statistics across repeated captures

pub mod store;
