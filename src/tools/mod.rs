//! Tool implementations the model can invoke.

pub mod anime;

pub use anime::anime_toolkit;
