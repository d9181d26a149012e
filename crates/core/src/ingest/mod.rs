pub mod market;
pub mod provider;
pub mod types;
pub mod youtube;
