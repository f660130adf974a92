//! API handlers module

pub mod digest;
pub mod health;
pub mod products;
pub mod subscription;
