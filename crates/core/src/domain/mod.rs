pub mod analysis;
pub mod message;
