pub mod bundle;
pub mod data;
pub mod server;
