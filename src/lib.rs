pub mod config;
pub mod frame;
pub mod geodesy;
pub mod persist;
pub mod session;
pub mod source;
pub mod store;
pub mod trajectory;
