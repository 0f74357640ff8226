pub mod attribution;
pub mod auth;
pub mod clear;
pub mod identity;
pub mod log;
pub mod visit;
