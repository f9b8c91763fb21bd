pub mod application;
pub mod monitor;
pub mod profile;
pub mod program;
pub mod search;
