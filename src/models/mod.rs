pub mod application;
pub mod monitor;
pub mod profile;
pub mod program;
pub mod search;

pub use application::*;
pub use monitor::*;
pub use profile::*;
pub use program::*;
pub use search::*;
