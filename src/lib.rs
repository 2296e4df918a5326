pub mod cli;
pub mod defaults;
pub mod exec;
pub mod pln;
pub mod server;
pub mod session;
pub mod utils;

pub use cli::Cli;
pub use pln::{Label, Options};
pub use session::Session;
