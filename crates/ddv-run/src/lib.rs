mod cli;

pub use cli::{Cli, Config};
