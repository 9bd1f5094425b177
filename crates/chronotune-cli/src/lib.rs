pub mod args;
pub mod report;

pub use args::{Cli, Command, OrganizeArgs};
pub use report::render;
