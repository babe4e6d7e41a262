pub mod env;
pub mod fs;
pub mod path;
pub mod shell;
