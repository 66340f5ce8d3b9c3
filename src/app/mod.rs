pub mod attachment;
pub mod repl;
pub mod services;
