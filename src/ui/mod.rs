pub mod executors;
pub mod repl;
