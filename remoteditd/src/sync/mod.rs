pub mod editor;
pub mod engine;
pub mod finder;
pub mod local_watcher;
pub mod paths;
pub mod prompt;
pub mod queue;
pub mod server;
pub mod tree;
