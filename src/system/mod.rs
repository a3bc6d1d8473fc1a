pub mod hardware;
pub mod probe;
pub mod tools;
