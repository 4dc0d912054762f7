// Core modules shared by the interpreter, loader, and worker client.
pub mod error;
