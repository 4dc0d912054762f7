//! Purpose: Library crate behind the `evcmd` line interpreter and its tests.
//! Exports: `core` (errors), `protocol`, `registry`, `plugin`, `script`, `session`, `interp`, `worker`.
//! Role: Keeps the binary thin; embedders can register native plugins and run the loop themselves.
//! Invariants: Nothing here writes to stdout except through the writer handed to `interp::run`.
//! Invariants: Modules prefer explicit inputs/outputs over hidden state.
pub mod core;
pub mod interp;
pub mod json;
pub mod plugin;
pub mod protocol;
pub mod registry;
pub mod script;
pub mod session;
pub mod worker;
