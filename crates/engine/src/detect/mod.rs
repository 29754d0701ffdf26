// ABOUTME: The three detection phases plus their shared helpers and per-node introspection.
// ABOUTME: container -> fields -> validate; label, transform and debug support them.

pub mod container;
pub mod debug;
pub mod fields;
pub mod label;
pub mod transform;
pub mod validate;
