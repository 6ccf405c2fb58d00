//! Cross-node scenario tests for the rmi protocol stack.
//!
//! The fixtures here wire two real nodes over an in-memory channel; the
//! scenarios in `tests/` exercise the full request, recursion, and release
//! machinery end to end.

pub mod fixtures;
