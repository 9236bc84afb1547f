//! End-to-end tests driving the controller against the in-memory cluster.

mod discovery;
mod support;
