//! Integration tests for the Safe relay.
//!
//! Every flow runs the real services against an in-process chain that
//! executes the factory and Safe calls the relay depends on.

mod integration {
    pub mod common;
    mod tests;
}
