//! Integration tests - whole operations through the public `Translator` API
//!
//! These tests load the fixture model from YAML and check the compiled text,
//! the bound parameters and the reshaped results without a database.

mod common;
mod authorization_tests;
mod loading_tests;
mod mutation_tests;
mod read_tests;
