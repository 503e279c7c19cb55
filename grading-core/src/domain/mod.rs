//! Core domain types
//!
//! These types describe one grading job after it has been validated. They are
//! shared between the script engine (which builds and walks the command graph)
//! and the publication layer (which serializes the output).

pub mod code_file;
pub mod output;
pub mod response;
pub mod script;
