//! Data Transfer Objects
//!
//! Raw, unvalidated shapes of the payloads exchanged with the grading queue.
//! Nothing here is trusted until the preprocessor has turned it into domain
//! types.

pub mod job;
