//! Grading Core
//!
//! Core types for the grading runner.
//!
//! This crate contains:
//! - Domain types: code files, the resolved command graph, step responses and
//!   the aggregated job output
//! - DTOs: the raw job description as it arrives from the grading queue

pub mod domain;
pub mod dto;
