//! Scheduler layer for the runner
//!
//! This layer handles polling the grading queue and driving each job from
//! sandbox provisioning to result publication.

pub mod driver;
pub mod poller;

pub use driver::JobDriver;
pub use poller::JobPoller;
