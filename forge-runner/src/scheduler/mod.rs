//! Scheduler layer for the runner
//!
//! Handles polling the coordinator for jobs and coordinating job
//! execution, from acquisition through trace finalization.

pub mod poller;

pub use poller::JobPoller;
