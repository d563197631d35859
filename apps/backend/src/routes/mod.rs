//! HTTP route handlers

pub mod backlog;
pub mod mode;
pub mod study;
