//! External collaborator boundaries and side-effecting helpers.

pub mod backend;
pub mod config;
pub mod harness;
pub mod judge;
pub mod problem;
pub mod process;
pub mod prompt;
pub mod rate_limit;
pub mod report;
pub mod sandbox;
