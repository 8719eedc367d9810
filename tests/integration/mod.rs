//! Integration tests for warden
//!
//! These drive real subprocesses through the supervised executor and whole
//! manifests through the run command, then inspect the written artifacts.

pub mod artifacts;
pub mod helpers;
pub mod pool;
pub mod supervised_process;
