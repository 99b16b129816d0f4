//! Command-line front end for the oc-mirror performance harness.

pub mod cli;
pub mod commands;
