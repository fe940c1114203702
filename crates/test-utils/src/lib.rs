//! Shared test utilities for the VDR resolver crates.
//!
//! - [`TestDir`]: throwaway agent data directory
//! - [`fixtures`]: pool configurations and NYM records

#![deny(unsafe_code)]

pub mod fixtures;
mod test_dir;

pub use test_dir::TestDir;
