//! # trellis
//!
//! Library half of the Trellis binary: the clap command tree and the
//! command implementations, exposed so they can be tested directly.

pub mod cli;
