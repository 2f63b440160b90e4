//! Recorded observation trace schema
//!
//! This module defines the on-disk format for recorded perception output, used
//! to replay a session through the pipeline offline.

mod frame;
mod reader;

pub use frame::*;
pub use reader::*;
