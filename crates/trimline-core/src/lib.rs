//! Trimline Core - Foundation types for the video trimmer
//!
//! This crate provides the fundamental types used throughout Trimline:
//! - Frame buffers and pixel formats
//! - Time representation (RationalTime, FrameRate)
//! - The error taxonomy shared by all crates

pub mod error;
pub mod frame;
pub mod time;

pub use error::{Result, TrimlineError};
pub use frame::{Frame, FrameBuffer, PixelFormat};
pub use time::{FrameRate, RationalTime};
