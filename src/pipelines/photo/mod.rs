// SPDX-License-Identifier: MPL-2.0

//! Still frame output
//!
//! ```text
//! decoder -> render surface -> readback -> JPEG file
//! ```
//!
//! - [`extraction`]: drives the render surface over a list of timestamps
//! - [`encoding`]: JPEG compression of readback buffers

pub mod encoding;
pub mod extraction;

pub use encoding::StillImageWriter;
pub use extraction::{ExtractionReport, FrameExtractor, evenly_spaced_timestamps};
