// SPDX-License-Identifier: MPL-2.0

//! Processing pipelines for both directions of the transcoder
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │  Video file  │ ──▶ │  Photo Pipeline   │ ──▶ │  JPEG frames │
//! │              │     │  - GPU draw       │     │              │
//! │              │     │  - Readback       │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//!
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Image frames │ ──▶ │  Video Pipeline   │ ──▶ │   MP4 File   │
//! │              │     │  - RGB→YUV        │     │              │
//! │              │     │  - HW Encoding    │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`photo`]: frame extraction and JPEG writing
//! - [`video`]: hardware encode session, muxing and the encode driver

pub mod photo;
pub mod video;
