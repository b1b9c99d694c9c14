// SPDX-License-Identifier: MPL-2.0

//! GStreamer encoder detection
//!
//! Finds which hardware encoder elements are installed and which raw input
//! layouts each one accepts on its sink pad.

use super::video::{HARDWARE_ENCODERS, HardwareEncoderSpec};
use crate::media::codec::CodecInfo;
use crate::media::formats::YuvLayout;
use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, info};

/// Check if a specific GStreamer element is available
pub fn is_element_available(element_name: &str) -> bool {
    gst::init().ok();
    gst::ElementFactory::make(element_name).build().is_ok()
}

/// Raw layouts an encoder factory advertises on its sink pad template
///
/// Layouts appear in the order the template lists them; formats without a
/// [`YuvLayout`] counterpart are skipped.
pub fn sink_layouts(factory: &gst::ElementFactory) -> Vec<YuvLayout> {
    let mut layouts = Vec::new();

    for template in factory.static_pad_templates() {
        if template.direction() != gst::PadDirection::Sink {
            continue;
        }
        let caps = template.caps();
        for structure in caps.iter() {
            for format in structure_formats(structure) {
                if let Some(layout) = YuvLayout::from_caps_format(&format)
                    && !layouts.contains(&layout)
                {
                    layouts.push(layout);
                }
            }
        }
    }

    layouts
}

/// The `format` field of a raw video structure, as a single value or a list
fn structure_formats(structure: &gst::StructureRef) -> Vec<String> {
    if let Ok(format) = structure.get::<&str>("format") {
        return vec![format.to_string()];
    }
    if let Ok(list) = structure.get::<gst::List>("format") {
        return list
            .iter()
            .filter_map(|v| v.get::<&str>().ok())
            .map(str::to_string)
            .collect();
    }
    Vec::new()
}

/// Describe an installed encoder, or `None` if it cannot be instantiated
pub fn probe_encoder(spec: &HardwareEncoderSpec) -> Option<CodecInfo> {
    if !is_element_available(spec.element_name) {
        return None;
    }
    let factory = gst::ElementFactory::find(spec.element_name)?;
    let color_formats = sink_layouts(&factory);
    debug!(
        encoder = spec.element_name,
        layouts = ?color_formats,
        "Hardware encoder available"
    );

    Some(CodecInfo {
        name: spec.element_name.to_string(),
        mime: spec.codec.mime_type().to_string(),
        color_formats,
        is_hardware: true,
    })
}

/// Detect all installed hardware video encoders, in priority order
pub fn detect_hardware_encoders() -> Vec<CodecInfo> {
    let available: Vec<CodecInfo> = HARDWARE_ENCODERS.iter().filter_map(probe_encoder).collect();
    info!("Detected {} hardware video encoders", available.len());
    available
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_runs() {
        // Detection must not panic on machines without any hardware encoder
        for codec in detect_hardware_encoders() {
            assert!(codec.is_hardware);
        }
    }

    #[test]
    fn test_structure_formats_reads_lists() {
        gst::init().unwrap();
        let caps: gst::Caps = "video/x-raw, format=(string){ NV12, I420, P010_10LE }"
            .parse()
            .unwrap();
        let formats = structure_formats(caps.structure(0).unwrap());
        assert_eq!(formats, vec!["NV12", "I420", "P010_10LE"]);

        let caps: gst::Caps = "video/x-raw, format=(string)NV12".parse().unwrap();
        assert_eq!(structure_formats(caps.structure(0).unwrap()), vec!["NV12"]);
    }
}
