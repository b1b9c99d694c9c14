// SPDX-License-Identifier: GPL-3.0-only

//! RGB to YUV 4:2:0 conversion for hardware encoder input
//!
//! Hardware encoders advertise the raw layouts they accept. One layout is
//! picked per encode session with [`YuvLayout::select`] and every frame is run
//! through [`convert_rgb_to_yuv`]. The output is always
//! `width * height * 3 / 2` bytes.
//!
//! Coefficients are the integer BT.601 studio-swing approximation:
//!
//! ```text
//! Y = ((  66R + 129G +  25B + 128) >> 8) +  16
//! V = (( -38R -  74G + 112B + 128) >> 8) + 128
//! U = (( 112R -  94G -  18B + 128) >> 8) + 128
//! ```
//!
//! The `V`/`U` labels follow the byte order encoders expect, not textbook
//! Cb/Cr naming. Chroma is sampled from the top-left pixel of each 2x2 block.

use crate::errors::{TranscodeError, TranscodeResult};
use tracing::debug;

/// Raw 4:2:0 byte layouts accepted by hardware encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum YuvLayout {
    /// Y plane followed by interleaved `V, U` pairs (NV12-style)
    SemiPlanar,
    /// Y plane, then a `V` plane, then a `U` plane
    Planar,
    /// Packed semi-planar variant
    ///
    /// Unverified against real encoders; kept byte-compatible with existing
    /// producers of this layout.
    PackedSemiPlanar,
    /// Packed planar variant
    ///
    /// Unverified against real encoders; kept byte-compatible with existing
    /// producers of this layout.
    PackedPlanar,
}

impl YuvLayout {
    /// Preference order used when an encoder advertises several layouts
    pub const PREFERENCE: [YuvLayout; 4] = [
        YuvLayout::SemiPlanar,
        YuvLayout::Planar,
        YuvLayout::PackedSemiPlanar,
        YuvLayout::PackedPlanar,
    ];

    /// Pick the most preferred layout among `advertised`
    ///
    /// Falls back to [`YuvLayout::SemiPlanar`] when nothing usable is advertised.
    pub fn select(advertised: &[YuvLayout]) -> YuvLayout {
        Self::PREFERENCE
            .into_iter()
            .find(|layout| advertised.contains(layout))
            .unwrap_or(YuvLayout::SemiPlanar)
    }

    /// Platform color-format code encoders use to advertise this layout
    pub fn color_format_code(&self) -> u32 {
        match self {
            YuvLayout::Planar => 0x13,
            YuvLayout::PackedPlanar => 0x14,
            YuvLayout::SemiPlanar => 0x15,
            YuvLayout::PackedSemiPlanar => 0x27,
        }
    }

    /// Inverse of [`color_format_code`](Self::color_format_code)
    pub fn from_color_format_code(code: u32) -> Option<YuvLayout> {
        Self::PREFERENCE
            .into_iter()
            .find(|layout| layout.color_format_code() == code)
    }

    /// Raw video caps format carrying this layout, if one exists
    pub fn caps_format(&self) -> Option<&'static str> {
        match self {
            YuvLayout::SemiPlanar => Some("NV12"),
            YuvLayout::Planar => Some("I420"),
            YuvLayout::PackedSemiPlanar | YuvLayout::PackedPlanar => None,
        }
    }

    /// Inverse of [`caps_format`](Self::caps_format)
    pub fn from_caps_format(format: &str) -> Option<YuvLayout> {
        match format {
            "NV12" => Some(YuvLayout::SemiPlanar),
            "I420" => Some(YuvLayout::Planar),
            _ => None,
        }
    }
}

/// Output size in bytes for a `width x height` frame
pub fn yuv420_frame_size(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3 / 2
}

/// Luma for one pixel, clamped to a byte
#[inline]
pub fn luma(r: i32, g: i32, b: i32) -> u8 {
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8
}

/// The chroma value written first in the interleaved layouts
#[inline]
pub fn chroma_v(r: i32, g: i32, b: i32) -> u8 {
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

/// The chroma value written second in the interleaved layouts
#[inline]
pub fn chroma_u(r: i32, g: i32, b: i32) -> u8 {
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

/// Convert packed RGB or RGBA pixels into `layout`
///
/// # Arguments
/// * `pixels` - Row-major pixels, origin top-left, no row padding
/// * `bytes_per_pixel` - 3 for RGB, 4 for RGBA (alpha is ignored)
/// * `width`, `height` - Frame size; both must be even and non-zero
/// * `layout` - Target byte layout
///
/// # Returns
/// * `Ok(Vec<u8>)` - `width * height * 3 / 2` bytes
/// * `Err(TranscodeError::InvalidFrame)` - Bad dimensions or short input
pub fn convert_rgb_to_yuv(
    pixels: &[u8],
    bytes_per_pixel: usize,
    width: u32,
    height: u32,
    layout: YuvLayout,
) -> TranscodeResult<Vec<u8>> {
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(TranscodeError::InvalidFrame(format!(
            "4:2:0 conversion needs even, non-zero dimensions, got {}x{}",
            width, height
        )));
    }
    if bytes_per_pixel != 3 && bytes_per_pixel != 4 {
        return Err(TranscodeError::InvalidFrame(format!(
            "Unsupported pixel stride: {} bytes",
            bytes_per_pixel
        )));
    }
    let pixel_count = width as usize * height as usize;
    if pixels.len() < pixel_count * bytes_per_pixel {
        return Err(TranscodeError::InvalidFrame(format!(
            "Expected {} bytes of pixel data, got {}",
            pixel_count * bytes_per_pixel,
            pixels.len()
        )));
    }

    let frame_size = pixel_count;
    let mut yuv = vec![0u8; yuv420_frame_size(width, height)];
    let len = yuv.len();

    match layout {
        YuvLayout::SemiPlanar => {
            let mut y_index = 0;
            let mut uv_index = frame_size;
            for_each_pixel(pixels, bytes_per_pixel, width, |px| {
                yuv[y_index] = px.y;
                y_index += 1;
                if px.has_chroma() {
                    yuv[uv_index] = px.v;
                    yuv[uv_index + 1] = px.u;
                    uv_index += 2;
                }
            });
        }
        YuvLayout::Planar => {
            let mut y_index = 0;
            let mut v_plane = frame_size;
            let mut u_plane = frame_size + frame_size / 4;
            for_each_pixel(pixels, bytes_per_pixel, width, |px| {
                yuv[y_index] = px.y;
                y_index += 1;
                if px.has_chroma() {
                    yuv[u_plane] = px.u;
                    yuv[v_plane] = px.v;
                    u_plane += 1;
                    v_plane += 1;
                }
            });
        }
        YuvLayout::PackedSemiPlanar => {
            let mut cursor = 0;
            for_each_pixel(pixels, bytes_per_pixel, width, |px| {
                yuv[cursor] = px.y;
                cursor += 1;
                if px.has_chroma() {
                    yuv[cursor + 1] = px.v;
                    yuv[cursor + 3] = px.u;
                }
                if px.index % 2 == 0 {
                    cursor += 1;
                }
            });
        }
        YuvLayout::PackedPlanar => {
            let mut cursor = 0;
            let mut chroma = len / 2;
            for_each_pixel(pixels, bytes_per_pixel, width, |px| {
                match (px.row % 2 == 0, px.index % 2 == 0) {
                    (true, true) => {
                        yuv[cursor] = px.y;
                        cursor += 1;
                        yuv[cursor + 1] = px.v;
                        yuv[chroma + 1] = px.u;
                        cursor += 1;
                    }
                    (true, false) => {
                        yuv[cursor] = px.y;
                        cursor += 1;
                    }
                    (false, true) => {
                        yuv[chroma] = px.y;
                        chroma += 2;
                    }
                    (false, false) => {
                        yuv[chroma] = px.y;
                        chroma += 1;
                    }
                }
            });
        }
    }

    debug!(width, height, ?layout, size = len, "Converted frame to YUV");
    Ok(yuv)
}

/// One converted source pixel
struct YuvPixel {
    /// Row within the frame
    row: usize,
    /// Pixel index within the whole frame
    index: usize,
    y: u8,
    u: u8,
    v: u8,
}

impl YuvPixel {
    /// Chroma is taken from pixels on even rows at even frame indices
    #[inline]
    fn has_chroma(&self) -> bool {
        self.row % 2 == 0 && self.index % 2 == 0
    }
}

fn for_each_pixel(
    pixels: &[u8],
    bytes_per_pixel: usize,
    width: u32,
    mut visit: impl FnMut(YuvPixel),
) {
    let width = width as usize;
    let row_bytes = width * bytes_per_pixel;
    let mut index = 0;
    // Callers guarantee an exact multiple of whole rows is available
    for (row, line) in pixels.chunks_exact(row_bytes).enumerate() {
        for px in line.chunks_exact(bytes_per_pixel) {
            let (r, g, b) = (px[0] as i32, px[1] as i32, px[2] as i32);
            visit(YuvPixel {
                row,
                index,
                y: luma(r, g, b),
                u: chroma_u(r, g, b),
                v: chroma_v(r, g, b),
            });
            index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        (0..width * height)
            .flat_map(|_| [rgb[0], rgb[1], rgb[2], 255])
            .collect()
    }

    #[test]
    fn test_reference_colors() {
        assert_eq!(luma(0, 0, 0), 16);
        assert_eq!(luma(255, 255, 255), 235);
        assert_eq!(chroma_u(128, 128, 128), 128);
        assert_eq!(chroma_v(128, 128, 128), 128);
        // Pure red pushes the first-written chroma low and the second high
        assert_eq!(chroma_v(255, 0, 0), 90);
        assert_eq!(chroma_u(255, 0, 0), 240);
    }

    #[test]
    fn test_semi_planar_solid_red() {
        let yuv = convert_rgb_to_yuv(&solid(4, 2, [255, 0, 0]), 4, 4, 2, YuvLayout::SemiPlanar)
            .unwrap();
        assert_eq!(yuv.len(), 12);
        assert!(yuv[..8].iter().all(|&y| y == 82));
        assert_eq!(&yuv[8..], &[90, 240, 90, 240]);
    }

    #[test]
    fn test_planar_plane_offsets() {
        let yuv =
            convert_rgb_to_yuv(&solid(4, 4, [255, 0, 0]), 4, 4, 4, YuvLayout::Planar).unwrap();
        assert_eq!(yuv.len(), 24);
        // V plane at width*height, U plane a quarter frame later
        assert!(yuv[16..20].iter().all(|&v| v == 90));
        assert!(yuv[20..24].iter().all(|&u| u == 240));
    }

    #[test]
    fn test_packed_semi_planar_offsets() {
        let yuv = convert_rgb_to_yuv(
            &solid(2, 2, [255, 0, 0]),
            4,
            2,
            2,
            YuvLayout::PackedSemiPlanar,
        )
        .unwrap();
        // Pixel 0: Y at 0, V at 2, U at 4; pixel 1 then overwrites index 2 with Y
        assert_eq!(yuv, vec![82, 0, 82, 82, 240, 82]);
    }

    #[test]
    fn test_packed_planar_offsets() {
        let yuv =
            convert_rgb_to_yuv(&solid(2, 2, [255, 0, 0]), 4, 2, 2, YuvLayout::PackedPlanar)
                .unwrap();
        // Even row fills from 0, odd row from len/2 skipping the U byte at len/2 + 1
        assert_eq!(yuv, vec![82, 0, 82, 82, 240, 82]);
    }

    #[test]
    fn test_rgb_and_rgba_agree() {
        let rgba: Vec<u8> = (0..16u8).flat_map(|i| [i * 10, 255 - i, i, 0]).collect();
        let rgb: Vec<u8> = rgba
            .chunks_exact(4)
            .flat_map(|p| [p[0], p[1], p[2]])
            .collect();
        for layout in YuvLayout::PREFERENCE {
            assert_eq!(
                convert_rgb_to_yuv(&rgba, 4, 4, 4, layout).unwrap(),
                convert_rgb_to_yuv(&rgb, 3, 4, 4, layout).unwrap()
            );
        }
    }

    #[test]
    fn test_rejects_odd_dimensions_and_short_input() {
        assert!(matches!(
            convert_rgb_to_yuv(&[0; 36], 4, 3, 3, YuvLayout::SemiPlanar),
            Err(TranscodeError::InvalidFrame(_))
        ));
        assert!(matches!(
            convert_rgb_to_yuv(&[0; 8], 4, 2, 2, YuvLayout::SemiPlanar),
            Err(TranscodeError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_layout_selection_prefers_semi_planar() {
        assert_eq!(
            YuvLayout::select(&[YuvLayout::PackedPlanar, YuvLayout::Planar]),
            YuvLayout::Planar
        );
        assert_eq!(
            YuvLayout::select(&[YuvLayout::Planar, YuvLayout::SemiPlanar]),
            YuvLayout::SemiPlanar
        );
        assert_eq!(YuvLayout::select(&[]), YuvLayout::SemiPlanar);
    }

    #[test]
    fn test_color_format_codes_round_trip() {
        for layout in YuvLayout::PREFERENCE {
            assert_eq!(
                YuvLayout::from_color_format_code(layout.color_format_code()),
                Some(layout)
            );
        }
        assert_eq!(YuvLayout::from_color_format_code(0x7f000789), None);
    }
}
