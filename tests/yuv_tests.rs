// SPDX-License-Identifier: GPL-3.0-only

//! Exhaustive small-size checks for the RGB to YUV 4:2:0 conversion

use frame_transcoder::media::formats::yuv::{chroma_u, chroma_v, luma};
use frame_transcoder::media::formats::{YuvLayout, convert_rgb_to_yuv, yuv420_frame_size};

/// Every even size from 2x2 up to 24x24
fn even_sizes() -> impl Iterator<Item = (u32, u32)> {
    (1..=12u32).flat_map(|hw| (1..=12u32).map(move |hh| (hw * 2, hh * 2)))
}

/// Deterministic RGBA noise covering the full byte range
fn pattern(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..width * height * 4)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

fn rgb_at(pixels: &[u8], index: usize) -> (i32, i32, i32) {
    let p = &pixels[index * 4..index * 4 + 3];
    (p[0] as i32, p[1] as i32, p[2] as i32)
}

#[test]
fn test_output_is_always_three_halves_of_pixel_count() {
    for (w, h) in even_sizes() {
        let pixels = pattern(w, h, w * 31 + h);
        for layout in YuvLayout::PREFERENCE {
            let yuv = convert_rgb_to_yuv(&pixels, 4, w, h, layout).unwrap();
            assert_eq!(yuv.len(), yuv420_frame_size(w, h), "{:?} {}x{}", layout, w, h);
            assert_eq!(yuv.len(), (w * h * 3 / 2) as usize);
        }
    }
}

#[test]
fn test_semi_planar_matches_formula() {
    for (w, h) in even_sizes() {
        let pixels = pattern(w, h, 7);
        let yuv = convert_rgb_to_yuv(&pixels, 4, w, h, YuvLayout::SemiPlanar).unwrap();
        let frame_size = (w * h) as usize;

        for index in 0..frame_size {
            let (r, g, b) = rgb_at(&pixels, index);
            assert_eq!(yuv[index], luma(r, g, b));
        }

        let mut uv = frame_size;
        for row in (0..h as usize).step_by(2) {
            for col in (0..w as usize).step_by(2) {
                let (r, g, b) = rgb_at(&pixels, row * w as usize + col);
                assert_eq!(yuv[uv], chroma_v(r, g, b));
                assert_eq!(yuv[uv + 1], chroma_u(r, g, b));
                uv += 2;
            }
        }
    }
}

#[test]
fn test_planar_matches_formula() {
    for (w, h) in even_sizes() {
        let pixels = pattern(w, h, 11);
        let yuv = convert_rgb_to_yuv(&pixels, 4, w, h, YuvLayout::Planar).unwrap();
        let frame_size = (w * h) as usize;
        let quarter = frame_size / 4;

        for index in 0..frame_size {
            let (r, g, b) = rgb_at(&pixels, index);
            assert_eq!(yuv[index], luma(r, g, b));
        }

        let mut k = 0;
        for row in (0..h as usize).step_by(2) {
            for col in (0..w as usize).step_by(2) {
                let (r, g, b) = rgb_at(&pixels, row * w as usize + col);
                assert_eq!(yuv[frame_size + k], chroma_v(r, g, b));
                assert_eq!(yuv[frame_size + quarter + k], chroma_u(r, g, b));
                k += 1;
            }
        }
    }
}

#[test]
fn test_formula_clamps_extremes() {
    assert_eq!(luma(0, 0, 0), 16);
    assert_eq!(luma(255, 255, 255), 235);
    for (r, g, b) in [(255, 0, 0), (0, 255, 0), (0, 0, 255), (255, 255, 0)] {
        let (v, u) = (chroma_v(r, g, b), chroma_u(r, g, b));
        assert!((16..=240).contains(&v), "V {} for {:?}", v, (r, g, b));
        assert!((16..=240).contains(&u), "U {} for {:?}", u, (r, g, b));
    }
}

#[test]
fn test_rgb_and_rgba_inputs_agree() {
    for (w, h) in [(2, 2), (6, 4), (16, 10)] {
        let rgba = pattern(w, h, 3);
        let rgb: Vec<u8> = rgba
            .chunks_exact(4)
            .flat_map(|p| [p[0], p[1], p[2]])
            .collect();
        for layout in YuvLayout::PREFERENCE {
            assert_eq!(
                convert_rgb_to_yuv(&rgb, 3, w, h, layout).unwrap(),
                convert_rgb_to_yuv(&rgba, 4, w, h, layout).unwrap()
            );
        }
    }
}

#[test]
fn test_odd_dimensions_are_rejected() {
    for (w, h) in [(1, 2), (2, 1), (3, 4), (4, 5), (7, 7)] {
        let pixels = vec![0u8; (w * h * 4) as usize];
        for layout in YuvLayout::PREFERENCE {
            assert!(convert_rgb_to_yuv(&pixels, 4, w, h, layout).is_err());
        }
    }
}

#[test]
fn test_selection_prefers_semi_planar_over_advertised_order() {
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
