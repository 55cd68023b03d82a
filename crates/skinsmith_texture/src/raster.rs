// SPDX-License-Identifier: MIT OR Apache-2.0
//! Raster buffers flowing between nodes.
//!
//! Buffers are square, row major, with channels interleaved and values
//! normalized to `[0, 1]`. Allocation is fallible so that a 4K graph on a
//! small machine fails the pass instead of aborting the process.

use image::{ImageBuffer, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use skinsmith_graph::{Coercion, PortType};
use std::sync::Arc;
use thiserror::Error;

/// Output resolution of a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Resolution {
    /// 256 × 256
    R256,
    /// 512 × 512
    R512,
    /// 1024 × 1024
    R1024,
    /// 2048 × 2048
    R2048,
    /// 4096 × 4096
    R4096,
}

impl Resolution {
    /// All supported resolutions, smallest first
    pub const ALL: [Resolution; 5] = [
        Self::R256,
        Self::R512,
        Self::R1024,
        Self::R2048,
        Self::R4096,
    ];

    /// Edge length in pixels
    pub fn pixels(self) -> u32 {
        match self {
            Self::R256 => 256,
            Self::R512 => 512,
            Self::R1024 => 1024,
            Self::R2048 => 2048,
            Self::R4096 => 4096,
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::R1024
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.pixels())
    }
}

/// Resolution that is not one of the supported powers of two
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Unsupported resolution {0}; expected 256, 512, 1024, 2048 or 4096")]
pub struct InvalidResolution(pub u32);

impl TryFrom<u32> for Resolution {
    type Error = InvalidResolution;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|r| r.pixels() == value)
            .ok_or(InvalidResolution(value))
    }
}

impl From<Resolution> for u32 {
    fn from(resolution: Resolution) -> Self {
        resolution.pixels()
    }
}

/// Channel layout of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    /// One channel
    Gray,
    /// Two channels
    Uv,
    /// Three channels
    Xyz,
    /// Four channels
    Rgba,
}

impl ChannelLayout {
    /// Number of interleaved channels
    pub fn channels(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Uv => 2,
            Self::Xyz => 3,
            Self::Rgba => 4,
        }
    }

    /// Layout carried by a port of the given type
    pub fn for_port(port_type: PortType) -> Self {
        match port_type {
            PortType::Float => Self::Gray,
            PortType::Vector2 => Self::Uv,
            PortType::Vector3 => Self::Xyz,
            PortType::Color | PortType::Texture => Self::Rgba,
        }
    }
}

/// The allocator refused a buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to allocate {bytes} bytes for a {width}x{height} buffer")]
pub struct AllocationError {
    /// Requested size in bytes
    pub bytes: usize,
    /// Buffer width
    pub width: u32,
    /// Buffer height
    pub height: u32,
}

/// A 2D float buffer
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    seamless: bool,
    data: Vec<f32>,
}

impl RasterBuffer {
    /// Allocate a zeroed buffer
    pub fn try_new(width: u32, height: u32, layout: ChannelLayout) -> Result<Self, AllocationError> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(layout.channels()));
        let error = || AllocationError {
            bytes: len
                .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
                .unwrap_or(usize::MAX),
            width,
            height,
        };
        let len = len.ok_or_else(error)?;

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| error())?;
        data.resize(len, 0.0);

        Ok(Self {
            width,
            height,
            layout,
            seamless: false,
            data,
        })
    }

    /// Allocate a buffer with every pixel set to `value` (extra channels ignored)
    pub fn try_filled(
        width: u32,
        height: u32,
        layout: ChannelLayout,
        value: [f32; 4],
    ) -> Result<Self, AllocationError> {
        let mut buffer = Self::try_new(width, height, layout)?;
        let channels = layout.channels();
        for pixel in buffer.data.chunks_exact_mut(channels) {
            pixel.copy_from_slice(&value[..channels]);
        }
        Ok(buffer)
    }

    /// Allocate a buffer and fill each pixel from `f(x, y)`
    pub fn try_from_fn(
        width: u32,
        height: u32,
        layout: ChannelLayout,
        mut f: impl FnMut(u32, u32) -> [f32; 4],
    ) -> Result<Self, AllocationError> {
        let mut buffer = Self::try_new(width, height, layout)?;
        let channels = layout.channels();
        for (i, pixel) in buffer.data.chunks_exact_mut(channels).enumerate() {
            let x = (i % width as usize) as u32;
            let y = (i / width as usize) as u32;
            let value = f(x, y);
            pixel.copy_from_slice(&value[..channels]);
        }
        Ok(buffer)
    }

    /// Allocate a buffer with the same shape as `self`, filled from `f(x, y)`
    pub fn try_map(
        &self,
        layout: ChannelLayout,
        f: impl FnMut(u32, u32) -> [f32; 4],
    ) -> Result<Self, AllocationError> {
        Ok(Self::try_from_fn(self.width, self.height, layout, f)?.with_seamless(self.seamless))
    }

    /// Mark whether the content tiles seamlessly
    pub fn with_seamless(mut self, seamless: bool) -> Self {
        self.seamless = seamless;
        self
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Channel layout
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Whether neighborhood reads wrap around the edges
    pub fn is_seamless(&self) -> bool {
        self.seamless
    }

    /// Raw interleaved data
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable raw interleaved data
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Size of the pixel data in bytes
    pub fn byte_len(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.layout.channels()
    }

    /// Channels of one pixel
    pub fn pixel(&self, x: u32, y: u32) -> &[f32] {
        let start = self.offset(x, y);
        &self.data[start..start + self.layout.channels()]
    }

    /// Mutable channels of one pixel
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [f32] {
        let start = self.offset(x, y);
        let channels = self.layout.channels();
        &mut self.data[start..start + channels]
    }

    /// First channel of one pixel
    pub fn value(&self, x: u32, y: u32) -> f32 {
        self.data[self.offset(x, y)]
    }

    /// Pixel widened to four channels, unused channels zero
    pub fn channels4(&self, x: u32, y: u32) -> [f32; 4] {
        let mut out = [0.0; 4];
        let pixel = self.pixel(x, y);
        out[..pixel.len()].copy_from_slice(pixel);
        out
    }

    /// Pixel as display RGBA: gray is replicated, missing alpha is one
    pub fn rgba(&self, x: u32, y: u32) -> [f32; 4] {
        let p = self.pixel(x, y);
        match self.layout {
            ChannelLayout::Gray => [p[0], p[0], p[0], 1.0],
            ChannelLayout::Uv => [p[0], p[1], 0.0, 1.0],
            ChannelLayout::Xyz => [p[0], p[1], p[2], 1.0],
            ChannelLayout::Rgba => [p[0], p[1], p[2], p[3]],
        }
    }

    /// Resolve a possibly out-of-range coordinate: wrap when seamless,
    /// otherwise clamp to the nearest edge pixel
    pub fn resolve(&self, x: i64, y: i64) -> (u32, u32) {
        let (w, h) = (i64::from(self.width), i64::from(self.height));
        if self.seamless {
            (x.rem_euclid(w) as u32, y.rem_euclid(h) as u32)
        } else {
            (x.clamp(0, w - 1) as u32, y.clamp(0, h - 1) as u32)
        }
    }

    /// First channel at a possibly out-of-range coordinate
    pub fn fetch(&self, x: i64, y: i64) -> f32 {
        let (x, y) = self.resolve(x, y);
        self.value(x, y)
    }

    /// All channels at a possibly out-of-range coordinate
    pub fn fetch4(&self, x: i64, y: i64) -> [f32; 4] {
        let (x, y) = self.resolve(x, y);
        self.channels4(x, y)
    }

    /// Bilinear sample at normalized coordinates.
    ///
    /// `u = 0` is the left edge of pixel 0 and `u = 1` the right edge of the
    /// last pixel. With `wrap` the lookup repeats, otherwise it clamps.
    pub fn sample_bilinear(&self, u: f32, v: f32, wrap: bool) -> [f32; 4] {
        let fx = u * self.width as f32 - 0.5;
        let fy = v * self.height as f32 - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let fetch = |x: i64, y: i64| {
            let (w, h) = (i64::from(self.width), i64::from(self.height));
            let (x, y) = if wrap {
                (x.rem_euclid(w), y.rem_euclid(h))
            } else {
                (x.clamp(0, w - 1), y.clamp(0, h - 1))
            };
            self.channels4(x as u32, y as u32)
        };

        let a = fetch(x0, y0);
        let b = fetch(x0 + 1, y0);
        let c = fetch(x0, y0 + 1);
        let d = fetch(x0 + 1, y0 + 1);

        let mut out = [0.0; 4];
        for i in 0..4 {
            let top = a[i] + (b[i] - a[i]) * tx;
            let bottom = c[i] + (d[i] - c[i]) * tx;
            out[i] = top + (bottom - top) * ty;
        }
        out
    }

    /// Convert to the layout of `target`, following `coercion`
    pub fn coerce(
        buffer: &Arc<Self>,
        coercion: Coercion,
        target: PortType,
    ) -> Result<Arc<Self>, AllocationError> {
        let layout = ChannelLayout::for_port(target);
        match coercion {
            Coercion::Identity | Coercion::Alias if buffer.layout == layout => {
                Ok(Arc::clone(buffer))
            }
            Coercion::Broadcast if buffer.layout == ChannelLayout::Gray => {
                let out = buffer.try_map(layout, |x, y| {
                    let v = buffer.value(x, y);
                    [v, v, v, 1.0]
                })?;
                Ok(Arc::new(out))
            }
            _ => Ok(Arc::new(buffer.try_map(layout, |x, y| buffer.channels4(x, y))?)),
        }
    }

    /// Whether every pixel holds the same value
    pub fn is_uniform(&self) -> bool {
        let channels = self.layout.channels();
        match self.data.get(..channels) {
            Some(first) => self.data.chunks_exact(channels).all(|p| p == first),
            None => true,
        }
    }

    /// Encode as 8-bit RGBA
    pub fn to_rgba8(&self) -> RgbaImage {
        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let c = self.rgba(x, y);
            Rgba(c.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8))
        })
    }

    /// Encode as 16-bit RGBA
    pub fn to_rgba16(&self) -> ImageBuffer<Rgba<u16>, Vec<u16>> {
        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let c = self.rgba(x, y);
            Rgba(c.map(|v| (v.clamp(0.0, 1.0) * 65535.0).round() as u16))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_serializes_as_integer() {
        assert_eq!(Resolution::try_from(512), Ok(Resolution::R512));
        assert_eq!(Resolution::try_from(300), Err(InvalidResolution(300)));
        let text = ron::to_string(&Resolution::R2048).unwrap();
        assert_eq!(text, "2048");
        let parsed: Resolution = ron::from_str("256").unwrap();
        assert_eq!(parsed, Resolution::R256);
        assert!(ron::from_str::<Resolution>("100").is_err());
    }

    #[test]
    fn test_filled_and_layout() {
        let buffer = RasterBuffer::try_filled(4, 4, ChannelLayout::Xyz, [0.5, 0.5, 1.0, 9.0]).unwrap();
        assert_eq!(buffer.data().len(), 4 * 4 * 3);
        assert_eq!(buffer.pixel(3, 2), &[0.5, 0.5, 1.0]);
        assert!(buffer.is_uniform());
    }

    #[test]
    fn test_huge_allocation_fails_cleanly() {
        let result = RasterBuffer::try_new(u32::MAX, u32::MAX, ChannelLayout::Rgba);
        assert!(result.is_err());
    }

    #[test]
    fn test_clamp_vs_wrap_fetch() {
        let buffer =
            RasterBuffer::try_from_fn(4, 1, ChannelLayout::Gray, |x, _| [x as f32, 0.0, 0.0, 0.0])
                .unwrap();
        assert_eq!(buffer.fetch(-1, 0), 0.0);
        assert_eq!(buffer.fetch(5, 0), 3.0);

        let wrapped = buffer.with_seamless(true);
        assert_eq!(wrapped.fetch(-1, 0), 3.0);
        assert_eq!(wrapped.fetch(4, 0), 0.0);
    }

    #[test]
    fn test_bilinear_midpoint() {
        let buffer =
            RasterBuffer::try_from_fn(2, 1, ChannelLayout::Gray, |x, _| [x as f32, 0.0, 0.0, 0.0])
                .unwrap();
        let mid = buffer.sample_bilinear(0.5, 0.5, false);
        assert!((mid[0] - 0.5).abs() < 1e-6);
        let left = buffer.sample_bilinear(0.25, 0.5, false);
        assert!(left[0].abs() < 1e-6);
    }

    #[test]
    fn test_broadcast_sets_alpha() {
        let gray = Arc::new(RasterBuffer::try_filled(2, 2, ChannelLayout::Gray, [0.25; 4]).unwrap());
        let color = RasterBuffer::coerce(&gray, Coercion::Broadcast, PortType::Color).unwrap();
        assert_eq!(color.layout(), ChannelLayout::Rgba);
        assert_eq!(color.pixel(1, 1), &[0.25, 0.25, 0.25, 1.0]);

        let same = RasterBuffer::coerce(&color, Coercion::Alias, PortType::Texture).unwrap();
        assert!(Arc::ptr_eq(&same, &color));
    }

    #[test]
    fn test_export_encoding() {
        let buffer = RasterBuffer::try_filled(2, 2, ChannelLayout::Gray, [1.0; 4]).unwrap();
        let image = buffer.to_rgba8();
        assert_eq!(image.get_pixel(0, 0).0, [255, 255, 255, 255]);

        let normal = RasterBuffer::try_filled(2, 2, ChannelLayout::Xyz, [0.5, 0.5, 1.0, 0.0]).unwrap();
        let wide = normal.to_rgba16();
        assert_eq!(wide.get_pixel(1, 1).0, [32768, 32768, 65535, 65535]);
    }
}
