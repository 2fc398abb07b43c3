use embedded_graphics::{
    Pixel,
    pixelcolor::{Rgb888, RgbColor},
    prelude::{DrawTarget, OriginDimensions, Size},
};
use log::{trace, warn};

use crate::{Raster, Rgb};

/// Position and width in bits of one color channel inside a packed pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub offset: u8,
    pub length: u8,
}

impl Channel {
    pub const fn new(offset: u8, length: u8) -> Self {
        Self { offset, length }
    }

    /// Bits this channel occupies in a packed pixel.
    fn mask(self) -> u32 {
        ((1u32 << self.length) - 1) << self.offset
    }

    /// Drops the low bits of an 8-bit sample and moves the rest into place.
    fn pack(self, sample: u8) -> u32 {
        ((sample as u32) >> (8 - self.length)) << self.offset
    }
}

/// Bit layout of a packed pixel as reported by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub red: Channel,
    pub green: Channel,
    pub blue: Channel,
    pub bits_per_pixel: u8,
}

impl PixelLayout {
    pub const XRGB8888: PixelLayout = PixelLayout {
        red: Channel::new(16, 8),
        green: Channel::new(8, 8),
        blue: Channel::new(0, 8),
        bits_per_pixel: 32,
    };

    pub const RGB565: PixelLayout = PixelLayout {
        red: Channel::new(11, 5),
        green: Channel::new(5, 6),
        blue: Channel::new(0, 5),
        bits_per_pixel: 16,
    };

    pub fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel as usize / 8
    }

    pub fn validate(&self) -> Result<(), SurfaceError> {
        if !matches!(self.bits_per_pixel, 8 | 16 | 24 | 32) {
            return Err(SurfaceError::UnsupportedDepth(self.bits_per_pixel));
        }
        for channel in [self.red, self.green, self.blue] {
            if channel.length == 0
                || channel.length > 8
                || channel.offset as u32 + channel.length as u32 > self.bits_per_pixel as u32
            {
                return Err(SurfaceError::InvalidChannel(channel));
            }
        }
        for (a, b) in [(self.red, self.green), (self.red, self.blue), (self.green, self.blue)] {
            if a.mask() & b.mask() != 0 {
                return Err(SurfaceError::OverlappingChannels(a, b));
            }
        }
        Ok(())
    }

    pub fn pack(&self, color: Rgb) -> u32 {
        self.red.pack(color.red) | self.green.pack(color.green) | self.blue.pack(color.blue)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceError {
    UnsupportedDepth(u8),
    InvalidChannel(Channel),
    OverlappingChannels(Channel, Channel),
    StrideTooSmall { stride: usize, width: u32 },
    BufferSize { expected: usize, actual: usize },
}

impl core::fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SurfaceError::UnsupportedDepth(bpp) => {
                write!(f, "unsupported depth of {bpp} bits per pixel")
            }
            SurfaceError::InvalidChannel(channel) => write!(
                f,
                "unsupported channel layout (offset {}, length {})",
                channel.offset, channel.length
            ),
            SurfaceError::OverlappingChannels(a, b) => write!(
                f,
                "channels at bits {}..{} and {}..{} overlap",
                a.offset,
                a.offset + a.length,
                b.offset,
                b.offset + b.length
            ),
            SurfaceError::StrideTooSmall { stride, width } => {
                write!(f, "stride of {stride} bytes cannot hold {width} pixels")
            }
            SurfaceError::BufferSize { expected, actual } => {
                write!(f, "buffer holds {actual} bytes, surface needs {expected}")
            }
        }
    }
}

impl core::error::Error for SurfaceError {}

/// The rectangle a blit touched, in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Anything a decoded image can be drawn onto.
pub trait Canvas {
    fn size(&self) -> (u32, u32);
    fn blit(&mut self, raster: &Raster, x_align: f32, y_align: f32) -> Region;
}

/// Places `len` pixels inside `available` according to `align` (0 = start, 1 = end).
fn align_offset(available: u32, len: u32, align: f32) -> u32 {
    let align = if align.is_nan() { 0.5 } else { align.clamp(0.0, 1.0) };
    let free = available - len;
    ((free as f32 * align) as u32).min(free)
}

/// A packed-pixel drawing surface over any byte buffer.
///
/// The buffer is `stride * height` bytes. Rows may be padded; the padding is never written.
pub struct Surface<B> {
    buffer: B,
    width: u32,
    height: u32,
    stride: usize,
    layout: PixelLayout,
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Surface<B> {
    pub fn new(
        buffer: B,
        width: u32,
        height: u32,
        stride: usize,
        layout: PixelLayout,
    ) -> Result<Self, SurfaceError> {
        layout.validate()?;
        if stride < width as usize * layout.bytes_per_pixel() {
            return Err(SurfaceError::StrideTooSmall { stride, width });
        }
        let expected = stride * height as usize;
        let actual = buffer.as_ref().len();
        if actual != expected {
            return Err(SurfaceError::BufferSize { expected, actual });
        }
        Ok(Self {
            buffer,
            width,
            height,
            stride,
            layout,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn layout(&self) -> &PixelLayout {
        &self.layout
    }

    pub fn buffer(&self) -> &[u8] {
        self.buffer.as_ref()
    }

    pub fn into_inner(self) -> B {
        self.buffer
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.stride + x as usize * self.layout.bytes_per_pixel()
    }

    /// Packed value at `(x, y)`, if inside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.layout.bytes_per_pixel();
        let offset = self.offset(x, y);
        let mut bytes = [0u8; 4];
        bytes[..bpp].copy_from_slice(&self.buffer.as_ref()[offset..offset + bpp]);
        Some(u32::from_le_bytes(bytes))
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgb) {
        if x >= self.width || y >= self.height {
            return;
        }
        let bpp = self.layout.bytes_per_pixel();
        let offset = self.offset(x, y);
        let value = self.layout.pack(color).to_le_bytes();
        self.buffer.as_mut()[offset..offset + bpp].copy_from_slice(&value[..bpp]);
    }

    pub fn fill(&mut self, color: Rgb) {
        let bpp = self.layout.bytes_per_pixel();
        let value = self.layout.pack(color).to_le_bytes();
        let row_bytes = self.width as usize * bpp;
        let stride = self.stride;
        if stride == 0 {
            return;
        }
        for row in self.buffer.as_mut().chunks_exact_mut(stride) {
            for dst in row[..row_bytes].chunks_exact_mut(bpp) {
                dst.copy_from_slice(&value[..bpp]);
            }
        }
    }

    /// Where a `width` x `height` image lands, clipped to the surface.
    pub fn region(&self, width: u32, height: u32, x_align: f32, y_align: f32) -> Region {
        let width = width.min(self.width);
        let height = height.min(self.height);
        Region {
            x: align_offset(self.width, width, x_align),
            y: align_offset(self.height, height, y_align),
            width,
            height,
        }
    }

    /// Draws `raster` as one rectangle. An oversized raster is clipped to its
    /// top-left part; the rest of the source is never read.
    pub fn blit(&mut self, raster: &Raster, x_align: f32, y_align: f32) -> Region {
        let region = self.region(raster.width(), raster.height(), x_align, y_align);
        if region.width < raster.width() || region.height < raster.height() {
            warn!(
                "image {}x{} does not fit surface {}x{}, clipping to {}x{}",
                raster.width(),
                raster.height(),
                self.width,
                self.height,
                region.width,
                region.height
            );
        }
        trace!("blit {:?}", region);

        let bpp = self.layout.bytes_per_pixel();
        let layout = self.layout;
        for row in 0..region.height {
            let src = &raster.row(row)[..region.width as usize];
            let start = self.offset(region.x, region.y + row);
            let dst = &mut self.buffer.as_mut()[start..start + region.width as usize * bpp];
            for (pixel, out) in src.iter().zip(dst.chunks_exact_mut(bpp)) {
                let value = layout.pack(*pixel).to_le_bytes();
                out.copy_from_slice(&value[..bpp]);
            }
        }
        region
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Canvas for Surface<B> {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn blit(&mut self, raster: &Raster, x_align: f32, y_align: f32) -> Region {
        Surface::blit(self, raster, x_align, y_align)
    }
}

impl<B> OriginDimensions for Surface<B> {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> DrawTarget for Surface<B> {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            if coord.x < 0 || coord.y < 0 {
                continue;
            }
            self.set_pixel(
                coord.x as u32,
                coord.y as u32,
                Rgb::new(color.r(), color.g(), color.b()),
            );
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill(Rgb::new(color.r(), color.g(), color.b()));
        Ok(())
    }
}
