use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::{debug, warn};
use splash_core::{
    Raster,
    surface::{Canvas, PixelLayout, Region, Surface},
};

/// A desktop window standing in for the framebuffer.
///
/// Drawing goes through an XRGB8888 [`Surface`], which is the layout minifb
/// expects, so every blit is shown exactly as a 32 bpp framebuffer would show it.
pub struct MinifbCanvas {
    surface: Surface<Vec<u8>>,
    display_buffer: Vec<u32>,
    window: minifb::Window,
    closed: Arc<AtomicBool>,
}

impl MinifbCanvas {
    pub fn new(width: u32, height: u32, closed: Arc<AtomicBool>) -> Result<Self, String> {
        let stride = width as usize * PixelLayout::XRGB8888.bytes_per_pixel();
        let surface = Surface::new(
            vec![0; stride * height as usize],
            width,
            height,
            stride,
            PixelLayout::XRGB8888,
        )
        .map_err(|e| e.to_string())?;

        let options = minifb::WindowOptions {
            borderless: false,
            title: true,
            resize: false,
            scale: minifb::Scale::X1,
            ..minifb::WindowOptions::default()
        };
        let mut window =
            minifb::Window::new("splash preview", width as usize, height as usize, options)
                .map_err(|e| format!("unable to open window: {e}"))?;
        window.set_target_fps(60);

        Ok(MinifbCanvas {
            surface,
            display_buffer: vec![0; width as usize * height as usize],
            window,
            closed,
        })
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(minifb::Key::Escape)
    }

    fn present(&mut self) {
        for (out, bytes) in self
            .display_buffer
            .iter_mut()
            .zip(self.surface.buffer().chunks_exact(4))
        {
            *out = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        let (width, height) = (self.surface.width() as usize, self.surface.height() as usize);
        if let Err(e) = self.window.update_with_buffer(&self.display_buffer, width, height) {
            warn!("updating window: {e}");
        }
        if !self.is_open() {
            debug!("preview window closed");
            self.closed.store(true, Ordering::Release);
        }
    }

    /// Keeps the last picture on screen until the window is closed.
    pub fn wait_closed(&mut self) {
        while self.is_open() {
            self.window.update();
        }
    }
}

impl Canvas for MinifbCanvas {
    fn size(&self) -> (u32, u32) {
        (self.surface.width(), self.surface.height())
    }

    fn blit(&mut self, raster: &Raster, x_align: f32, y_align: f32) -> Region {
        let region = self.surface.blit(raster, x_align, y_align);
        self.present();
        region
    }
}
