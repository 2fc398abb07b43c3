//! Linux framebuffer device (`/dev/fbN`) mapped as a [`Surface`].

use std::{
    fs::OpenOptions,
    io,
    ops::Range,
    os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd},
    path::Path,
    ptr::NonNull,
};

use log::{debug, error, info, warn};
use splash_core::{
    Raster,
    surface::{Canvas, Channel, PixelLayout, Region, Surface},
};
use zerocopy::{FromBytes, FromZeros};

use crate::{Error, Result, sys};

const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;
const FBIOGET_FSCREENINFO: libc::c_ulong = 0x4602;
const FB_TYPE_PACKED_PIXELS: u32 = 0;
const FB_VISUAL_TRUECOLOR: u32 = 2;
const FB_VISUAL_DIRECTCOLOR: u32 = 4;

/// `struct fb_fix_screeninfo`
#[repr(C)]
#[derive(Debug, Clone, FromBytes)]
pub struct FbFixScreenInfo {
    pub id: [u8; 16],
    pub smem_start: libc::c_ulong,
    pub smem_len: u32,
    pub type_: u32,
    pub type_aux: u32,
    pub visual: u32,
    pub xpanstep: u16,
    pub ypanstep: u16,
    pub ywrapstep: u16,
    pub line_length: u32,
    pub mmio_start: libc::c_ulong,
    pub mmio_len: u32,
    pub accel: u32,
    pub capabilities: u16,
    pub reserved: [u16; 2],
}

/// `struct fb_bitfield`
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes)]
pub struct FbBitfield {
    pub offset: u32,
    pub length: u32,
    pub msb_right: u32,
}

/// `struct fb_var_screeninfo`
#[repr(C)]
#[derive(Debug, Clone, FromBytes)]
pub struct FbVarScreenInfo {
    pub xres: u32,
    pub yres: u32,
    pub xres_virtual: u32,
    pub yres_virtual: u32,
    pub xoffset: u32,
    pub yoffset: u32,
    pub bits_per_pixel: u32,
    pub grayscale: u32,
    pub red: FbBitfield,
    pub green: FbBitfield,
    pub blue: FbBitfield,
    pub transp: FbBitfield,
    pub nonstd: u32,
    pub activate: u32,
    pub height: u32,
    pub width: u32,
    pub accel_flags: u32,
    pub pixclock: u32,
    pub left_margin: u32,
    pub right_margin: u32,
    pub upper_margin: u32,
    pub lower_margin: u32,
    pub hsync_len: u32,
    pub vsync_len: u32,
    pub sync: u32,
    pub vmode: u32,
    pub rotate: u32,
    pub colorspace: u32,
    pub reserved: [u32; 4],
}

fn ioctl_read<T: FromZeros>(fd: BorrowedFd<'_>, request: libc::c_ulong, what: &str) -> Result<T> {
    let mut value = T::new_zeroed();
    // SAFETY: callers pair each request with the struct the kernel fills for it.
    sys::cvt(unsafe { libc::ioctl(fd.as_raw_fd(), request as _, &mut value as *mut T) })
        .map_err(Error::io(format!("reading {what}")))?;
    Ok(value)
}

fn channel(field: &'static str, bits: &FbBitfield) -> Result<Channel> {
    if bits.msb_right != 0 {
        warn!("{field} channel is msb-right, colors may be wrong");
    }
    let offset = u8::try_from(bits.offset).map_err(|_| Error::Geometry {
        field,
        value: bits.offset,
    })?;
    let length = u8::try_from(bits.length).map_err(|_| Error::Geometry {
        field,
        value: bits.length,
    })?;
    Ok(Channel::new(offset, length))
}

/// What the splash needs to know about a framebuffer mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub y_offset: u32,
    pub layout: PixelLayout,
}

impl Geometry {
    pub fn from_screen_info(fix: &FbFixScreenInfo, var: &FbVarScreenInfo) -> Result<Self> {
        if fix.type_ != FB_TYPE_PACKED_PIXELS {
            return Err(Error::UnsupportedType(fix.type_));
        }
        if !matches!(fix.visual, FB_VISUAL_TRUECOLOR | FB_VISUAL_DIRECTCOLOR) {
            return Err(Error::UnsupportedVisual(fix.visual));
        }
        if var.xres == 0 {
            return Err(Error::Geometry {
                field: "xres",
                value: 0,
            });
        }
        if var.yres == 0 {
            return Err(Error::Geometry {
                field: "yres",
                value: 0,
            });
        }
        let bits_per_pixel = u8::try_from(var.bits_per_pixel).map_err(|_| Error::Geometry {
            field: "bits_per_pixel",
            value: var.bits_per_pixel,
        })?;
        let layout = PixelLayout {
            red: channel("red", &var.red)?,
            green: channel("green", &var.green)?,
            blue: channel("blue", &var.blue)?,
            bits_per_pixel,
        };
        layout.validate()?;

        if var.xres_virtual != var.xres || var.yres_virtual != var.yres {
            warn!(
                "virtual resolution {}x{} differs from visible {}x{}, drawing on the visible area",
                var.xres_virtual, var.yres_virtual, var.xres, var.yres
            );
        }
        if var.xoffset != 0 {
            warn!("ignoring horizontal panning offset {}", var.xoffset);
        }

        Ok(Geometry {
            width: var.xres,
            height: var.yres,
            stride: fix.line_length as usize,
            y_offset: var.yoffset,
            layout,
        })
    }

    /// Bytes of the visible screen inside the device memory.
    pub fn window(&self) -> Range<usize> {
        let start = self.y_offset as usize * self.stride;
        start..start + self.stride * self.height as usize
    }
}

/// A shared read/write mapping of device memory. Only `window` is exposed.
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
    window: Range<usize>,
}

// SAFETY: the mapping is owned exclusively, nothing else aliases it in this process.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    fn map(fd: BorrowedFd<'_>, window: Range<usize>) -> io::Result<Self> {
        let len = window.end;
        // SAFETY: a fresh mapping, checked against MAP_FAILED below.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;
        debug!("mapped {len} bytes of framebuffer memory");
        Ok(MappedRegion { ptr, len, window })
    }
}

impl AsRef<[u8]> for MappedRegion {
    fn as_ref(&self) -> &[u8] {
        // SAFETY: `window` lies inside the `len` bytes mapped in `map`.
        unsafe {
            std::slice::from_raw_parts(self.ptr.as_ptr().add(self.window.start), self.window.len())
        }
    }
}

impl AsMut<[u8]> for MappedRegion {
    fn as_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` makes the borrow exclusive.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.ptr.as_ptr().add(self.window.start),
                self.window.len(),
            )
        }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: `ptr` and `len` describe the mapping created in `map`.
        if unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) } == -1 {
            error!("unmapping framebuffer: {}", io::Error::last_os_error());
        }
    }
}

/// An opened, mapped framebuffer device.
pub struct Framebuffer {
    surface: Surface<MappedRegion>,
    device: OwnedFd,
    id: String,
    geometry: Geometry,
}

impl Framebuffer {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(Error::io(format!("opening {}", path.display())))?;

        let fix: FbFixScreenInfo =
            ioctl_read(file.as_fd(), FBIOGET_FSCREENINFO, "fixed screen info")?;
        let var: FbVarScreenInfo =
            ioctl_read(file.as_fd(), FBIOGET_VSCREENINFO, "variable screen info")?;

        let id_len = fix.id.iter().position(|b| *b == 0).unwrap_or(fix.id.len());
        let id = String::from_utf8_lossy(&fix.id[..id_len]).into_owned();
        let geometry = Geometry::from_screen_info(&fix, &var)?;
        info!(
            "framebuffer {} on {}: {}x{}, {} bpp, stride {}",
            id,
            path.display(),
            geometry.width,
            geometry.height,
            geometry.layout.bits_per_pixel,
            geometry.stride
        );

        let region = MappedRegion::map(file.as_fd(), geometry.window())
            .map_err(Error::io(format!("mapping {}", path.display())))?;
        let surface = Surface::new(
            region,
            geometry.width,
            geometry.height,
            geometry.stride,
            geometry.layout,
        )?;

        Ok(Framebuffer {
            surface,
            device: file.into(),
            id,
            geometry,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn surface(&self) -> &Surface<MappedRegion> {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut Surface<MappedRegion> {
        &mut self.surface
    }

    /// Unmaps the memory and closes the device. Failures are only logged.
    pub fn close(self) {
        let Framebuffer {
            surface, device, id, ..
        } = self;
        drop(surface.into_inner());
        sys::close_fd(device, "framebuffer device");
        info!("framebuffer {id} released");
    }
}

impl Canvas for Framebuffer {
    fn size(&self) -> (u32, u32) {
        (self.geometry.width, self.geometry.height)
    }

    fn blit(&mut self, raster: &Raster, x_align: f32, y_align: f32) -> Region {
        self.surface.blit(raster, x_align, y_align)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splash_core::surface::SurfaceError;

    fn bitfield(offset: u32, length: u32) -> FbBitfield {
        FbBitfield {
            offset,
            length,
            msb_right: 0,
        }
    }

    fn screen(xres: u32, yres: u32, bpp: u32, stride: u32) -> (FbFixScreenInfo, FbVarScreenInfo) {
        let mut fix = FbFixScreenInfo::new_zeroed();
        fix.line_length = stride;
        fix.visual = FB_VISUAL_TRUECOLOR;
        let mut var = FbVarScreenInfo::new_zeroed();
        var.xres = xres;
        var.yres = yres;
        var.xres_virtual = xres;
        var.yres_virtual = yres;
        var.bits_per_pixel = bpp;
        if bpp == 16 {
            var.red = bitfield(11, 5);
            var.green = bitfield(5, 6);
            var.blue = bitfield(0, 5);
        } else {
            var.red = bitfield(16, 8);
            var.green = bitfield(8, 8);
            var.blue = bitfield(0, 8);
        }
        (fix, var)
    }

    #[test]
    fn kernel_struct_sizes() {
        assert_eq!(size_of::<FbVarScreenInfo>(), 160);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(size_of::<FbFixScreenInfo>(), 80);
        #[cfg(target_pointer_width = "32")]
        assert_eq!(size_of::<FbFixScreenInfo>(), 68);
    }

    #[test]
    fn xrgb_mode() {
        let (fix, var) = screen(1920, 1080, 32, 7680);
        let geometry = Geometry::from_screen_info(&fix, &var).unwrap();
        assert_eq!(geometry.layout, PixelLayout::XRGB8888);
        assert_eq!(geometry.window(), 0..7680 * 1080);
    }

    #[test]
    fn rgb565_mode() {
        let (fix, var) = screen(800, 480, 16, 1600);
        let geometry = Geometry::from_screen_info(&fix, &var).unwrap();
        assert_eq!(geometry.layout, PixelLayout::RGB565);
    }

    #[test]
    fn panned_window_starts_at_yoffset() {
        let (fix, mut var) = screen(640, 480, 32, 2560);
        var.yres_virtual = 960;
        var.yoffset = 480;
        let geometry = Geometry::from_screen_info(&fix, &var).unwrap();
        assert_eq!(geometry.window(), 2560 * 480..2560 * 960);
    }

    #[test]
    fn rejects_planar_modes() {
        let (mut fix, var) = screen(640, 480, 32, 2560);
        fix.type_ = 1;
        assert!(matches!(
            Geometry::from_screen_info(&fix, &var),
            Err(Error::UnsupportedType(1))
        ));
    }

    #[test]
    fn rejects_palette_modes() {
        let (mut fix, mut var) = screen(640, 480, 8, 640);
        fix.visual = 3;
        var.red = bitfield(0, 8);
        var.green = bitfield(0, 8);
        var.blue = bitfield(0, 8);
        assert!(matches!(
            Geometry::from_screen_info(&fix, &var),
            Err(Error::UnsupportedVisual(3))
        ));

        // same channels reported as true color still share their bits
        fix.visual = FB_VISUAL_TRUECOLOR;
        assert!(matches!(
            Geometry::from_screen_info(&fix, &var),
            Err(Error::Surface(SurfaceError::OverlappingChannels(..)))
        ));
    }

    #[test]
    fn directcolor_is_accepted() {
        let (mut fix, var) = screen(640, 480, 32, 2560);
        fix.visual = FB_VISUAL_DIRECTCOLOR;
        assert!(Geometry::from_screen_info(&fix, &var).is_ok());
    }

    #[test]
    fn rejects_bad_layouts() {
        let (fix, mut var) = screen(640, 480, 32, 2560);
        var.red = bitfield(300, 8);
        assert!(matches!(
            Geometry::from_screen_info(&fix, &var),
            Err(Error::Geometry { field: "red", .. })
        ));

        let (fix, mut var) = screen(640, 480, 32, 2560);
        var.bits_per_pixel = 12;
        assert!(matches!(
            Geometry::from_screen_info(&fix, &var),
            Err(Error::Surface(_))
        ));

        let (fix, var) = screen(0, 480, 32, 2560);
        assert!(matches!(
            Geometry::from_screen_info(&fix, &var),
            Err(Error::Geometry { field: "xres", .. })
        ));
    }

    #[test]
    fn missing_device_is_an_error() {
        let result = Framebuffer::open(Path::new("/nonexistent/fb0"));
        assert!(matches!(result, Err(Error::Io { .. })));
    }
}
