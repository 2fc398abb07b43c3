use embedded_io::Write;

use crate::{Error, Raster, Result};

/// Writes `raster` as a raw pixmap (`P6`, maxval 255).
pub fn encode_ppm<W: Write>(raster: &Raster, writer: &mut W) -> Result<()> {
    let header = alloc::format!("P6\n{} {}\n255\n", raster.width(), raster.height());
    writer
        .write_all(header.as_bytes())
        .map_err(Error::from_io_error)?;
    for y in 0..raster.height() {
        for pixel in raster.row(y) {
            writer
                .write_all(&[pixel.red, pixel.green, pixel.blue])
                .map_err(Error::from_io_error)?;
        }
    }
    writer.flush().map_err(Error::from_io_error)
}
