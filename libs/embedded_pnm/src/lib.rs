/*!
A no_std PNM reader using embedded-io for early boot environments.

Decodes every member of the netpbm family into a flat RGB [`Raster`]:

| magic | format | samples |
|-------|--------|---------|
| `P1`  | bitmap, plain  | `1` is black, `0` is white |
| `P2`  | graymap, plain | scaled from maxval to 0..=255 |
| `P3`  | pixmap, plain  | scaled per channel |
| `P4`  | bitmap, raw    | 8 pixels per byte, MSB first |
| `P5`  | graymap, raw   | 1 or 2 bytes per sample |
| `P6`  | pixmap, raw    | 1 or 2 bytes per channel |

The raw variants are behind the `binary` feature (enabled by default).

## Usage
```
# use embedded_pnm as pnm;
# fn main() -> Result<(), pnm::Error> {
let data = b"P2\n# tiny\n2 1\n15\n0 15\n";
let raster = pnm::decode(&data[..])?;
assert_eq!((raster.width(), raster.height()), (2, 1));
assert_eq!(raster.pixel(1, 0).unwrap().red, 255);
# Ok(())
# }
```
*/

#![no_std]

extern crate alloc;

mod decoder;
mod encoder;
mod raster;


pub use decoder::{Decoder, Format, Header, decode};
pub use encoder::encode_ppm;
pub use raster::{Raster, Rgb};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    IoError(embedded_io::ErrorKind),
    /// The file does not start with `P` and a format digit.
    NotPnm,
    /// A known magic whose support was compiled out.
    UnsupportedFormat(u8),
    InvalidHeader,
    InvalidSample,
    Eof,
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub(crate) fn from_io_error(error: impl embedded_io::Error) -> Self {
        Error::IoError(error.kind())
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::IoError(kind) => write!(f, "i/o error: {kind:?}"),
            Error::NotPnm => f.write_str("not a PNM file"),
            Error::UnsupportedFormat(magic) => {
                write!(f, "PNM format P{} is not supported by this build", *magic as char)
            }
            Error::InvalidHeader => f.write_str("invalid PNM header"),
            Error::InvalidSample => f.write_str("invalid PNM sample"),
            Error::Eof => f.write_str("end of file"),
        }
    }
}

impl core::error::Error for Error {}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Error::IoError(kind) => *kind,
            Error::NotPnm | Error::InvalidHeader | Error::InvalidSample | Error::Eof => {
                embedded_io::ErrorKind::InvalidData
            }
            Error::UnsupportedFormat(_) => embedded_io::ErrorKind::Unsupported,
        }
    }
}
