use alloc::vec::Vec;
use embedded_io::Read;

use crate::{Error, Raster, Result, Rgb};

macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::trace!($($arg)*);
    };
}

/// The six members of the netpbm family, keyed by the digit after `P`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    PlainBitmap,
    PlainGraymap,
    PlainPixmap,
    RawBitmap,
    RawGraymap,
    RawPixmap,
}

impl Format {
    pub fn from_magic(digit: u8) -> Result<Self> {
        match digit {
            b'1' => Ok(Format::PlainBitmap),
            b'2' => Ok(Format::PlainGraymap),
            b'3' => Ok(Format::PlainPixmap),
            b'4'..=b'6' if !cfg!(feature = "binary") => Err(Error::UnsupportedFormat(digit)),
            b'4' => Ok(Format::RawBitmap),
            b'5' => Ok(Format::RawGraymap),
            b'6' => Ok(Format::RawPixmap),
            _ => Err(Error::NotPnm),
        }
    }

    pub fn magic(self) -> u8 {
        match self {
            Format::PlainBitmap => b'1',
            Format::PlainGraymap => b'2',
            Format::PlainPixmap => b'3',
            Format::RawBitmap => b'4',
            Format::RawGraymap => b'5',
            Format::RawPixmap => b'6',
        }
    }

    /// Bitmaps carry no maxval field.
    pub fn is_bitmap(self) -> bool {
        matches!(self, Format::PlainBitmap | Format::RawBitmap)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub format: Format,
    pub width: u32,
    pub height: u32,
    /// Always 1 for bitmaps.
    pub maxval: u16,
}

/// Buffered byte source. The netpbm grammar is byte oriented and `embedded_io`
/// has no `BufRead` we could rely on in every environment.
struct Bytes<R> {
    reader: R,
    buf: [u8; 256],
    pos: usize,
    end: usize,
}

impl<R: Read> Bytes<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: [0u8; 256],
            pos: 0,
            end: 0,
        }
    }

    fn next(&mut self) -> Result<Option<u8>> {
        if self.pos == self.end {
            self.end = self.reader.read(&mut self.buf).map_err(Error::from_io_error)?;
            self.pos = 0;
            if self.end == 0 {
                return Ok(None);
            }
        }
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(byte))
    }

    fn byte(&mut self) -> Result<u8> {
        self.next()?.ok_or(Error::Eof)
    }

    fn skip_comment(&mut self) -> Result<()> {
        while self.byte()? != b'\n' {}
        Ok(())
    }

    /// First byte that is neither whitespace nor part of a `#` comment.
    fn significant(&mut self) -> Result<u8> {
        loop {
            let c = self.byte()?;
            if c == b'#' {
                self.skip_comment()?;
            } else if !c.is_ascii_whitespace() {
                return Ok(c);
            }
        }
    }

    /// Decimal number. The terminating byte is consumed, which for the raw
    /// formats is the single whitespace before the sample data.
    fn number(&mut self, invalid: Error) -> Result<u32> {
        let mut c = self.significant()?;
        if !c.is_ascii_digit() {
            return Err(invalid);
        }
        let mut value: u32 = 0;
        loop {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add((c - b'0') as u32))
                .ok_or(invalid)?;
            match self.next()? {
                Some(next) if next.is_ascii_digit() => c = next,
                Some(b'#') => {
                    self.skip_comment()?;
                    return Ok(value);
                }
                // a trailing number may end the file
                _ => return Ok(value),
            }
        }
    }

    /// Plain bitmaps allow samples without separators, so each one is a single digit.
    fn plain_bit(&mut self) -> Result<bool> {
        match self.significant()? {
            b'0' => Ok(false),
            b'1' => Ok(true),
            _ => Err(Error::InvalidSample),
        }
    }

    fn plain_sample(&mut self, maxval: u16) -> Result<u8> {
        let value = self.number(Error::InvalidSample)?;
        scale(value, maxval)
    }

    fn raw_sample(&mut self, maxval: u16) -> Result<u8> {
        let value = if maxval < 256 {
            self.byte()? as u32
        } else {
            let high = self.byte()? as u32;
            let low = self.byte()? as u32;
            (high << 8) | low
        };
        scale(value, maxval)
    }
}

/// Rescales a sample to 0..=255, rounding to nearest.
fn scale(value: u32, maxval: u16) -> Result<u8> {
    let maxval = maxval as u32;
    if value > maxval {
        return Err(Error::InvalidSample);
    }
    Ok(((255 * value + maxval / 2) / maxval) as u8)
}

/// A set bit is ink.
fn bit_color(set: bool) -> Rgb {
    if set { Rgb::BLACK } else { Rgb::WHITE }
}

/// A PNM decoder that has consumed the header and is positioned at the samples.
pub struct Decoder<R> {
    bytes: Bytes<R>,
    header: Header,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut bytes = Bytes::new(reader);
        if bytes.next()? != Some(b'P') {
            return Err(Error::NotPnm);
        }
        let format = Format::from_magic(bytes.next()?.ok_or(Error::NotPnm)?)?;

        let width = bytes.number(Error::InvalidHeader)?;
        let height = bytes.number(Error::InvalidHeader)?;
        if width == 0 || height == 0 {
            return Err(Error::InvalidHeader);
        }
        let maxval = if format.is_bitmap() {
            1
        } else {
            match bytes.number(Error::InvalidHeader)? {
                0 => return Err(Error::InvalidHeader),
                m => u16::try_from(m).map_err(|_| Error::InvalidHeader)?,
            }
        };
        trace!("PNM header: P{} {}x{} maxval={}", format.magic() as char, width, height, maxval);

        Ok(Self {
            bytes,
            header: Header {
                format,
                width,
                height,
                maxval,
            },
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Reads every sample. Running out of data before the last one is an error.
    pub fn decode(mut self) -> Result<Raster> {
        let Header {
            format,
            width,
            height,
            maxval,
        } = self.header;
        let count = (width as usize)
            .checked_mul(height as usize)
            .ok_or(Error::InvalidHeader)?;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(count)
            .map_err(|_| Error::InvalidHeader)?;

        let bytes = &mut self.bytes;
        match format {
            Format::PlainBitmap => {
                for _ in 0..count {
                    pixels.push(bit_color(bytes.plain_bit()?));
                }
            }
            Format::PlainGraymap => {
                for _ in 0..count {
                    pixels.push(Rgb::gray(bytes.plain_sample(maxval)?));
                }
            }
            Format::PlainPixmap => {
                for _ in 0..count {
                    let red = bytes.plain_sample(maxval)?;
                    let green = bytes.plain_sample(maxval)?;
                    let blue = bytes.plain_sample(maxval)?;
                    pixels.push(Rgb::new(red, green, blue));
                }
            }
            Format::RawBitmap => {
                for _ in 0..height {
                    let mut remaining = width;
                    while remaining > 0 {
                        let packed = bytes.byte()?;
                        let used = remaining.min(8);
                        for bit in 0..used {
                            pixels.push(bit_color(packed & (0x80 >> bit) != 0));
                        }
                        remaining -= used;
                    }
                }
            }
            Format::RawGraymap => {
                for _ in 0..count {
                    pixels.push(Rgb::gray(bytes.raw_sample(maxval)?));
                }
            }
            Format::RawPixmap => {
                for _ in 0..count {
                    let red = bytes.raw_sample(maxval)?;
                    let green = bytes.raw_sample(maxval)?;
                    let blue = bytes.raw_sample(maxval)?;
                    pixels.push(Rgb::new(red, green, blue));
                }
            }
        }

        Raster::new(width, height, pixels).ok_or(Error::InvalidHeader)
    }
}

/// Decodes a whole PNM stream.
pub fn decode<R: Read>(reader: R) -> Result<Raster> {
    Decoder::new(reader)?.decode()
}
