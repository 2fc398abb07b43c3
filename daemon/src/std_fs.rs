use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use embedded_io::ErrorType;
use embedded_pnm::Raster;
use log::debug;

use crate::{Error, Result};

/// [`embedded_io`] view of a buffered std file.
pub struct StdFileReader {
    file: BufReader<File>,
}

impl StdFileReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(Error::io(format!("opening {}", path.display())))?;
        Ok(StdFileReader {
            file: BufReader::new(file),
        })
    }
}

impl ErrorType for StdFileReader {
    type Error = std::io::Error;
}

impl embedded_io::Read for StdFileReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        use std::io::Read;
        self.file.read(buf)
    }
}

pub struct StdFileWriter {
    file: BufWriter<File>,
}

impl StdFileWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(Error::io(format!("creating {}", path.display())))?;
        Ok(StdFileWriter {
            file: BufWriter::new(file),
        })
    }
}

impl ErrorType for StdFileWriter {
    type Error = std::io::Error;
}

impl embedded_io::Write for StdFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        use std::io::Write;
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        use std::io::Write;
        self.file.flush()
    }
}

/// Reads and decodes a PNM image file.
pub fn decode_file(path: &Path) -> Result<Raster> {
    let reader = StdFileReader::open(path)?;
    let raster = embedded_pnm::decode(reader).map_err(|source| Error::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("decoded {} ({}x{})", path.display(), raster.width(), raster.height());
    Ok(raster)
}
