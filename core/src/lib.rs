#![no_std]

pub mod animation;
pub mod protocol;
pub mod surface;

pub use embedded_pnm::{Raster, Rgb};

extern crate alloc;
