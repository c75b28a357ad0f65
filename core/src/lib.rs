#[macro_use]
extern crate tracing;

use rkyv::{Archive, Deserialize, Serialize};
use std::fmt;

mod board;
mod config;
mod credential;
mod error;
mod job;
mod queue;
mod scanner;
mod session;
mod status;
mod worker;

pub use self::{
    board::{Board, MemoryBoard, Placement, WriteRecord},
    config::Config,
    credential::{Credential, CredentialPool, Lease, PoolStats},
    error::Error,
    queue::{PendingSet, WaitQueue},
    scanner::Traversal,
    session::Session,
    status::WorkStatus,
};

/// Packed `0xRRGGBB` color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Color(pub u32);

impl Color {
    pub const WHITE: Self = Self(0xFF_FF_FF);

    #[inline]
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    #[inline]
    pub const fn rgb(self) -> [u8; 3] {
        [(self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06x}", self.0 & 0xFF_FF_FF)
    }
}

/// Target image, stored in offset order: `offset = x * height + y`.
#[derive(Archive, Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Raster {
    pub fn new(width: u32, height: u32, pixels: Vec<u32>) -> Result<Self, Error> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(Error::CorruptRaster {
                expected,
                actual: pixels.len(),
            });
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build a raster by sampling `color_at(x, y)` for every cell.
    pub fn from_fn(width: u32, height: u32, mut color_at: impl FnMut(u32, u32) -> Color) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for x in 0..width {
            for y in 0..height {
                pixels.push(color_at(x, y).0);
            }
        }

        Self {
            width,
            height,
            pixels,
        }
    }

    /// Validate and load an archive produced by `rkyv::to_bytes`.
    pub fn from_archive(bytes: &[u8]) -> Result<Self, Error> {
        let archived = rkyv::access::<ArchivedRaster, rkyv::rancor::Error>(bytes)?;
        let raster = rkyv::deserialize::<Raster, rkyv::rancor::Error>(archived)?;
        Self::new(raster.width, raster.height, raster.pixels)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn offset(&self, x: u32, y: u32) -> usize {
        x as usize * self.height as usize + y as usize
    }

    #[inline]
    pub fn coords(&self, offset: usize) -> (u32, u32) {
        let height = self.height as usize;
        ((offset / height) as u32, (offset % height) as u32)
    }

    #[inline]
    pub fn color(&self, offset: usize) -> Color {
        Color(self.pixels[offset])
    }

    #[inline]
    pub fn color_at(&self, x: u32, y: u32) -> Color {
        self.color(self.offset(x, y))
    }
}

#[cfg(test)]
pub(crate) fn block_on<F: std::future::Future>(future: F) -> F::Output {
    let mut runtime = monoio::RuntimeBuilder::<monoio::LegacyDriver>::new()
        .enable_timer()
        .build()
        .expect("failed to build runtime");

    runtime.block_on(future)
}
