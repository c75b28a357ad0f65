use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The raster exceeds the supported dimensions.
    #[error("image too large: {width}x{height} (max {max_width}x{max_height})")]
    ImageTooLarge {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    /// The archived raster failed validation.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] rkyv::rancor::Error),

    #[error("corrupt raster: expected {expected} pixels, got {actual}")]
    CorruptRaster { expected: usize, actual: usize },

    #[error("placement ({x}, {y}) outside of the {width}x{height} canvas")]
    PlacementOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    #[error("no image set")]
    NoImage,

    /// Transient; the previous snapshot stays in use.
    #[error("board refresh failed: {0}")]
    RefreshFailed(#[source] std::io::Error),
}
