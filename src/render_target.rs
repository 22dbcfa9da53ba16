//! Aligned per-key color buffer.
//!
//! A `RenderTarget` holds one [`RgbaColor`] per key. Storage is a vector of
//! 32-byte aligned blocks of 8 colors, so the buffer start is always aligned
//! for AVX2 loads and its capacity is rounded up to a whole block. Colors
//! between `len()` and `capacity()` exist but carry no meaning.
//!
//! The vector frees its blocks with the same layout it allocated them with,
//! so there is no aligned-alloc / generic-free pairing to get wrong. Color
//! views over the blocks are built with `zerocopy`.

use std::ops::{Deref, DerefMut};

use keylight_device::RgbaColor;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::AllocationError;

/// Buffer alignment in bytes (16 is enough for SSE2, 32 for AVX2)
pub const ALIGN_BYTES: usize = 32;

/// Buffer alignment in colors
pub const ALIGN_COLORS: usize = ALIGN_BYTES / std::mem::size_of::<RgbaColor>();

#[derive(Debug, Clone, Copy, Default, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, align(32))]
struct ColorBlock([RgbaColor; ALIGN_COLORS]);

const _: () = assert!(std::mem::size_of::<ColorBlock>() == ALIGN_BYTES);
const _: () = assert!(std::mem::align_of::<ColorBlock>() == ALIGN_BYTES);

/// Capacity in colors of a buffer holding `size` keys
pub const fn capacity_for(size: usize) -> usize {
    size.div_ceil(ALIGN_COLORS) * ALIGN_COLORS
}

/// Fixed-size, aligned buffer of key colors.
///
/// Dereferences to the `len()` meaningful colors. Cloning copies the whole
/// block; there is no way to alias the storage of another buffer.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    blocks: Vec<ColorBlock>,
    size: usize,
}

impl RenderTarget {
    /// Allocate a buffer for `size` keys.
    ///
    /// Contents are unspecified; renderers are expected to paint the keys
    /// they control before the buffer is read.
    pub fn new(size: usize) -> Result<Self, AllocationError> {
        let block_count = size.div_ceil(ALIGN_COLORS);
        let mut blocks = Vec::new();
        blocks
            .try_reserve_exact(block_count)
            .map_err(|e| AllocationError {
                size,
                bytes: block_count.saturating_mul(ALIGN_BYTES),
                source: Some(e),
            })?;
        blocks.resize(block_count, ColorBlock::default());
        Ok(Self { blocks, size })
    }

    /// A buffer with no keys and no storage
    pub const fn empty() -> Self {
        Self {
            blocks: Vec::new(),
            size: 0,
        }
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of colors in storage, a multiple of [`ALIGN_COLORS`]
    pub fn capacity(&self) -> usize {
        self.blocks.len() * ALIGN_COLORS
    }

    /// The `len()` meaningful colors
    pub fn as_slice(&self) -> &[RgbaColor] {
        &self[..]
    }

    /// Storage as aligned chunks of [`ALIGN_COLORS`] colors; the last chunk
    /// may end in padding
    pub fn blocks(&self) -> &[[RgbaColor; ALIGN_COLORS]] {
        // Same size, no padding, looser alignment: the cast cannot fail
        <[[RgbaColor; ALIGN_COLORS]]>::ref_from_bytes(self.blocks.as_bytes()).unwrap_or_default()
    }

    /// All `capacity()` colors, padding included
    pub fn as_padded_slice(&self) -> &[RgbaColor] {
        <[RgbaColor]>::ref_from_bytes(self.blocks.as_bytes()).unwrap_or_default()
    }

    /// Mutable access to all `capacity()` colors, padding included
    pub fn as_padded_mut_slice(&mut self) -> &mut [RgbaColor] {
        <[RgbaColor]>::mut_from_bytes(self.blocks.as_mut_bytes()).unwrap_or_default()
    }

    /// Move the contents out, leaving `self` empty (no keys, no storage)
    pub fn take(&mut self) -> Self {
        std::mem::replace(self, Self::empty())
    }
}

impl Default for RenderTarget {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for RenderTarget {
    type Target = [RgbaColor];

    fn deref(&self) -> &[RgbaColor] {
        &self.as_padded_slice()[..self.size]
    }
}

impl DerefMut for RenderTarget {
    fn deref_mut(&mut self) -> &mut [RgbaColor] {
        let size = self.size;
        &mut self.as_padded_mut_slice()[..size]
    }
}

impl PartialEq for RenderTarget {
    /// Buffers are equal when their meaningful colors are; padding is ignored
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl Eq for RenderTarget {}
