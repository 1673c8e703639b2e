//! Variant 负载
//!
//! 与引擎 `Variant` 逐位兼容的固定大小负载。全零负载即引擎的 nil 哨兵值。

use crate::sys::{ConstVariantPtr, VariantPtr};
use bytemuck::{Pod, Zeroable};

#[cfg(not(feature = "double-precision"))]
pub const VARIANT_WORDS: usize = 3;
#[cfg(feature = "double-precision")]
pub const VARIANT_WORDS: usize = 5;

/// Size of the engine `Variant` in bytes for the active build configuration.
pub const VARIANT_SIZE: usize = VARIANT_WORDS * 8;

/// Opaque engine Variant payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct VariantContent {
    words: [u64; VARIANT_WORDS],
}

impl VariantContent {
    pub const ZERO: Self = Self {
        words: [0; VARIANT_WORDS],
    };

    pub const fn from_words(words: [u64; VARIANT_WORDS]) -> Self {
        Self { words }
    }

    /// The all-zero payload is the engine's nil sentinel.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    pub fn words(&self) -> &[u64; VARIANT_WORDS] {
        &self.words
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn as_ptr(&self) -> ConstVariantPtr {
        self as *const Self as ConstVariantPtr
    }

    pub fn as_mut_ptr(&mut self) -> VariantPtr {
        self as *mut Self as VariantPtr
    }

    /// Bitwise read of an engine-owned payload; no ownership is transferred.
    ///
    /// # Safety
    /// `ptr` must point to a valid, initialized engine Variant.
    #[inline]
    pub unsafe fn read_from(ptr: ConstVariantPtr) -> Self {
        std::ptr::read(ptr as *const Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_nil_sentinel() {
        assert!(VariantContent::ZERO.is_zero());
        assert!(VariantContent::default().is_zero());
        let mut words = [0u64; VARIANT_WORDS];
        words[VARIANT_WORDS - 1] = 1;
        assert!(!VariantContent::from_words(words).is_zero());
    }

    #[test]
    fn test_payload_size() {
        assert_eq!(std::mem::size_of::<VariantContent>(), VARIANT_SIZE);
        assert_eq!(std::mem::align_of::<VariantContent>(), 8);
        #[cfg(not(feature = "double-precision"))]
        assert_eq!(VARIANT_SIZE, 24);
        #[cfg(feature = "double-precision")]
        assert_eq!(VARIANT_SIZE, 40);
    }
}
