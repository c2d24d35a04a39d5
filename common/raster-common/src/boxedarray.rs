//! Fixed-length heap arrays with a `bincode::Decode` implementation that fills heap memory
//! directly.
//!
//! `#[derive(Decode)]` on `Box<[u8; LEN]>` builds the array on the stack before moving it to the
//! heap, which does not hold up for VRAM-sized buffers.

use bincode::de::read::Reader;
use bincode::de::{BorrowDecoder, Decoder};
use bincode::error::DecodeError;
use bincode::{BorrowDecode, Decode, Encode};
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone, PartialEq, Eq, Encode)]
pub struct BoxedByteArray<const LEN: usize>(Box<[u8]>);

impl<const LEN: usize> BoxedByteArray<LEN> {
    #[must_use]
    pub fn new() -> Self {
        Self(vec![0; LEN].into_boxed_slice())
    }

    fn decode_bytes<D: Decoder>(decoder: &mut D) -> Result<Self, DecodeError> {
        // Encoded as a length-prefixed slice
        let len = usize::decode(decoder)?;
        if len != LEN {
            return Err(DecodeError::ArrayLengthMismatch { required: LEN, found: len });
        }

        let mut array = vec![0; LEN].into_boxed_slice();
        decoder.reader().read(&mut array)?;
        Ok(Self(array))
    }
}

impl<const LEN: usize> Default for BoxedByteArray<LEN> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const LEN: usize> Deref for BoxedByteArray<LEN> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const LEN: usize> DerefMut for BoxedByteArray<LEN> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<const LEN: usize, Context> Decode<Context> for BoxedByteArray<LEN> {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        Self::decode_bytes(decoder)
    }
}

impl<'de, const LEN: usize, Context> BorrowDecode<'de, Context> for BoxedByteArray<LEN> {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        Self::decode_bytes(decoder)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode)]
pub struct BoxedWordArray<const LEN: usize>(Box<[u16]>);

impl<const LEN: usize> BoxedWordArray<LEN> {
    #[must_use]
    pub fn new() -> Self {
        Self(vec![0; LEN].into_boxed_slice())
    }

    fn decode_words<D: Decoder>(decoder: &mut D) -> Result<Self, DecodeError> {
        let len = usize::decode(decoder)?;
        if len != LEN {
            return Err(DecodeError::ArrayLengthMismatch { required: LEN, found: len });
        }

        let mut array = vec![0; LEN].into_boxed_slice();
        for value in &mut array {
            *value = u16::decode(decoder)?;
        }

        Ok(Self(array))
    }
}

impl<const LEN: usize> Default for BoxedWordArray<LEN> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const LEN: usize> Deref for BoxedWordArray<LEN> {
    type Target = [u16];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const LEN: usize> DerefMut for BoxedWordArray<LEN> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<const LEN: usize, Context> Decode<Context> for BoxedWordArray<LEN> {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        Self::decode_words(decoder)
    }
}

impl<'de, const LEN: usize, Context> BorrowDecode<'de, Context> for BoxedWordArray<LEN> {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        Self::decode_words(decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn config() -> impl bincode::config::Config {
        bincode::config::standard().with_little_endian().with_fixed_int_encoding()
    }

    #[test]
    fn byte_array_survives_encoding() {
        let mut array = BoxedByteArray::<64>::new();
        array[3] = 0x5A;
        array[63] = 0xFF;

        let bytes = bincode::encode_to_vec(&array, config()).unwrap();
        let (decoded, _): (BoxedByteArray<64>, usize) =
            bincode::decode_from_slice(&bytes, config()).unwrap();
        assert_eq!(decoded, array);
    }

    #[test]
    fn word_array_rejects_wrong_length() {
        let array = BoxedWordArray::<16>::new();
        let bytes = bincode::encode_to_vec(&array, config()).unwrap();

        let result: Result<(BoxedWordArray<32>, usize), _> =
            bincode::decode_from_slice(&bytes, config());
        assert!(result.is_err());
    }
}
