//! Heap-allocated fixed-length tables with a custom `bincode::Decode` implementation that
//! deserializes directly into heap memory.
//!
//! `#[derive(Decode)]` on `Box<[T; LEN]>` builds the array on the stack before moving it to the
//! heap, which overflows the stack for tables the size of a 64K-entry colormap.

use bincode::de::{BorrowDecoder, Decoder};
use bincode::error::DecodeError;
use bincode::{BorrowDecode, Decode, Encode};
use std::ops::{Deref, DerefMut};

fn new_boxed<T: Copy + Default, const LEN: usize>() -> Box<[T; LEN]> {
    let Ok(array) = vec![T::default(); LEN].into_boxed_slice().try_into() else {
        unreachable!("boxed slice was allocated with exactly LEN elements")
    };
    array
}

macro_rules! define_boxed_array {
    ($name:ident, $t:ty) => {
        #[derive(Debug, Clone, Encode)]
        pub struct $name<const LEN: usize>(Box<[$t; LEN]>);

        impl<const LEN: usize> $name<LEN> {
            #[must_use]
            pub fn new() -> Self {
                Self(new_boxed())
            }
        }

        impl<const LEN: usize> Default for $name<LEN> {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<const LEN: usize> Deref for $name<LEN> {
            type Target = Box<[$t; LEN]>;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl<const LEN: usize> DerefMut for $name<LEN> {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }

        impl<const LEN: usize, Context> Decode<Context> for $name<LEN> {
            fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
                let mut array: Box<[$t; LEN]> = new_boxed();
                for value in array.iter_mut() {
                    *value = <$t>::decode(decoder)?;
                }
                Ok(Self(array))
            }
        }

        impl<'de, const LEN: usize, Context> BorrowDecode<'de, Context> for $name<LEN> {
            fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
                decoder: &mut D,
            ) -> Result<Self, DecodeError> {
                Self::decode(decoder)
            }
        }
    };
}

define_boxed_array!(BoxedWordArray, u16);
define_boxed_array!(BoxedDwordArray, u32);
