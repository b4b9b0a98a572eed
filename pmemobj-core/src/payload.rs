//! Values that can be stored in a pool.
//!
//! The pool copies bytes in and out; it never interprets them. A type opts
//! in by implementing [`TypedPayload`], which describes how many bytes it
//! needs and how to move to and from a raw buffer.

use crate::error::{PoolError, Result};

/// A value that can be written into and read back from a pool.
///
/// `write_into` receives a buffer of exactly `size()` bytes. `read_from`
/// receives exactly the stored payload, after `accepts_size` approved its
/// length.
pub trait TypedPayload {
    /// Number of bytes this value occupies in the pool.
    fn size(&self) -> usize;

    /// Encode the value into `buf`.
    fn write_into(&self, buf: &mut [u8]);

    /// Overwrite `self` with the value encoded in `buf`.
    fn read_from(&mut self, buf: &[u8]) -> Result<()>;

    /// Whether a stored payload of `stored` bytes can be read into `self`.
    ///
    /// Fixed-size types accept only their own size. Variable-size types
    /// override this to accept any length.
    fn accepts_size(&self, stored: usize) -> bool {
        stored == self.size()
    }
}

macro_rules! impl_payload_for_numeric {
    ($($ty:ty),* $(,)?) => {
        $(
            impl TypedPayload for $ty {
                fn size(&self) -> usize {
                    std::mem::size_of::<$ty>()
                }

                fn write_into(&self, buf: &mut [u8]) {
                    buf.copy_from_slice(&self.to_le_bytes());
                }

                fn read_from(&mut self, buf: &[u8]) -> Result<()> {
                    let bytes = buf.try_into().map_err(|_| PoolError::SizeMismatch {
                        expected: std::mem::size_of::<$ty>() as u64,
                        found: buf.len() as u64,
                    })?;
                    *self = <$ty>::from_le_bytes(bytes);
                    Ok(())
                }
            }
        )*
    };
}

impl_payload_for_numeric!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

impl TypedPayload for bool {
    fn size(&self) -> usize {
        1
    }

    fn write_into(&self, buf: &mut [u8]) {
        buf[0] = u8::from(*self);
    }

    fn read_from(&mut self, buf: &[u8]) -> Result<()> {
        *self = match buf {
            [0] => false,
            [1] => true,
            _ => {
                return Err(PoolError::InvalidPayload {
                    cause: format!("{:?} is not a bool", buf),
                });
            }
        };
        Ok(())
    }
}

impl<const N: usize> TypedPayload for [u8; N] {
    fn size(&self) -> usize {
        N
    }

    fn write_into(&self, buf: &mut [u8]) {
        buf.copy_from_slice(self);
    }

    fn read_from(&mut self, buf: &[u8]) -> Result<()> {
        *self = buf.try_into().map_err(|_| PoolError::SizeMismatch {
            expected: N as u64,
            found: buf.len() as u64,
        })?;
        Ok(())
    }
}

impl TypedPayload for Vec<u8> {
    fn size(&self) -> usize {
        self.len()
    }

    fn write_into(&self, buf: &mut [u8]) {
        buf.copy_from_slice(self);
    }

    fn read_from(&mut self, buf: &[u8]) -> Result<()> {
        self.clear();
        self.extend_from_slice(buf);
        Ok(())
    }

    fn accepts_size(&self, _stored: usize) -> bool {
        true
    }
}

impl TypedPayload for String {
    fn size(&self) -> usize {
        self.len()
    }

    fn write_into(&self, buf: &mut [u8]) {
        buf.copy_from_slice(self.as_bytes());
    }

    fn read_from(&mut self, buf: &[u8]) -> Result<()> {
        let s = std::str::from_utf8(buf).map_err(|e| PoolError::InvalidPayload {
            cause: e.to_string(),
        })?;
        self.clear();
        self.push_str(s);
        Ok(())
    }

    fn accepts_size(&self, _stored: usize) -> bool {
        true
    }
}

/// Borrowed bytes read back in place, so only a payload of the same length
/// fits. Use `Vec<u8>` for anything else.
impl TypedPayload for [u8] {
    fn size(&self) -> usize {
        self.len()
    }

    fn write_into(&self, buf: &mut [u8]) {
        buf.copy_from_slice(self);
    }

    fn read_from(&mut self, buf: &[u8]) -> Result<()> {
        if buf.len() != self.len() {
            return Err(PoolError::SizeMismatch {
                expected: self.len() as u64,
                found: buf.len() as u64,
            });
        }
        self.copy_from_slice(buf);
        Ok(())
    }
}

impl TypedPayload for str {
    fn size(&self) -> usize {
        self.len()
    }

    fn write_into(&self, buf: &mut [u8]) {
        buf.copy_from_slice(self.as_bytes());
    }

    fn read_from(&mut self, _buf: &[u8]) -> Result<()> {
        Err(PoolError::InvalidPayload {
            cause: "cannot read into a borrowed str".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<T: TypedPayload + ?Sized>(value: &T) -> Vec<u8> {
        let mut buf = vec![0u8; value.size()];
        value.write_into(&mut buf);
        buf
    }

    #[test]
    fn integers_are_little_endian() {
        assert_eq!(encode(&0x0102_0304u32), vec![4, 3, 2, 1]);
        assert_eq!(encode(&-1i16), vec![0xFF, 0xFF]);

        let mut v = 0u64;
        v.read_from(&888u64.to_le_bytes()).unwrap();
        assert_eq!(v, 888);
    }

    #[test]
    fn fixed_size_rejects_other_lengths() {
        let v = 0u64;
        assert!(v.accepts_size(8));
        assert!(!v.accepts_size(4));

        let mut v = 0u32;
        assert!(matches!(
            v.read_from(&[1, 2]),
            Err(PoolError::SizeMismatch {
                expected: 4,
                found: 2
            })
        ));
    }

    #[test]
    fn bool_is_strict() {
        let mut b = false;
        b.read_from(&[1]).unwrap();
        assert!(b);
        assert!(matches!(
            b.read_from(&[2]),
            Err(PoolError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn variable_size_payloads() {
        let mut bytes = vec![9u8; 3];
        assert!(bytes.accepts_size(100));
        bytes.read_from(b"hello").unwrap();
        assert_eq!(bytes, b"hello");

        let mut s = String::from("old");
        s.read_from("grüß".as_bytes()).unwrap();
        assert_eq!(s, "grüß");
        assert!(s.read_from(&[0xFF, 0xFE]).is_err());
    }

    #[test]
    fn arrays_and_slices() {
        let arr = [1u8, 2, 3, 4];
        assert_eq!(encode(&arr), vec![1, 2, 3, 4]);
        assert_eq!(encode(&b"xyz"[..]), b"xyz".to_vec());
        assert_eq!(encode("abc"), b"abc".to_vec());

        let mut back = [0u8; 4];
        back.read_from(&[4, 3, 2, 1]).unwrap();
        assert_eq!(back, [4, 3, 2, 1]);
    }

    #[test]
    fn floats_roundtrip_bits() {
        let mut f = 0f64;
        f.read_from(&encode(&-2.5f64)).unwrap();
        assert_eq!(f, -2.5);
    }
}
