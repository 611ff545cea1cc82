//! Big-endian byte cursor over the raw store.

use crate::error::KrdsError;

pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.buf[self.offset..]
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], KrdsError> {
        if self.remaining() < n {
            return Err(KrdsError::UnexpectedEof {
                offset: self.offset,
                wanted: n,
                available: self.remaining(),
            });
        }
        let bytes = &self.buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], KrdsError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn peek_i8(&self) -> Result<i8, KrdsError> {
        match self.buf.get(self.offset) {
            Some(b) => Ok(*b as i8),
            None => Err(KrdsError::UnexpectedEof {
                offset: self.offset,
                wanted: 1,
                available: 0,
            }),
        }
    }

    pub(crate) fn i8(&mut self) -> Result<i8, KrdsError> {
        Ok(i8::from_be_bytes(self.array()?))
    }

    pub(crate) fn u8(&mut self) -> Result<u8, KrdsError> {
        Ok(u8::from_be_bytes(self.array()?))
    }

    pub(crate) fn i16(&mut self) -> Result<i16, KrdsError> {
        Ok(i16::from_be_bytes(self.array()?))
    }

    pub(crate) fn u16(&mut self) -> Result<u16, KrdsError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub(crate) fn i32(&mut self) -> Result<i32, KrdsError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    pub(crate) fn i64(&mut self) -> Result<i64, KrdsError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    pub(crate) fn f32(&mut self) -> Result<f32, KrdsError> {
        Ok(f32::from_be_bytes(self.array()?))
    }

    pub(crate) fn f64(&mut self) -> Result<f64, KrdsError> {
        Ok(f64::from_be_bytes(self.array()?))
    }
}
