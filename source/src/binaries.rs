use std::{marker::PhantomData, mem, slice};

use common::vcursor::{CursorError, VCursor};

/// Reads a struct as its raw in-file image.
///
/// Header structs are declared `#[repr(C, packed)]` to match the compiled
/// layout exactly, so a read is a straight byte copy into zeroed storage.
pub trait BinaryData {
    fn read(cursor: &mut VCursor) -> Result<Self, CursorError>
    where
        Self: Sized,
    {
        let size = mem::size_of::<Self>();
        let bytes = cursor.take(size)?;
        let mut value = unsafe { mem::zeroed::<Self>() };
        unsafe {
            let dst = slice::from_raw_parts_mut(&mut value as *mut Self as *mut u8, size);
            dst.copy_from_slice(bytes);
        }
        Ok(value)
    }
}

/// A file offset stored inside a record, relative to some base (the file
/// start, a header start, or the record's own position depending on the
/// format — callers pass the right base).
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Zeroable, bytemuck::Pod)]
pub struct BinOffset {
    pub index: i32,
}

impl BinOffset {
    pub fn abs(&self, base: usize) -> usize {
        (base as i64 + self.index as i64).max(0) as usize
    }

    /// Null-terminated string the offset points at. A zero offset is the
    /// compiler's way of writing "no name".
    pub fn read_str(&self, cursor: &mut VCursor, base: usize) -> Result<String, CursorError> {
        if self.index == 0 {
            return Ok(String::new());
        }
        cursor.with_absolute(self.abs(base), |c| c.read_cstr())
    }

    pub fn read_array<T: BinaryData>(
        &self,
        cursor: &mut VCursor,
        base: usize,
        count: usize,
    ) -> Result<Vec<(usize, T)>, CursorError> {
        let start = self.abs(base);
        cursor.with_absolute(start, |c| {
            let mut v = Vec::with_capacity(count);
            for i in 0..count {
                v.push((start + i * mem::size_of::<T>(), T::read(c)?));
            }
            Ok(v)
        })
    }

    pub fn read_pod_slice<T: bytemuck::AnyBitPattern>(
        &self,
        cursor: &mut VCursor,
        base: usize,
        count: usize,
    ) -> Result<Box<[T]>, CursorError> {
        cursor.with_absolute(self.abs(base), |c| c.read_pod_slice(count))
    }
}

/// Struct of (count, offset) for reading an array of items out of a header.
///
/// Records are returned with their absolute position because nested tables
/// store offsets relative to their owning record, not the file.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct BinArray<T> {
    pub count: i32,
    pub offset: BinOffset,
    _p: PhantomData<T>,
}

unsafe impl<T> bytemuck::Zeroable for BinArray<T> {}

impl<T> BinArray<T> {
    pub fn new(count: i32, offset: i32) -> Self {
        Self {
            count,
            offset: BinOffset { index: offset },
            _p: PhantomData,
        }
    }

    pub fn count(&self) -> usize {
        let count = self.count;
        count.max(0) as usize
    }
}

impl<T: BinaryData> BinArray<T> {
    pub fn read(
        &self,
        cursor: &mut VCursor,
        base: usize,
    ) -> Result<Vec<(usize, T)>, CursorError> {
        self.offset.read_array(cursor, base, self.count())
    }
}

impl<T: bytemuck::AnyBitPattern> BinArray<T> {
    pub fn read_pod(&self, cursor: &mut VCursor, base: usize) -> Result<Box<[T]>, CursorError> {
        self.offset.read_pod_slice(cursor, base, self.count())
    }
}

/// Placeholder element for header tables this crate does not decode; keeps
/// the surrounding header layout byte-accurate.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Zeroable)]
pub struct NilEntry;

impl BinaryData for NilEntry {}

macro_rules! impl_binary_data {
    ($($t:ty),*) => { $(impl BinaryData for $t {})* };
}

impl_binary_data!(u8, i8, u16, i16, u32, i32, f32, BinOffset);

#[cfg(test)]
mod binaries_tests {
    use super::*;

    #[test]
    fn bin_array_reads_records_with_positions() {
        // table of two u16s at offset 8
        let mut data = vec![0u8; 8];
        data.extend_from_slice(&0xaaaau16.to_le_bytes());
        data.extend_from_slice(&0xbbbbu16.to_le_bytes());

        let arr: BinArray<u16> = BinArray {
            count: 2,
            offset: BinOffset { index: 8 },
            _p: PhantomData,
        };
        let mut c = VCursor::new(&data);
        c.skip(4).unwrap();
        let records = arr.read(&mut c, 0).unwrap();
        assert_eq!(records, vec![(8, 0xaaaa), (10, 0xbbbb)]);
        // table read did not move the cursor
        assert_eq!(c.tell(), 4);
    }

    #[test]
    fn offset_str_zero_is_empty() {
        let data = b"\0junk\0name\0";
        let mut c = VCursor::new(data);
        assert_eq!(
            BinOffset { index: 0 }.read_str(&mut c, 4).unwrap(),
            ""
        );
        assert_eq!(
            BinOffset { index: 2 }.read_str(&mut c, 4).unwrap(),
            "name"
        );
    }
}
