use std::cell::Cell;

use crate::error::{ConfigError, MemoryError};
use crate::memory::range::{MappedRange, MemoryRange, Permission};

mod sealed {
    pub trait Sealed {}
}

/// Values the address space can transfer: `u8`, `u16` and `u32`, little-endian.
pub trait MemoryValue: Copy + sealed::Sealed {
    const SIZE: usize;

    fn from_le_slice(bytes: &[u8]) -> Self;

    fn write_le_slice(self, out: &mut [u8]);
}

macro_rules! impl_memory_value {
    ($($ty:ty),*) => {
        $(
            impl sealed::Sealed for $ty {}

            impl MemoryValue for $ty {
                const SIZE: usize = size_of::<$ty>();

                #[inline]
                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut buf = [0_u8; size_of::<$ty>()];
                    buf.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(buf)
                }

                #[inline]
                fn write_le_slice(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_memory_value!(u8, u16, u32);

/// The emulated address space: validated ranges backed by one host buffer.
///
/// The topology is fixed at construction, only the contents change.
#[derive(Debug)]
pub struct AddressSpace {
    ranges: Vec<MappedRange>,
    backing: Vec<u8>,

    /// Index of the range that served the previous access.
    last_hit: Cell<usize>,
}

impl AddressSpace {
    /// Validates and maps `ranges`, copying each initial image in place.
    ///
    /// Zero-sized ranges are accepted and never match an address.
    ///
    /// # Errors
    ///
    /// Fails when two ranges overlap, a range runs past 4 GiB or an image does
    /// not fit in its range.
    pub fn new(ranges: Vec<MemoryRange>) -> Result<Self, ConfigError> {
        for range in &ranges {
            if range.end() > 1 << 32 {
                return Err(ConfigError::RangeWraps {
                    range: range.name.clone(),
                    start: range.start,
                    size: range.size,
                });
            }
            if range.image.len() > range.size as usize {
                return Err(ConfigError::ImageTooLarge {
                    range: range.name.clone(),
                    image_len: range.image.len(),
                    size: range.size,
                });
            }
        }

        let mut ranges: Vec<MemoryRange> = ranges.into_iter().filter(|r| r.size > 0).collect();
        ranges.sort_by_key(|r| r.start);

        for pair in ranges.windows(2) {
            if pair[0].end() > u64::from(pair[1].start) {
                return Err(ConfigError::Overlap {
                    first: pair[0].name.clone(),
                    second: pair[1].name.clone(),
                });
            }
        }

        let total: usize = ranges.iter().map(|r| r.size as usize).sum();
        let mut backing = vec![0; total];
        let mut mapped = Vec::with_capacity(ranges.len());
        let mut offset = 0;

        for range in ranges {
            backing[offset..offset + range.image.len()].copy_from_slice(&range.image);

            let m = MappedRange {
                name: range.name,
                start: range.start,
                size: range.size,
                permission: range.permission,
                offset,
            };
            tracing::debug!("mapped {m}");
            offset += m.size as usize;
            mapped.push(m);
        }

        Ok(Self {
            ranges: mapped,
            backing,
            last_hit: Cell::new(0),
        })
    }

    fn index_of(&self, address: u32) -> Option<usize> {
        let hit = self.last_hit.get();
        if self.ranges.get(hit).is_some_and(|r| r.contains(address)) {
            return Some(hit);
        }

        let idx = self
            .ranges
            .partition_point(|r| r.start <= address)
            .checked_sub(1)?;
        if self.ranges[idx].contains(address) {
            self.last_hit.set(idx);
            Some(idx)
        } else {
            None
        }
    }

    /// Resolves `[address, address + len)` to a range and an offset into the
    /// backing buffer.
    fn locate(&self, address: u32, len: usize) -> Result<(&MappedRange, usize), MemoryError> {
        let unmapped = || MemoryError::Unmapped {
            address,
            size: len as u32,
        };

        let range = &self.ranges[self.index_of(address).ok_or_else(unmapped)?];
        let relative = (address - range.start) as usize;
        if relative + len > range.size as usize {
            return Err(unmapped());
        }
        Ok((range, range.offset + relative))
    }

    /// Checked read-only view of `len` bytes starting at `address`.
    ///
    /// # Errors
    ///
    /// [`MemoryError::Unmapped`] if any byte falls outside the range holding `address`.
    pub fn view(&self, address: u32, len: usize) -> Result<&[u8], MemoryError> {
        let (_, offset) = self.locate(address, len)?;
        Ok(&self.backing[offset..offset + len])
    }

    /// Checked writable view of `len` bytes starting at `address`.
    ///
    /// # Errors
    ///
    /// [`MemoryError::Unmapped`] as for [`view`](Self::view), and
    /// [`MemoryError::ReadOnly`] when the range is not writable.
    pub fn view_mut(&mut self, address: u32, len: usize) -> Result<&mut [u8], MemoryError> {
        let (range, offset) = self.locate(address, len)?;
        if range.permission == Permission::ReadOnly {
            return Err(MemoryError::ReadOnly {
                address,
                range: range.name.clone(),
            });
        }
        Ok(&mut self.backing[offset..offset + len])
    }

    /// # Errors
    ///
    /// [`MemoryError::Unmapped`] when the access is not inside a single range.
    #[inline]
    pub fn read<T: MemoryValue>(&self, address: u32) -> Result<T, MemoryError> {
        self.view(address, T::SIZE).map(T::from_le_slice)
    }

    /// # Errors
    ///
    /// [`MemoryError::Unmapped`] or [`MemoryError::ReadOnly`].
    #[inline]
    pub fn write<T: MemoryValue>(&mut self, address: u32, value: T) -> Result<(), MemoryError> {
        value.write_le_slice(self.view_mut(address, T::SIZE)?);
        Ok(())
    }

    /// Byte load sign-extended to 32 bits.
    ///
    /// # Errors
    ///
    /// [`MemoryError::Unmapped`]
    pub fn read_signed_byte(&self, address: u32) -> Result<u32, MemoryError> {
        Ok(i32::from(self.read::<u8>(address)? as i8) as u32)
    }

    /// Halfword load sign-extended to 32 bits.
    ///
    /// # Errors
    ///
    /// [`MemoryError::Unmapped`]
    pub fn read_signed_halfword(&self, address: u32) -> Result<u32, MemoryError> {
        Ok(i32::from(self.read::<u16>(address)? as i16) as u32)
    }

    /// Host side loader, copies `bytes` at `address` ignoring permissions.
    ///
    /// # Errors
    ///
    /// [`MemoryError::Unmapped`] when `bytes` does not fit in one range.
    pub fn load(&mut self, address: u32, bytes: &[u8]) -> Result<(), MemoryError> {
        let (_, offset) = self.locate(address, bytes.len())?;
        self.backing[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// # Errors
    ///
    /// [`MemoryError::Unmapped`]
    pub fn permission_of(&self, address: u32) -> Result<Permission, MemoryError> {
        self.range_containing(address)
            .map(MappedRange::permission)
            .ok_or(MemoryError::Unmapped { address, size: 1 })
    }

    #[must_use]
    pub fn range_containing(&self, address: u32) -> Option<&MappedRange> {
        self.index_of(address).map(|idx| &self.ranges[idx])
    }

    /// Mapped ranges in ascending address order.
    pub fn ranges(&self) -> impl Iterator<Item = &MappedRange> {
        self.ranges.iter()
    }
}
