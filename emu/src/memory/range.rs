use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ReadOnly => "r-",
            Self::ReadWrite => "rw",
        })
    }
}

/// A range requested by the host: where it lives, how big it is, who may
/// write it and what it initially contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRange {
    pub name: String,
    pub start: u32,
    pub size: u32,
    pub permission: Permission,
    #[serde(default)]
    pub image: Vec<u8>,
}

impl MemoryRange {
    pub fn new(name: impl Into<String>, start: u32, size: u32, permission: Permission) -> Self {
        Self {
            name: name.into(),
            start,
            size,
            permission,
            image: Vec::new(),
        }
    }

    pub fn read_only(name: impl Into<String>, start: u32, size: u32) -> Self {
        Self::new(name, start, size, Permission::ReadOnly)
    }

    pub fn read_write(name: impl Into<String>, start: u32, size: u32) -> Self {
        Self::new(name, start, size, Permission::ReadWrite)
    }

    /// Bytes copied to the start of the range when the address space is built.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<Vec<u8>>) -> Self {
        self.image = image.into();
        self
    }

    /// One past the last byte, wide enough for a range ending at 4 GiB.
    #[must_use]
    pub fn end(&self) -> u64 {
        u64::from(self.start) + u64::from(self.size)
    }
}

/// A range as mapped inside an [`AddressSpace`](super::AddressSpace).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRange {
    pub(super) name: String,
    pub(super) start: u32,
    pub(super) size: u32,
    pub(super) permission: Permission,
    pub(super) offset: usize,
}

impl MappedRange {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn start(&self) -> u32 {
        self.start
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub const fn permission(&self) -> Permission {
        self.permission
    }

    #[must_use]
    pub const fn contains(&self, address: u32) -> bool {
        address >= self.start && address - self.start < self.size
    }
}

impl std::fmt::Display for MappedRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<8} 0x{:08X}..0x{:08X} {}",
            self.name,
            self.start,
            u64::from(self.start) + u64::from(self.size),
            self.permission
        )
    }
}
