//! # Address space
//!
//! The emulated 32-bit address space is a set of named, non-overlapping
//! ranges. Each range is either read-only (ROM, loaded once) or read-write
//! (RAM). Everything outside a range is unmapped.
//!
//! ```text
//!   0x0000_0000 ┌──────────────┐
//!               │ rom  (RO)    │  image loaded at construction
//!               ├──────────────┤
//!               │   unmapped   │  every access fails
//!               ├──────────────┤
//!               │ ram  (RW)    │  zero filled
//!   0xFFFF_FFFF └──────────────┘
//! ```
//!
//! All ranges share one host buffer; a range is a window into it at a
//! fixed offset. Accesses are little-endian and may be misaligned, but an
//! access never straddles two ranges.

#[allow(clippy::cast_possible_truncation)]
mod address_space;
mod range;

pub use address_space::{AddressSpace, MemoryValue};
pub use range::{MappedRange, MemoryRange, Permission};
