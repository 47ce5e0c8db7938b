//! Size Classes
//!
//! Maps byte lengths to monotonic size-class ids and back. Every file and
//! hole in a container occupies exactly `size_of(class)` bytes.
//!
//! ## Tiers
//! ```text
//! ┌──────────┬─────────────────────┬──────────────────┐
//! │ Classes  │ Sizes               │ Step             │
//! ├──────────┼─────────────────────┼──────────────────┤
//! │ 1..=10   │ 1 B .. 512 B        │ powers of two    │
//! │ 11..=26  │ 1 KiB .. 16 KiB     │ 1 KiB            │
//! │ 27..=33  │ 32 KiB .. 128 KiB   │ 16 KiB           │
//! │ 34..=64  │ 256 KiB .. 4 MiB    │ 128 KiB          │
//! │ 65..     │ 5 MiB ..            │ 1 MiB            │
//! └──────────┴─────────────────────┴──────────────────┘
//! ```
//!
//! Class 0 is reserved and never produced for a positive size.

/// A size-class id. Zero is invalid.
pub type SizeClass = u32;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

const POW2_LAST: SizeClass = 10;
const KIB_LAST: SizeClass = 26;
const KIB16_LAST: SizeClass = 33;
const KIB128_LAST: SizeClass = 64;

const POW2_MAX: u64 = 512;
const KIB_MAX: u64 = 16 * KIB;
const KIB16_MAX: u64 = 128 * KIB;
const KIB128_MAX: u64 = 4 * MIB;

/// Smallest class whose size is `>= size`.
///
/// # Panics
/// Panics when `size == 0`.
pub fn class_of(size: u64) -> SizeClass {
    assert!(size > 0, "size class of an empty range is undefined");

    if size <= POW2_MAX {
        // 1 -> 1, 2 -> 2, 3..=4 -> 3, ..., 257..=512 -> 10
        let bits = 64 - (size - 1).leading_zeros();
        return bits + 1;
    }
    if size <= KIB_MAX {
        return POW2_LAST + steps(size, KIB);
    }
    if size <= KIB16_MAX {
        return KIB_LAST + steps(size - KIB_MAX, 16 * KIB);
    }
    if size <= KIB128_MAX {
        return KIB16_LAST + steps(size - KIB16_MAX, 128 * KIB);
    }
    KIB128_LAST + steps(size - KIB128_MAX, MIB)
}

/// Footprint in bytes of `class`.
///
/// # Panics
/// Panics when `class == 0`.
pub fn size_of(class: SizeClass) -> u64 {
    assert!(class > 0, "size class 0 is reserved");

    let class = class as u64;
    match class {
        c if c <= POW2_LAST as u64 => 1 << (c - 1),
        c if c <= KIB_LAST as u64 => (c - POW2_LAST as u64) * KIB,
        c if c <= KIB16_LAST as u64 => KIB_MAX + (c - KIB_LAST as u64) * 16 * KIB,
        c if c <= KIB128_LAST as u64 => KIB16_MAX + (c - KIB16_LAST as u64) * 128 * KIB,
        c => KIB128_MAX + (c - KIB128_LAST as u64) * MIB,
    }
}

/// `size` rounded up to its class footprint.
pub fn round(size: u64) -> u64 {
    size_of(class_of(size))
}

/// True when `size` is exactly a class footprint.
pub fn is_boundary(size: u64) -> bool {
    size > 0 && round(size) == size
}

/// Largest class whose size is `<= size`, or 0 when `size == 0`.
pub fn floor_class(size: u64) -> SizeClass {
    if size == 0 {
        return 0;
    }
    let class = class_of(size);
    if size_of(class) == size {
        class
    } else {
        class - 1
    }
}

fn steps(size: u64, step: u64) -> SizeClass {
    size.div_ceil(step) as SizeClass
}
