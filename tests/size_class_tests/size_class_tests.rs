//! Tests for size classes
//!
//! These tests verify:
//! - Tier boundaries map to the expected classes
//! - class_of / size_of agree for every length
//! - Monotonicity of classes and footprints
//! - floor_class and is_boundary

use atlasblob::size_class::{class_of, floor_class, is_boundary, round, size_of};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

// =============================================================================
// Tier Boundaries
// =============================================================================

#[test]
fn test_power_of_two_tier() {
    assert_eq!(class_of(1), 1);
    assert_eq!(class_of(2), 2);
    assert_eq!(class_of(3), 3);
    assert_eq!(class_of(4), 3);
    assert_eq!(class_of(5), 4);
    assert_eq!(class_of(512), 10);

    assert_eq!(size_of(1), 1);
    assert_eq!(size_of(5), 16);
    assert_eq!(size_of(10), 512);
}

#[test]
fn test_kib_tier() {
    assert_eq!(class_of(513), 11);
    assert_eq!(class_of(KIB), 11);
    assert_eq!(class_of(KIB + 1), 12);
    assert_eq!(class_of(16 * KIB), 26);

    assert_eq!(size_of(11), KIB);
    assert_eq!(size_of(14), 4 * KIB);
    assert_eq!(size_of(26), 16 * KIB);
}

#[test]
fn test_16kib_tier() {
    assert_eq!(class_of(16 * KIB + 1), 27);
    assert_eq!(size_of(27), 32 * KIB);
    assert_eq!(class_of(100_000), 32);
    assert_eq!(size_of(32), 112 * KIB);
    assert_eq!(class_of(128 * KIB), 33);
}

#[test]
fn test_128kib_tier() {
    assert_eq!(class_of(128 * KIB + 1), 34);
    assert_eq!(size_of(34), 256 * KIB);
    assert_eq!(class_of(4 * MIB), 64);
    assert_eq!(size_of(64), 4 * MIB);
}

#[test]
fn test_mib_tier() {
    assert_eq!(class_of(4 * MIB + 1), 65);
    assert_eq!(size_of(65), 5 * MIB);
    assert_eq!(class_of(MIB * 1024), 64 + 1020);
    assert_eq!(size_of(64 + 1020), MIB * 1024);
}

#[test]
#[should_panic]
fn test_class_of_zero_panics() {
    class_of(0);
}

#[test]
#[should_panic]
fn test_size_of_zero_panics() {
    size_of(0);
}

// =============================================================================
// Round Trip and Monotonicity
// =============================================================================

#[test]
fn test_round_trip_small_sizes() {
    for size in 1..=20_000u64 {
        let class = class_of(size);
        assert!(size_of(class) >= size, "size {} class {}", size, class);
        if class > 1 {
            assert!(size_of(class - 1) < size, "size {} not in smallest class", size);
        }
    }
}

#[test]
fn test_round_trip_across_tiers() {
    let mut size = 1u64;
    while size < 64 * MIB {
        for candidate in [size - 1, size, size + 1] {
            if candidate == 0 {
                continue;
            }
            let class = class_of(candidate);
            assert!(size_of(class) >= candidate);
            assert!(class == 1 || size_of(class - 1) < candidate);
        }
        size = size * 3 / 2 + 1;
    }
}

#[test]
fn test_classes_are_monotonic() {
    for class in 1..=1000 {
        assert!(size_of(class + 1) > size_of(class), "class {}", class);
        assert_eq!(class_of(size_of(class)), class);
    }

    let mut last = 0;
    for size in (1..=8 * MIB).step_by(977) {
        let class = class_of(size);
        assert!(class >= last);
        last = class;
    }
}

// =============================================================================
// Boundaries and Floors
// =============================================================================

#[test]
fn test_round() {
    assert_eq!(round(10), 16);
    assert_eq!(round(20), 32);
    assert_eq!(round(4096), 4096);
    assert_eq!(round(4097), 5 * KIB);
    assert_eq!(round(100_000), 114_688);
}

#[test]
fn test_is_boundary() {
    assert!(!is_boundary(0));
    assert!(is_boundary(1));
    assert!(is_boundary(512));
    assert!(!is_boundary(768));
    assert!(is_boundary(3 * KIB));
    assert!(!is_boundary(1536));
    assert!(is_boundary(48 * KIB));
    assert!(!is_boundary(40 * KIB));
}

#[test]
fn test_floor_class() {
    assert_eq!(floor_class(0), 0);
    assert_eq!(floor_class(1), 1);
    assert_eq!(floor_class(3), 2);
    assert_eq!(floor_class(512), 10);
    assert_eq!(floor_class(1536), 11);
    assert_eq!(floor_class(3 * KIB), 13);

    for size in 1..=50_000u64 {
        let class = floor_class(size);
        assert!(size_of(class) <= size);
        assert!(size_of(class + 1) > size);
    }
}
