//! Alignment arithmetic shared by the reservation and both allocators.

/// Returns `true` if `value` is a non-zero power of two.
#[inline]
pub const fn is_power_of_two(value: usize) -> bool {
    value != 0 && value & (value - 1) == 0
}

/// Rounds `value` up to `align`, which must be a power of two.
///
/// Returns `None` on overflow.
#[inline]
pub const fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(is_power_of_two(align));
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Rounds `value` down to `align`, which must be a power of two.
#[inline]
pub const fn align_down(value: usize, align: usize) -> usize {
    debug_assert!(is_power_of_two(align));
    value & !(align - 1)
}

/// Rounds `value` up to the nearest multiple of `multiple`, which need not be
/// a power of two. Returns `None` on overflow.
#[inline]
pub const fn round_up_multiple(value: usize, multiple: usize) -> Option<usize> {
    if multiple == 0 {
        return Some(value);
    }
    let rem = value % multiple;
    if rem == 0 {
        Some(value)
    } else {
        value.checked_add(multiple - rem)
    }
}
