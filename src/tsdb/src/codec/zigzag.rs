/// zig_zag_encode maps signed integers onto unsigned ones so that values of small magnitude stay
/// small: [0, -1, 1, -2] becomes [0, 1, 2, 3].
#[inline]
pub fn zig_zag_encode(x: i64) -> u64 {
    ((x << 1) ^ (x >> 63)) as u64
}

/// zig_zag_decode reverses `zig_zag_encode`.
#[inline]
pub fn zig_zag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}
