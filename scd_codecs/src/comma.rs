//! Comma-code translation tables.
//!
//! A comma code of length `n` is `n - 1` zero bits followed by a one bit.
//! Small MSB deltas get short codes, alternating positive and negative; two
//! lengths are reserved as sentinels.

/// Largest delta magnitude with its own code.
pub const MAX_TAIL: i32 = 12;

/// Code length of the outlier escape: the true MSB value follows verbatim.
pub const OUTLIE_LEN: u32 = 10;

/// Code length of the end-of-image sentinel.
pub const EOF_LEN: u32 = 27;

/// Bits charged for an outlier when estimating compressed size.
pub const OUTLIER_COST: u32 = OUTLIE_LEN + 16;

/// Code length for each delta in `-MAX_TAIL..=MAX_TAIL`, indexed by `delta + MAX_TAIL`.
const FORWARD: [u8; 25] = [
    26, 24, 22, 20, 18, 16, 14, 12, 9, 7, 5, 3, // -12 ..= -1
    1, //  0
    2, 4, 6, 8, 11, 13, 15, 17, 19, 21, 23, 25, // +1 ..= +12
];

/// What a comma code stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Delta(i32),
    Outlier,
    End,
}

/// Symbol for each code length, indexed by `length - 1` (the zero count).
const INVERSE: [Symbol; 27] = [
    Symbol::Delta(0),
    Symbol::Delta(1),
    Symbol::Delta(-1),
    Symbol::Delta(2),
    Symbol::Delta(-2),
    Symbol::Delta(3),
    Symbol::Delta(-3),
    Symbol::Delta(4),
    Symbol::Delta(-4),
    Symbol::Outlier,
    Symbol::Delta(5),
    Symbol::Delta(-5),
    Symbol::Delta(6),
    Symbol::Delta(-6),
    Symbol::Delta(7),
    Symbol::Delta(-7),
    Symbol::Delta(8),
    Symbol::Delta(-8),
    Symbol::Delta(9),
    Symbol::Delta(-9),
    Symbol::Delta(10),
    Symbol::Delta(-10),
    Symbol::Delta(11),
    Symbol::Delta(-11),
    Symbol::Delta(12),
    Symbol::Delta(-12),
    Symbol::End,
];

/// Code length for `delta`, or `None` if it needs the outlier escape.
#[inline]
pub fn code_len(delta: i32) -> Option<u32> {
    if (-MAX_TAIL..=MAX_TAIL).contains(&delta) {
        Some(FORWARD[(delta + MAX_TAIL) as usize] as u32)
    } else {
        None
    }
}

/// Signed difference `value - base` taken modulo 2^16, so 65535 sits one
/// below 0.
#[inline]
pub fn wrapped_delta(value: u32, base: u32) -> i32 {
    value.wrapping_sub(base) as u16 as i16 as i32
}

/// `base + delta` reduced to the low `bits` bits.
#[inline]
pub fn apply_delta(base: u32, delta: i32, bits: u32) -> u32 {
    base.wrapping_add_signed(delta) & ((1u64 << bits) - 1) as u32
}

/// Symbol for a code of `len` bits.
#[inline]
pub fn symbol(len: u32) -> Option<Symbol> {
    INVERSE.get(len.checked_sub(1)? as usize).copied()
}
