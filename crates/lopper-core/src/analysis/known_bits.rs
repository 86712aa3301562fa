//! Conservative bit-level value tracking.
//!
//! Walks a value's def chain a few hops and computes which bits are
//! provably zero and provably one. Used to prune switch cases the
//! scrutinee can never equal.

use crate::ir::{Constant, Function, Op, ValueId};

const MAX_DEPTH: u32 = 6;

/// Bits known about a value. A bit set in `zeros` is provably 0, in `ones`
/// provably 1. The two sets never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownBits {
    pub zeros: u64,
    pub ones: u64,
}

/// All-ones mask for a width in 1..=64.
pub fn width_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

impl KnownBits {
    pub fn unknown() -> Self {
        Self { zeros: 0, ones: 0 }
    }

    pub fn constant(value: u64, width: u32) -> Self {
        let mask = width_mask(width);
        Self {
            zeros: !value & mask,
            ones: value & mask,
        }
    }

    /// Number of bits within `width` that are not pinned either way.
    pub fn unknown_bit_count(&self, width: u32) -> u32 {
        let mask = width_mask(width);
        (mask & !(self.zeros | self.ones)).count_ones()
    }

    /// Whether the value could equal `candidate` (within `width` bits).
    pub fn permits(&self, candidate: u64, width: u32) -> bool {
        let mask = width_mask(width);
        let c = candidate & mask;
        (c & self.zeros) == 0 && (!c & mask & self.ones) == 0
    }
}

/// Compute known bits of `value` at `width`, following the def chain.
pub fn known_bits(func: &Function, value: ValueId, width: u32) -> KnownBits {
    known_bits_rec(func, value, width, MAX_DEPTH)
}

fn known_bits_rec(func: &Function, value: ValueId, width: u32, depth: u32) -> KnownBits {
    if depth == 0 {
        return KnownBits::unknown();
    }
    let mask = width_mask(width);
    let op = match func.def_of(value) {
        Some(inst) => &inst.op,
        None => return KnownBits::unknown(),
    };
    match op {
        Op::Const(Constant::Int(v)) => KnownBits::constant(*v as u64, width),
        Op::Const(Constant::Bool(b)) => KnownBits::constant(*b as u64, width),
        Op::Copy(inner) => known_bits_rec(func, *inner, width, depth - 1),
        Op::Cast(inner, _) => {
            // Narrowing keeps low bits; widening an unsigned source pins
            // the new high bits to zero.
            let src_width = func
                .value_types
                .get(*inner)
                .and_then(|t| t.bit_width())
                .unwrap_or(64);
            let inner_bits = known_bits_rec(func, *inner, src_width.min(width), depth - 1);
            let mut out = KnownBits {
                zeros: inner_bits.zeros & mask,
                ones: inner_bits.ones & mask,
            };
            if src_width < width {
                let src_unsigned = func
                    .value_types
                    .get(*inner)
                    .map(|t| t.is_unsigned() || matches!(t, crate::ir::Type::Bool))
                    .unwrap_or(false);
                if src_unsigned {
                    out.zeros |= mask & !width_mask(src_width);
                }
            }
            out
        }
        Op::BitAnd(a, b) => {
            let ka = known_bits_rec(func, *a, width, depth - 1);
            let kb = known_bits_rec(func, *b, width, depth - 1);
            KnownBits {
                zeros: (ka.zeros | kb.zeros) & mask,
                ones: ka.ones & kb.ones & mask,
            }
        }
        Op::BitOr(a, b) => {
            let ka = known_bits_rec(func, *a, width, depth - 1);
            let kb = known_bits_rec(func, *b, width, depth - 1);
            KnownBits {
                zeros: ka.zeros & kb.zeros & mask,
                ones: (ka.ones | kb.ones) & mask,
            }
        }
        Op::BitXor(a, b) => {
            let ka = known_bits_rec(func, *a, width, depth - 1);
            let kb = known_bits_rec(func, *b, width, depth - 1);
            let known = (ka.zeros | ka.ones) & (kb.zeros | kb.ones);
            let val = (ka.ones ^ kb.ones) & known;
            KnownBits {
                zeros: known & !val & mask,
                ones: val & mask,
            }
        }
        Op::Shl(a, amt) => match func.constant_of(*amt).and_then(|c| c.as_int()) {
            Some(s) if (0..64).contains(&s) => {
                let ka = known_bits_rec(func, *a, width, depth - 1);
                KnownBits {
                    zeros: ((ka.zeros << s) | width_mask(s as u32)) & mask,
                    ones: (ka.ones << s) & mask,
                }
            }
            _ => KnownBits::unknown(),
        },
        Op::Shr(a, amt) => match func.constant_of(*amt).and_then(|c| c.as_int()) {
            Some(s) if (0..64).contains(&s) => {
                let ka = known_bits_rec(func, *a, width, depth - 1);
                let high = mask & !(mask >> s);
                KnownBits {
                    zeros: ((ka.zeros & mask) >> s | high) & mask,
                    ones: ((ka.ones & mask) >> s) & mask,
                }
            }
            _ => KnownBits::unknown(),
        },
        // Comparisons produce a single bit.
        Op::Cmp(_, _, _) | Op::Not(_) if width > 1 => KnownBits {
            zeros: mask & !1,
            ones: 0,
        },
        _ => KnownBits::unknown(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CmpKind, FunctionBuilder, FunctionSig, Type};

    fn sig(params: &[Type]) -> FunctionSig {
        FunctionSig {
            params: params.to_vec(),
            return_ty: Type::Void,
        }
    }

    /// `x & 0b110` pins every bit outside the mask to zero.
    #[test]
    fn and_mask_pins_zeros() {
        let mut b = FunctionBuilder::new("f", sig(&[Type::UInt(8)]));
        let x = b.param(0);
        let mask = b.const_int(6, Type::UInt(8));
        let masked = b.bit_and(x, mask, Type::UInt(8));
        b.ret(None);
        let func = b.finish();

        let bits = known_bits(&func, masked, 8);
        assert_eq!(bits.zeros, 0xFF & !6);
        assert_eq!(bits.ones, 0);
        assert!(bits.permits(4, 8));
        assert!(!bits.permits(1, 8));
        assert_eq!(bits.unknown_bit_count(8), 2);
    }

    /// `x | 1` pins the low bit to one.
    #[test]
    fn or_pins_ones() {
        let mut b = FunctionBuilder::new("f", sig(&[Type::UInt(8)]));
        let x = b.param(0);
        let one = b.const_int(1, Type::UInt(8));
        let v = b.bit_or(x, one, Type::UInt(8));
        b.ret(None);
        let func = b.finish();

        let bits = known_bits(&func, v, 8);
        assert_eq!(bits.ones, 1);
        assert!(!bits.permits(4, 8));
        assert!(bits.permits(5, 8));
    }

    /// Shifting left by a constant clears the vacated low bits.
    #[test]
    fn shl_clears_low_bits() {
        let mut b = FunctionBuilder::new("f", sig(&[Type::UInt(8)]));
        let x = b.param(0);
        let two = b.const_int(2, Type::UInt(8));
        let v = b.shl(x, two, Type::UInt(8));
        b.ret(None);
        let func = b.finish();

        let bits = known_bits(&func, v, 8);
        assert_eq!(bits.zeros & 0b11, 0b11);
        assert!(!bits.permits(3, 8));
        assert!(bits.permits(4, 8));
    }

    /// A boolean-producing compare has every bit above bit 0 known zero.
    #[test]
    fn compare_is_single_bit() {
        let mut b = FunctionBuilder::new("f", sig(&[Type::UInt(8)]));
        let x = b.param(0);
        let zero = b.const_int(0, Type::UInt(8));
        let c = b.cmp(CmpKind::Eq, x, zero);
        b.ret(None);
        let func = b.finish();

        let bits = known_bits(&func, c, 8);
        assert_eq!(bits.unknown_bit_count(8), 1);
        assert!(bits.permits(0, 8));
        assert!(bits.permits(1, 8));
        assert!(!bits.permits(2, 8));
    }
}
