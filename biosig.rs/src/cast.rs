use std::mem::size_of;

use crate::{DataType, GVal};

/// Converts a contiguous run of values from the input format to the
/// output format, optionally scaling by a value of the output type.
///
/// `src.len()` must be a positive multiple of the input type size and
/// `dst.len()` the matching multiple of the output type size. Float to
/// integer conversions truncate toward zero; no saturation beyond the
/// native `as` semantics is performed, proper scale values must keep
/// results in range.
pub(crate) type CastFn = fn(&mut [u8], &[u8], GVal);

macro_rules! define_cast_fn {
	($name:ident, $src:ty, $dst:ty, $coerce:ident) => {
		fn $name(dst: &mut [u8], src: &[u8], sc: GVal) {
			let scale = sc.$coerce();
			for (d, s) in dst
				.chunks_exact_mut(size_of::<$dst>())
				.zip(src.chunks_exact(size_of::<$src>()))
			{
				let v = (<$src>::from_ne_bytes(s.try_into().unwrap()) as $dst) * scale;
				d.copy_from_slice(&v.to_ne_bytes());
			}
		}
	};
}

macro_rules! define_castnosc_fn {
	($name:ident, $src:ty, $dst:ty) => {
		fn $name(dst: &mut [u8], src: &[u8], _sc: GVal) {
			for (d, s) in dst
				.chunks_exact_mut(size_of::<$dst>())
				.zip(src.chunks_exact(size_of::<$src>()))
			{
				let v = <$src>::from_ne_bytes(s.try_into().unwrap()) as $dst;
				d.copy_from_slice(&v.to_ne_bytes());
			}
		}
	};
}

// Same-type unscaled conversions degrade to a plain byte copy.
fn identity(dst: &mut [u8], src: &[u8], _sc: GVal) {
	dst.copy_from_slice(src);
}

define_cast_fn!(cast_i32_i32, i32, i32, as_i32);
define_cast_fn!(cast_i32_f32, i32, f32, as_f32);
define_cast_fn!(cast_i32_f64, i32, f64, as_f64);
define_cast_fn!(cast_f32_i32, f32, i32, as_i32);
define_cast_fn!(cast_f32_f32, f32, f32, as_f32);
define_cast_fn!(cast_f32_f64, f32, f64, as_f64);
define_cast_fn!(cast_f64_i32, f64, i32, as_i32);
define_cast_fn!(cast_f64_f32, f64, f32, as_f32);
define_cast_fn!(cast_f64_f64, f64, f64, as_f64);

define_castnosc_fn!(castnosc_i32_f32, i32, f32);
define_castnosc_fn!(castnosc_i32_f64, i32, f64);
define_castnosc_fn!(castnosc_f32_i32, f32, i32);
define_castnosc_fn!(castnosc_f32_f64, f32, f64);
define_castnosc_fn!(castnosc_f64_i32, f64, i32);
define_castnosc_fn!(castnosc_f64_f32, f64, f32);

#[rustfmt::skip]
static CONVTABLE: [[[CastFn; DataType::COUNT]; 2]; DataType::COUNT] = [
	[
		[identity,         castnosc_i32_f32, castnosc_i32_f64],
		[cast_i32_i32,     cast_i32_f32,     cast_i32_f64],
	],
	[
		[castnosc_f32_i32, identity,         castnosc_f32_f64],
		[cast_f32_i32,     cast_f32_f32,     cast_f32_f64],
	],
	[
		[castnosc_f64_i32, castnosc_f64_f32, identity],
		[cast_f64_i32,     cast_f64_f32,     cast_f64_f64],
	],
];

pub(crate) fn cast_fn(itype: DataType, otype: DataType, scaled: bool) -> CastFn {
	CONVTABLE[itype.index()][usize::from(scaled)][otype.index()]
}
