use std::ops::{Add, AddAssign};

use derive_more::derive::{Add, AddAssign, Sub, SubAssign};

/// Monotonic count of output samples written to or read from the ring
/// buffer since the last `start`.
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Default,
	Hash,
	Add,
	AddAssign,
	Sub,
	SubAssign,
)]
pub struct NsCount(u64);

impl NsCount {
	#[must_use]
	pub const fn new(count: u64) -> Self {
		Self(count)
	}

	#[must_use]
	pub const fn inner(&self) -> u64 {
		self.0
	}
}

impl From<NsCount> for u64 {
	fn from(value: NsCount) -> Self {
		value.0
	}
}

impl Add<usize> for NsCount {
	type Output = Self;

	fn add(self, rhs: usize) -> Self::Output {
		Self(self.0 + rhs as u64)
	}
}

impl AddAssign<usize> for NsCount {
	fn add_assign(&mut self, rhs: usize) {
		self.0 += rhs as u64;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_counter_arithmetic() {
		let mut written = NsCount::default();
		written += 12;
		written += NsCount::new(3);
		let read = NsCount::new(5);
		assert_eq!(written - read, NsCount::new(10));
		assert!(read + 10 == written);
		assert!(read + 11 > written);
	}
}
