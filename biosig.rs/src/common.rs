use crate::SensorType;

/// Ring buffer capacity, in seconds of acquisition at the device
/// sampling frequency.
pub const BUFFER_SECONDS: usize = 10;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
	#[error("invalid argument")]
	InvalidArgument,
	#[error("not permitted in the current acquisition state")]
	BadState,
	#[error("no usable device found")]
	NoDevice,
	#[error("device busy")]
	Busy,
	#[error("input/output failure")]
	IoFailure,
	#[error("ring buffer full")]
	NoSpace,
	#[error("no such implementation")]
	NotImplemented,
}

/// Capability query selector. The discriminants are the stable wire
/// values of the capability codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Capability {
	SamplingFreq = 0,
	TypeList = 1,
	DeviceType = 2,
	DeviceId = 3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CapValue<'a> {
	SamplingFreq(u32),
	TypeList(&'a [SensorType]),
	DeviceType(&'a str),
	DeviceId(&'a str),
}
