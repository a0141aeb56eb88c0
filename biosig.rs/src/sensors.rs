use std::sync::{Mutex, OnceLock};

use derive_more::derive::{From, Into};

use crate::Error;

/// Integer tag naming a class of signal (eeg, trigger, ...), used by
/// callers to request channels without knowing absolute indices.
///
/// Tags are assigned by the process-wide registry and stay stable for
/// the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, From, Into)]
pub struct SensorType(i32);

impl SensorType {
	pub const EEG: SensorType = SensorType(0);
	pub const TRIGGER: SensorType = SensorType(1);
	pub const UNDEFINED: SensorType = SensorType(2);

	#[must_use]
	pub const fn id(self) -> i32 {
		self.0
	}
}

// Registered names are interned for the lifetime of the process, like
// the ids that point at them.
fn registry() -> &'static Mutex<Vec<&'static str>> {
	static REGISTRY: OnceLock<Mutex<Vec<&'static str>>> = OnceLock::new();
	REGISTRY.get_or_init(|| Mutex::new(vec!["eeg", "trigger", "undefined"]))
}

/// Get the sensor type registered under `name`, registering it with the
/// next free id if it is unknown.
///
/// # Errors
/// [`Error::InvalidArgument`] if `name` is empty.
///
/// # Panics
/// - if the registry mutex is poisoned.
pub fn sensor_type(name: &str) -> Result<SensorType, Error> {
	if name.is_empty() {
		return Err(Error::InvalidArgument);
	}

	let mut names = registry().lock().unwrap();
	if let Some(pos) = names.iter().position(|&n| n == name) {
		return Ok(SensorType(pos as i32));
	}

	names.push(Box::leak(name.to_owned().into_boxed_str()));
	Ok(SensorType(names.len() as i32 - 1))
}

/// Reverse lookup of a sensor type id.
///
/// # Errors
/// [`Error::InvalidArgument`] if no sensor is registered under `stype`.
///
/// # Panics
/// - if the registry mutex is poisoned.
pub fn sensor_name(stype: SensorType) -> Result<&'static str, Error> {
	let idx = usize::try_from(stype.0).map_err(|_| Error::InvalidArgument)?;
	registry()
		.lock()
		.unwrap()
		.get(idx)
		.copied()
		.ok_or(Error::InvalidArgument)
}
