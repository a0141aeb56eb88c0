mod core;
mod open;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

pub use self::core::OpenCtx;
pub use self::open::{open, open_with, register_plugin};

use self::core::{AcqOrder, DeviceCore};
use crate::channels::DeviceCaps;
use crate::ringbuf::RingMap;
use crate::split::{default_chinfo, split_groups};
use crate::{
	CapValue, Capability, ChannelReport, DevicePlugin, Error, GrpConf, NsCount, SensorType,
	BUFFER_SECONDS,
};

struct ApiState {
	/// Emptied once the device has been shut down.
	plugin: Option<Box<dyn DevicePlugin>>,
}

/// An open acquisition device.
///
/// One consumer thread at a time may use the blocking read side;
/// configuration and introspection calls are serialized internally and
/// may come from any thread.
pub struct Device {
	core: Arc<DeviceCore>,
	caps: DeviceCaps,
	api: Mutex<ApiState>,
}

impl Device {
	pub(crate) fn new(
		core: Arc<DeviceCore>,
		caps: DeviceCaps,
		plugin: Box<dyn DevicePlugin>,
	) -> Self {
		Self {
			core,
			caps,
			api: Mutex::new(ApiState {
				plugin: Some(plugin),
			}),
		}
	}

	#[must_use]
	pub fn sampling_freq(&self) -> u32 {
		self.caps.sampling_freq
	}

	/// Sensor types present on the device, ordered by first appearance
	/// in the channel map.
	#[must_use]
	pub fn sensor_types(&self) -> &[SensorType] {
		&self.caps.provided_stypes
	}

	#[must_use]
	pub fn device_type(&self) -> &str {
		&self.caps.device_type
	}

	#[must_use]
	pub fn device_id(&self) -> &str {
		&self.caps.device_id
	}

	#[must_use]
	pub fn get_cap(&self, cap: Capability) -> CapValue<'_> {
		match cap {
			Capability::SamplingFreq => CapValue::SamplingFreq(self.sampling_freq()),
			Capability::TypeList => CapValue::TypeList(self.sensor_types()),
			Capability::DeviceType => CapValue::DeviceType(self.device_type()),
			Capability::DeviceId => CapValue::DeviceId(self.device_id()),
		}
	}

	/// Number of channels of the given sensor type, zero when the type
	/// is absent from the device.
	#[must_use]
	pub fn get_numch(&self, stype: SensorType) -> usize {
		self.caps.nch(stype)
	}

	/// Metadata of the `index`-th channel of the given sensor type.
	///
	/// # Errors
	/// [`Error::InvalidArgument`] when the device has no such channel.
	///
	/// # Panics
	/// - if an internal mutex is poisoned.
	pub fn channel_info(
		&self,
		stype: SensorType,
		index: usize,
	) -> Result<ChannelReport, Error> {
		if index >= self.caps.nch(stype) {
			return Err(Error::InvalidArgument);
		}

		let mut report = default_chinfo(&self.caps.chmap, stype, index)?;
		{
			let api = self.api.lock().unwrap();
			if let Some(plugin) = api.plugin.as_ref() {
				plugin.fill_chinfo(stype, index, &mut report);
			}
		}
		report.clamp_lengths();
		Ok(report)
	}

	/// Configure the transfer of acquired samples into the caller's
	/// arrays.
	///
	/// `strides` gives the size in bytes of one sample slot of each
	/// destination array; each group request places a contiguous run
	/// of converted channels at its byte offset inside one of those
	/// slots. Repeated setups replace the previous configuration,
	/// including after a start/stop cycle.
	///
	/// # Errors
	/// [`Error::BadState`] while the acquisition is running;
	/// [`Error::InvalidArgument`] for groups that do not match the
	/// device channel map or do not fit their array stride.
	///
	/// # Panics
	/// - if an internal mutex is poisoned.
	pub fn acq_setup(&self, strides: &[usize], grps: &[GrpConf]) -> Result<(), Error> {
		let mut api = self.api.lock().unwrap();
		if self.core.sync.with_lock(|s| s.acquiring) {
			return Err(Error::BadState);
		}

		for grp in grps {
			if grp.nch == 0 {
				continue;
			}
			let nch = self.caps.nch(grp.sensortype);
			if nch == 0 || grp.index + grp.nch > nch {
				return Err(Error::InvalidArgument);
			}
		}

		let plugin = api.plugin.as_mut().ok_or(Error::BadState)?;
		let selch = if plugin.set_channel_groups(grps)? {
			std::mem::take(&mut *self.core.selch.lock().unwrap())
		} else {
			split_groups(&self.caps.chmap, grps)?
		};

		let in_samlen = self.core.in_samlen.load(Ordering::Acquire);
		if in_samlen == 0 {
			return Err(Error::BadState);
		}

		let buff_ns = BUFFER_SECONDS * self.caps.sampling_freq as usize;
		let map = Arc::new(RingMap::compile(&selch, strides.to_vec(), buff_ns)?);

		*self.core.xfer.lock().unwrap() = Some(map);
		self.core.pcur.lock().unwrap().rewind(in_samlen);
		self.core.ccur.lock().unwrap().last_read = 0;
		// Leftovers of a previous run must not be read back from the
		// fresh ring.
		self.core.sync.with_lock_mut(|s| {
			s.ns_read = NsCount::default();
			s.ns_written = NsCount::default();
		});
		Ok(())
	}

	/// Arm the acquisition: reset the sample counters, notify the
	/// plugin and order the ingest pipeline to start at the next
	/// input-sample boundary.
	///
	/// # Errors
	/// [`Error::BadState`] when already running or never set up.
	///
	/// # Panics
	/// - if an internal mutex is poisoned.
	pub fn start(&self) -> Result<(), Error> {
		let mut api = self.api.lock().unwrap();
		if self.core.sync.with_lock(|s| s.acquiring) {
			return Err(Error::BadState);
		}
		if self.core.xfer.lock().unwrap().is_none() {
			return Err(Error::BadState);
		}

		let plugin = api.plugin.as_mut().ok_or(Error::BadState)?;
		plugin.start_acq()?;

		self.core.sync.with_lock_mut(|s| {
			s.ns_read = NsCount::default();
			s.ns_written = NsCount::default();
			s.order = AcqOrder::Start;
			s.acquiring = true;
		});
		log::debug!("acquisition started");
		Ok(())
	}

	/// Request the acquisition to stop. The ingest pipeline honors the
	/// order at its next push, so already-buffered samples stay
	/// readable.
	///
	/// # Errors
	/// [`Error::BadState`] when not running.
	///
	/// # Panics
	/// - if an internal mutex is poisoned.
	pub fn stop(&self) -> Result<(), Error> {
		let mut api = self.api.lock().unwrap();
		if !self.core.sync.with_lock(|s| s.acquiring) {
			return Err(Error::BadState);
		}

		self.core.sync.with_lock_mut(|s| s.order = AcqOrder::Stop);
		let plugin = api.plugin.as_mut().ok_or(Error::BadState)?;
		plugin.stop_acq()?;
		log::debug!("acquisition stop requested");
		Ok(())
	}

	/// Read `ns` samples into the caller's arrays, blocking until they
	/// are available, the acquisition ends, or an error is latched.
	///
	/// Returns the number of samples delivered, which is smaller than
	/// `ns` (possibly zero) only when the acquisition ended. A zero
	/// request never blocks.
	///
	/// # Errors
	/// The latched producer error once no buffered sample remains;
	/// [`Error::BadState`] before any setup;
	/// [`Error::InvalidArgument`] when the arrays do not match the
	/// setup or are too short for `ns` samples.
	///
	/// # Panics
	/// - if an internal mutex is poisoned.
	pub fn get_data(&self, ns: usize, arrays: &mut [&mut [u8]]) -> Result<usize, Error> {
		let map = self.core.xfer.lock().unwrap().clone().ok_or(Error::BadState)?;
		if arrays.len() != map.narr() {
			return Err(Error::InvalidArgument);
		}

		// Wait until enough data is available or the acquisition ends,
		// settling for what is buffered in the latter case.
		let (avail, error) = {
			let mut s = self.core.sync.lock();
			s.nreadwait = ns;
			let mut s = self.core.sync.wait_while(s, |s| {
				s.error.is_none() && s.acquiring && s.ns_read + ns > s.ns_written
			});
			let error = s.error;
			let mut avail = ns;
			if (error.is_some() || !s.acquiring) && s.ns_read + ns > s.ns_written {
				avail = (s.ns_written - s.ns_read).inner() as usize;
			}
			s.nreadwait = 0;
			(avail, error)
		};

		if avail == 0 {
			if let Some(error) = error {
				return Err(error);
			}
		}

		{
			let mut ccur = self.core.ccur.lock().unwrap();
			map.copy_out(&mut ccur, avail, arrays)?;
		}
		self.core.sync.with_lock_mut(|s| s.ns_read += avail);
		Ok(avail)
	}

	/// Number of samples ready to be read without blocking.
	///
	/// # Errors
	/// The latched producer error when nothing is buffered.
	///
	/// # Panics
	/// - if an internal mutex is poisoned.
	pub fn get_available(&self) -> Result<usize, Error> {
		let (avail, error) = self
			.core
			.sync
			.with_lock(|s| ((s.ns_written - s.ns_read).inner() as usize, s.error));

		if avail == 0 {
			if let Some(error) = error {
				return Err(error);
			}
		}
		Ok(avail)
	}

	/// Close the device, stopping the acquisition first when it is
	/// still running.
	///
	/// # Errors
	/// Whatever the plugin close reports. The device is gone either
	/// way; dropping the handle closes it silently.
	pub fn close(mut self) -> Result<(), Error> {
		self.shutdown()
	}

	fn shutdown(&mut self) -> Result<(), Error> {
		let plugin = self.api.lock().unwrap().plugin.take();
		let Some(mut plugin) = plugin else {
			return Ok(());
		};

		if self.core.sync.with_lock(|s| s.acquiring) {
			self.core.sync.with_lock_mut(|s| s.order = AcqOrder::Stop);
			if let Err(err) = plugin.stop_acq() {
				log::warn!("stopping acquisition on close failed: {err}");
			}
		}
		plugin.close_device()
	}
}

impl Drop for Device {
	fn drop(&mut self) {
		let _ = self.shutdown();
	}
}
