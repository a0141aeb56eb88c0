use crate::{
	ChannelDesc, ChannelReport, Error, GrpConf, OptName, OptValues, PluginCap, SelectedChannel,
	SensorType,
};

/// Version tag of the contract between the core and device plugins.
/// [`crate::open`] refuses descriptors carrying any other value.
pub const PLUGIN_ABI_VERSION: u32 = 5;

/// Producer-side handle on the core, cloned into the plugin's
/// acquisition thread.
pub type CoreLink = std::sync::Arc<dyn CoreInterface + Send + Sync>;

/// Core operations exposed to device plugins.
///
/// Plugins hold the interface as a trait object and stay polymorphic
/// over it, so a test harness can substitute an in-memory fake for the
/// real device core.
pub trait CoreInterface {
	/// Push a block of raw device bytes into the acquisition pipeline.
	///
	/// Called from the plugin's producer thread whenever data is
	/// available. The block may start and end anywhere relative to
	/// input-sample boundaries.
	///
	/// # Errors
	/// [`Error::NoSpace`] when the update would overrun the ring
	/// buffer (the error is also latched); [`Error::BadState`] when
	/// the input sample size was never declared.
	fn update_ringbuffer(&self, input: &[u8]) -> Result<(), Error>;

	/// Latch `error` as the acquisition failure reported to the
	/// consumer, waking a blocked reader. Only the first reported
	/// error is kept.
	fn report_error(&self, error: Error);

	/// Install the selected-channels list compiled by a custom
	/// `set_channel_groups`. Must be called before that method
	/// returns.
	fn set_input_groups(&self, groups: Vec<SelectedChannel>);

	/// Declare the size in bytes of one input sample as supplied to
	/// [`CoreInterface::update_ringbuffer`]. Must be called during
	/// open, and again from `set_channel_groups` whenever the layout
	/// depends on the selection.
	fn set_input_samlen(&self, samlen: usize);

	/// Declare the device capabilities. Must be called during open.
	///
	/// # Errors
	/// [`Error::InvalidArgument`] on an empty channel map, a zero
	/// sampling frequency, or channels without resolvable signal info.
	fn set_cap(&self, cap: PluginCap) -> Result<(), Error>;

	/// Sensor-type registry lookup, see [`crate::sensor_type`].
	///
	/// # Errors
	/// [`Error::InvalidArgument`] for an empty name.
	fn get_stype(&self, name: &str) -> Result<SensorType, Error>;

	/// Channel map registered under `name` in the configuration, when
	/// opening against a configuration that provides one.
	fn get_conf_mapping(&self, name: &str) -> Option<Vec<ChannelDesc>>;
}

/// Per-device plugin state and operations.
///
/// All operations except [`DevicePlugin::close_device`] have default
/// implementations matching the behavior of a plugin that does not
/// provide them.
pub trait DevicePlugin: Send {
	/// Close the device and release every associated resource,
	/// including joining the producer thread.
	///
	/// # Errors
	/// Any error the device reports while shutting down.
	fn close_device(&mut self) -> Result<(), Error>;

	/// Compile the caller's group requests in place of the core's
	/// channel splitter.
	///
	/// Return `Ok(false)` to let the core split the groups. An
	/// implementation returning `Ok(true)` must have installed the
	/// compiled list through [`CoreInterface::set_input_groups`] and
	/// declared the input sample size before returning.
	///
	/// Never called while the acquisition is running.
	///
	/// # Errors
	/// [`Error::InvalidArgument`] for requests the device cannot map.
	fn set_channel_groups(&mut self, _grps: &[GrpConf]) -> Result<bool, Error> {
		Ok(false)
	}

	/// Called when the acquisition is about to start.
	///
	/// # Errors
	/// Any error that prevents the device from starting.
	fn start_acq(&mut self) -> Result<(), Error> {
		Ok(())
	}

	/// Called when the acquisition is about to stop.
	///
	/// # Errors
	/// Any error the device reports while stopping.
	fn stop_acq(&mut self) -> Result<(), Error> {
		Ok(())
	}

	/// Refine the channel report prepared by the core's default
	/// filler.
	fn fill_chinfo(&self, _stype: SensorType, _ich: usize, _report: &mut ChannelReport) {}
}

/// Entry point instantiating a plugin device.
///
/// The plugin must call [`CoreInterface::set_cap`] and
/// [`CoreInterface::set_input_samlen`] on the given context before
/// returning; the core verifies both. A producer thread keeps a clone
/// of [`crate::OpenCtx::link`] to push data with.
pub type OpenFn =
	fn(ctx: &crate::OpenCtx<'_>, opts: &OptValues) -> Result<Box<dyn DevicePlugin>, Error>;

/// Static descriptor a plugin registers with the core.
pub struct PluginInfo {
	/// Must equal [`PLUGIN_ABI_VERSION`].
	pub plugin_abi: u32,
	/// Device name matched against the open spec.
	pub name: &'static str,
	pub open_device: OpenFn,
	pub supported_opts: &'static [OptName],
}
