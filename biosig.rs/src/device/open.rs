use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use super::core::{DeviceCore, OpenCtx};
use super::Device;
use crate::{ConfLookup, Error, OptValues, PluginInfo, PLUGIN_ABI_VERSION};

static PLUGINS: Mutex<Vec<&'static PluginInfo>> = Mutex::new(Vec::new());

/// Register a plugin descriptor for [`open`] to resolve by name.
/// Registration order doubles as the priority order tried on `"any"`.
///
/// # Panics
/// - if the registry mutex is poisoned.
pub fn register_plugin(info: &'static PluginInfo) {
	PLUGINS.lock().unwrap().push(info);
}

/// Open a device.
///
/// `devspec` names a registered plugin, or `"any"` to take the first
/// registered device that opens.
///
/// # Errors
/// [`Error::NotImplemented`] when no plugin is registered under
/// `devspec` or its ABI tag differs; [`Error::NoDevice`] when `"any"`
/// exhausts the registry; otherwise whatever the plugin open reports
/// (for instance [`Error::Busy`]).
///
/// # Panics
/// - if the registry mutex is poisoned.
pub fn open(devspec: &str, conf: &dyn ConfLookup) -> Result<Device, Error> {
	if devspec == "any" {
		let candidates: Vec<&'static PluginInfo> = PLUGINS.lock().unwrap().clone();
		for info in candidates {
			match open_with(info, conf) {
				Ok(dev) => return Ok(dev),
				Err(err) => {
					log::debug!("candidate device {} failed to open: {err}", info.name);
				}
			}
		}
		return Err(Error::NoDevice);
	}

	let info = PLUGINS
		.lock()
		.unwrap()
		.iter()
		.copied()
		.find(|info| info.name == devspec)
		.ok_or(Error::NotImplemented)?;
	open_with(info, conf)
}

/// Open a device from a plugin descriptor, bypassing the registry.
///
/// # Errors
/// [`Error::NotImplemented`] on an ABI tag mismatch;
/// [`Error::BadState`] when the plugin breaks the open contract by not
/// declaring its capabilities or its input sample size; otherwise
/// whatever the plugin open reports.
pub fn open_with(info: &PluginInfo, conf: &dyn ConfLookup) -> Result<Device, Error> {
	if info.plugin_abi != PLUGIN_ABI_VERSION {
		return Err(Error::NotImplemented);
	}

	let opts = OptValues::collect(info.supported_opts, conf);
	let core = Arc::new(DeviceCore::new());
	let ctx = OpenCtx {
		core: core.clone(),
		conf,
	};
	let mut plugin = (info.open_device)(&ctx, &opts)?;

	// The open contract requires the plugin to have declared its
	// capabilities and input sample size by now.
	let caps = core.caps.lock().unwrap().take();
	let samlen = core.in_samlen.load(Ordering::Acquire);
	let Some(caps) = caps.filter(|_| samlen > 0) else {
		let _ = plugin.close_device();
		return Err(Error::BadState);
	};

	log::debug!("opened {} device ({})", info.name, caps.device_type);
	Ok(Device::new(core, caps, plugin))
}
