use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::channels::DeviceCaps;
use crate::ringbuf::{ConsumerCursor, ProducerCursor, RingMap};
use crate::sync::SyncPair;
use crate::{
	sensor_type, ChannelDesc, ConfLookup, CoreInterface, CoreLink, Error, NsCount, PluginCap,
	SelectedChannel, SensorType,
};

/// Pending transition requested by the consumer API, applied by the
/// ingest pipeline at its next push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum AcqOrder {
	#[default]
	None,
	Start,
	Stop,
}

/// Cross-thread acquisition state, guarded by the sync lock and paired
/// with the data-available condition.
#[derive(Debug, Default)]
pub(crate) struct SyncState {
	pub ns_written: NsCount,
	pub ns_read: NsCount,
	/// Samples the blocked reader is currently waiting for, zero when
	/// nobody waits.
	pub nreadwait: usize,
	pub acquiring: bool,
	pub order: AcqOrder,
	/// First error reported by the producer, kept until the device is
	/// closed.
	pub error: Option<Error>,
}

/// State of one device shared between the consumer API and the
/// plugin's producer thread.
pub(crate) struct DeviceCore {
	pub sync: SyncPair<SyncState>,
	/// Capability mailbox filled by `set_cap` during open.
	pub caps: Mutex<Option<DeviceCaps>>,
	/// Selected-channels mailbox filled by a custom
	/// `set_channel_groups`.
	pub selch: Mutex<Vec<SelectedChannel>>,
	/// Compiled transfer configuration and ring storage, replaced as a
	/// unit by every setup.
	pub xfer: Mutex<Option<Arc<RingMap>>>,
	pub pcur: Mutex<ProducerCursor>,
	pub ccur: Mutex<ConsumerCursor>,
	/// Size in bytes of one input sample, as declared by the plugin.
	pub in_samlen: AtomicUsize,
}

impl DeviceCore {
	pub fn new() -> Self {
		Self {
			sync: SyncPair::new(SyncState::default()),
			caps: Mutex::new(None),
			selch: Mutex::new(Vec::new()),
			xfer: Mutex::new(None),
			pcur: Mutex::new(ProducerCursor::default()),
			ccur: Mutex::new(ConsumerCursor::default()),
			in_samlen: AtomicUsize::new(0),
		}
	}
}

impl CoreInterface for DeviceCore {
	fn update_ringbuffer(&self, input: &[u8]) -> Result<(), Error> {
		let in_samlen = self.in_samlen.load(Ordering::Acquire);
		if in_samlen == 0 {
			return Err(Error::BadState);
		}

		let xfer = self.xfer.lock().unwrap().clone();
		let mut pcur = self.pcur.lock().unwrap();
		if pcur.staging.len() != in_samlen {
			pcur.staging.resize(in_samlen, 0);
			pcur.in_offset %= in_samlen;
		}

		// Apply a pending acquisition order.
		let mut input = input;
		let mut stopped = false;
		let (acquiring, ns_read, ns_written) = {
			let mut s = self.sync.lock();
			match s.order {
				AcqOrder::Start => {
					// Realign on the next sample boundary so acquired
					// data never begins with a partial sample;
					// postponed while the boundary lies beyond this
					// block.
					let rest = (in_samlen - pcur.in_offset) % in_samlen;
					if rest <= input.len() {
						s.order = AcqOrder::None;
						input = &input[rest..];
						pcur.in_offset = 0;
					}
				}
				AcqOrder::Stop => {
					s.order = AcqOrder::None;
					s.acquiring = false;
					stopped = true;
				}
				AcqOrder::None => {}
			}
			(s.acquiring, s.ns_read, s.ns_written)
		};
		if stopped {
			// A blocked reader re-checks `acquiring` and settles for
			// what is buffered.
			self.sync.notify_all();
		}

		if acquiring {
			let Some(map) = xfer.as_deref() else {
				return Err(Error::BadState);
			};

			// Refuse the whole update rather than write partially.
			let upper_bound = ns_written + (input.len() / in_samlen + 2);
			if (upper_bound - ns_read).inner() as usize >= map.buff_ns {
				log::warn!("ring buffer overrun, latching no-space");
				self.report_error(Error::NoSpace);
				return Err(Error::NoSpace);
			}

			let ns = map.cast_block(&mut pcur, input, in_samlen);

			let wake = {
				let mut s = self.sync.lock();
				s.ns_written += ns;
				s.nreadwait != 0 && s.ns_read + s.nreadwait <= s.ns_written
			};
			if wake {
				self.sync.notify_one();
			}
			return Ok(());
		}

		// Not acquiring: only keep the stream alignment bookkeeping
		// consistent.
		pcur.in_offset = (pcur.in_offset + input.len()) % in_samlen;
		Ok(())
	}

	fn report_error(&self, error: Error) {
		let had_waiter = {
			let mut s = self.sync.lock();
			if s.error.is_none() {
				log::warn!("device error latched: {error}");
				s.error = Some(error);
			}
			s.nreadwait != 0
		};
		if had_waiter {
			self.sync.notify_one();
		}
	}

	fn set_input_groups(&self, groups: Vec<SelectedChannel>) {
		*self.selch.lock().unwrap() = groups;
	}

	fn set_input_samlen(&self, samlen: usize) {
		self.in_samlen.store(samlen, Ordering::Release);
	}

	fn set_cap(&self, cap: PluginCap) -> Result<(), Error> {
		let caps = DeviceCaps::from_plugin_cap(cap)?;
		log::debug!(
			"device capabilities: {} ({} channels at {} Hz)",
			caps.device_type,
			caps.chmap.len(),
			caps.sampling_freq
		);
		*self.caps.lock().unwrap() = Some(caps);
		Ok(())
	}

	fn get_stype(&self, name: &str) -> Result<SensorType, Error> {
		sensor_type(name)
	}

	fn get_conf_mapping(&self, _name: &str) -> Option<Vec<ChannelDesc>> {
		// Only available while the device is opening, through the open
		// context.
		None
	}
}

/// Core handle a plugin works against while opening a device. It adds
/// the configuration lookup to the device core operations; the
/// producer-side subset survives the open through [`OpenCtx::link`].
pub struct OpenCtx<'a> {
	pub(crate) core: Arc<DeviceCore>,
	pub(crate) conf: &'a dyn ConfLookup,
}

impl OpenCtx<'_> {
	/// Producer-side handle on the core, kept by the plugin for its
	/// acquisition thread.
	#[must_use]
	pub fn link(&self) -> CoreLink {
		self.core.clone()
	}
}

impl CoreInterface for OpenCtx<'_> {
	fn update_ringbuffer(&self, input: &[u8]) -> Result<(), Error> {
		self.core.update_ringbuffer(input)
	}

	fn report_error(&self, error: Error) {
		self.core.report_error(error);
	}

	fn set_input_groups(&self, groups: Vec<SelectedChannel>) {
		self.core.set_input_groups(groups);
	}

	fn set_input_samlen(&self, samlen: usize) {
		self.core.set_input_samlen(samlen);
	}

	fn set_cap(&self, cap: PluginCap) -> Result<(), Error> {
		self.core.set_cap(cap)
	}

	fn get_stype(&self, name: &str) -> Result<SensorType, Error> {
		self.core.get_stype(name)
	}

	fn get_conf_mapping(&self, name: &str) -> Option<Vec<ChannelDesc>> {
		self.conf.mapping(name)
	}
}
