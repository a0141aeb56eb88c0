use std::borrow::Cow;

use crate::{DataType, Error, GVal, SensorType};

pub const LABEL_LEN: usize = 32;
pub const UNIT_LEN: usize = 16;
pub const TRANSDUCER_LEN: usize = 128;
pub const PREFILTERING_LEN: usize = 128;

/// Per-channel immutable metadata as advertised by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalInfo {
	/// Data type the device delivers this channel in.
	pub dtype: DataType,
	pub isint: bool,
	/// Whether the scale factor must be applied during acquisition.
	pub scaled: bool,
	pub scale: f64,
	pub min: GVal,
	pub max: GVal,
	pub unit: Cow<'static, str>,
	pub transducer: Cow<'static, str>,
	pub prefiltering: Cow<'static, str>,
}

impl Default for SignalInfo {
	fn default() -> Self {
		Self {
			dtype: DataType::Float,
			isint: false,
			scaled: false,
			scale: 1.0,
			min: GVal::Double(0.0),
			max: GVal::Double(0.0),
			unit: Cow::Borrowed(""),
			transducer: Cow::Borrowed(""),
			prefiltering: Cow::Borrowed(""),
		}
	}
}

/// One entry of the channel map advertised by a plugin. The signal info
/// may be left out when the enclosing block mapping provides a default.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDesc {
	pub label: Option<Cow<'static, str>>,
	pub stype: SensorType,
	pub si: Option<SignalInfo>,
}

/// A contiguous run of channel descriptors, optionally followed by
/// unlabeled "skipped" channels of one sensor type. Blocks compose into
/// the full device channel map.
#[derive(Debug, Clone)]
pub struct BlockMapping {
	pub chmap: Cow<'static, [ChannelDesc]>,
	pub num_skipped: usize,
	pub skipped_stype: SensorType,
	pub default_info: Option<SignalInfo>,
}

bitflags::bitflags! {
	/// Capability data the plugin keeps ownership of for the whole
	/// device lifetime, which the core therefore does not copy.
	pub struct CapFlags: u32 {
		const NOCP_CHMAP = 1 << 0;
		const NOCP_CHLABEL = 1 << 1;
		const NOCP_DEVTYPE = 1 << 2;
		const NOCP_DEVID = 1 << 3;
	}
}

/// Capability set reported by a plugin through `set_cap`.
#[derive(Debug, Clone)]
pub struct PluginCap {
	pub sampling_freq: u32,
	pub device_type: Cow<'static, str>,
	pub device_id: Cow<'static, str>,
	pub mappings: Vec<BlockMapping>,
	pub flags: CapFlags,
}

/// One channel-group request from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrpConf {
	pub sensortype: SensorType,
	/// Starting index within the channels of `sensortype`.
	pub index: usize,
	pub nch: usize,
	/// Destination array index.
	pub iarray: usize,
	/// Byte offset of this group inside each destination array sample.
	pub arr_offset: usize,
	pub datatype: DataType,
}

/// One compiled slice mapping a contiguous run of device bytes into the
/// ring buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedChannel {
	/// Byte offset of the run within an input sample.
	pub in_offset: usize,
	/// Length of the run in input bytes.
	pub inlen: usize,
	pub typein: DataType,
	pub typeout: DataType,
	pub iarray: usize,
	pub arr_offset: usize,
	/// Scale in the output type, meaningful when `scaled` is set.
	pub sc: GVal,
	pub scaled: bool,
}

/// Canonical capability set kept by the device handle.
#[derive(Debug, Clone)]
pub(crate) struct DeviceCaps {
	pub sampling_freq: u32,
	pub device_type: Cow<'static, str>,
	pub device_id: Cow<'static, str>,
	/// Full channel map with skipped channels expanded and the signal
	/// info resolved for every channel.
	pub chmap: Cow<'static, [ChannelDesc]>,
	/// Sensor types present in the map, ordered by first appearance.
	pub provided_stypes: Vec<SensorType>,
	/// Channel count per entry of `provided_stypes`.
	pub type_nch: Vec<usize>,
}

/// Drop the no-copy flags the capability set is not eligible for: the
/// channel map can only be shared when it is a single block without
/// skipped channels or a block default, and only together with shared
/// labels.
pub(crate) fn normalize_cap_flags(cap: &PluginCap) -> CapFlags {
	let mut flags = cap.flags;

	if flags.contains(CapFlags::NOCP_CHMAP)
		&& (cap.mappings.len() != 1
			|| cap.mappings[0].num_skipped > 0
			|| cap.mappings[0].default_info.is_some())
	{
		flags.remove(CapFlags::NOCP_CHMAP);
	}

	if flags.contains(CapFlags::NOCP_CHMAP) && !flags.contains(CapFlags::NOCP_CHLABEL) {
		flags.remove(CapFlags::NOCP_CHMAP);
	}

	flags
}

impl DeviceCaps {
	/// Build the canonical capability set from what the plugin reported.
	///
	/// # Errors
	/// [`Error::InvalidArgument`] on an empty channel map, a zero
	/// sampling frequency, or a channel left without signal info after
	/// resolving block defaults.
	pub fn from_plugin_cap(cap: PluginCap) -> Result<Self, Error> {
		if cap.sampling_freq == 0 || cap.mappings.is_empty() {
			return Err(Error::InvalidArgument);
		}

		let flags = normalize_cap_flags(&cap);

		let device_type = if flags.contains(CapFlags::NOCP_DEVTYPE) {
			cap.device_type
		} else {
			Cow::Owned(cap.device_type.into_owned())
		};
		let device_id = if flags.contains(CapFlags::NOCP_DEVID) {
			cap.device_id
		} else {
			Cow::Owned(cap.device_id.into_owned())
		};

		let chmap = if flags.contains(CapFlags::NOCP_CHMAP) {
			cap.mappings.into_iter().next().unwrap().chmap
		} else {
			let copy_labels = !flags.contains(CapFlags::NOCP_CHLABEL);
			let mut map = Vec::new();
			for mapping in cap.mappings {
				for ch in mapping.chmap.iter() {
					let mut ch = ch.clone();
					if ch.si.is_none() {
						ch.si = mapping.default_info.clone();
					}
					if copy_labels {
						ch.label = ch.label.map(|l| Cow::Owned(l.into_owned()));
					}
					map.push(ch);
				}
				for _ in 0..mapping.num_skipped {
					map.push(ChannelDesc {
						label: None,
						stype: mapping.skipped_stype,
						si: mapping.default_info.clone(),
					});
				}
			}
			Cow::Owned(map)
		};

		if chmap.is_empty() || chmap.iter().any(|ch| ch.si.is_none()) {
			return Err(Error::InvalidArgument);
		}

		let mut provided_stypes: Vec<SensorType> = Vec::new();
		for ch in chmap.iter() {
			if !provided_stypes.contains(&ch.stype) {
				provided_stypes.push(ch.stype);
			}
		}
		let type_nch = provided_stypes
			.iter()
			.map(|&t| chmap.iter().filter(|ch| ch.stype == t).count())
			.collect();

		Ok(Self {
			sampling_freq: cap.sampling_freq,
			device_type,
			device_id,
			chmap,
			provided_stypes,
			type_nch,
		})
	}

	pub fn sensor_index(&self, stype: SensorType) -> Option<usize> {
		self.provided_stypes.iter().position(|&t| t == stype)
	}

	/// Number of channels of the given sensor type, zero when absent.
	pub fn nch(&self, stype: SensorType) -> usize {
		self.sensor_index(stype)
			.map_or(0, |idx| self.type_nch[idx])
	}
}

/// Channel metadata filled by a channel-info query. String fields are
/// clamped to the fixed length budgets of the wire interface.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReport {
	pub label: String,
	pub isint: bool,
	pub min: GVal,
	pub max: GVal,
	pub unit: String,
	pub transducer: String,
	pub prefiltering: String,
}

impl ChannelReport {
	/// Min and max coerced to `i32`.
	#[must_use]
	pub fn mm_i32(&self) -> (i32, i32) {
		(self.min.as_i32(), self.max.as_i32())
	}

	/// Min and max coerced to `f32`.
	#[must_use]
	pub fn mm_f32(&self) -> (f32, f32) {
		(self.min.as_f32(), self.max.as_f32())
	}

	/// Min and max coerced to `f64`.
	#[must_use]
	pub fn mm_f64(&self) -> (f64, f64) {
		(self.min.as_f64(), self.max.as_f64())
	}

	// The budgets mirror NUL-terminated fixed-size buffers, hence the
	// one spare byte.
	pub(crate) fn clamp_lengths(&mut self) {
		truncate_bytes(&mut self.label, LABEL_LEN - 1);
		truncate_bytes(&mut self.unit, UNIT_LEN - 1);
		truncate_bytes(&mut self.transducer, TRANSDUCER_LEN - 1);
		truncate_bytes(&mut self.prefiltering, PREFILTERING_LEN - 1);
	}
}

fn truncate_bytes(s: &mut String, max: usize) {
	if s.len() <= max {
		return;
	}
	let mut end = max;
	while !s.is_char_boundary(end) {
		end -= 1;
	}
	s.truncate(end);
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_si(dtype: DataType) -> SignalInfo {
		SignalInfo {
			dtype,
			..SignalInfo::default()
		}
	}

	fn eeg_block(nch: usize) -> BlockMapping {
		BlockMapping {
			chmap: Cow::Owned(vec![
				ChannelDesc {
					label: None,
					stype: SensorType::EEG,
					si: Some(test_si(DataType::Float)),
				};
				nch
			]),
			num_skipped: 0,
			skipped_stype: SensorType::UNDEFINED,
			default_info: None,
		}
	}

	fn cap_of(mappings: Vec<BlockMapping>, flags: CapFlags) -> PluginCap {
		PluginCap {
			sampling_freq: 128,
			device_type: Cow::Borrowed("fake device"),
			device_id: Cow::Borrowed("N/A"),
			mappings,
			flags,
		}
	}

	#[test]
	fn test_nocp_chmap_needs_a_single_plain_block() {
		let multi = cap_of(
			vec![eeg_block(2), eeg_block(2)],
			CapFlags::NOCP_CHMAP | CapFlags::NOCP_CHLABEL,
		);
		assert!(!normalize_cap_flags(&multi).contains(CapFlags::NOCP_CHMAP));

		let mut skipped = cap_of(
			vec![eeg_block(2)],
			CapFlags::NOCP_CHMAP | CapFlags::NOCP_CHLABEL,
		);
		skipped.mappings[0].num_skipped = 1;
		skipped.mappings[0].default_info = Some(test_si(DataType::Float));
		assert!(!normalize_cap_flags(&skipped).contains(CapFlags::NOCP_CHMAP));

		let plain = cap_of(
			vec![eeg_block(2)],
			CapFlags::NOCP_CHMAP | CapFlags::NOCP_CHLABEL,
		);
		assert!(normalize_cap_flags(&plain).contains(CapFlags::NOCP_CHMAP));
	}

	#[test]
	fn test_nocp_chmap_requires_nocp_chlabel() {
		let cap = cap_of(vec![eeg_block(2)], CapFlags::NOCP_CHMAP);
		let flags = normalize_cap_flags(&cap);
		assert!(!flags.contains(CapFlags::NOCP_CHMAP));

		// Device string flags are independent of the label flag.
		let cap = cap_of(vec![eeg_block(2)], CapFlags::NOCP_DEVTYPE);
		assert_eq!(normalize_cap_flags(&cap), CapFlags::NOCP_DEVTYPE);
	}

	#[test]
	fn test_skipped_channels_and_defaults_are_expanded() {
		let mut block = BlockMapping {
			chmap: Cow::Owned(vec![ChannelDesc {
				label: Some(Cow::Borrowed("C3")),
				stype: SensorType::EEG,
				si: None,
			}]),
			num_skipped: 2,
			skipped_stype: SensorType::TRIGGER,
			default_info: Some(test_si(DataType::Int32)),
		};
		block.default_info.as_mut().unwrap().isint = true;

		let caps = DeviceCaps::from_plugin_cap(cap_of(vec![block], CapFlags::empty())).unwrap();
		assert_eq!(caps.chmap.len(), 3);
		assert_eq!(caps.chmap[0].label.as_deref(), Some("C3"));
		assert!(caps.chmap[0].si.as_ref().unwrap().isint);
		assert_eq!(caps.chmap[1].stype, SensorType::TRIGGER);
		assert_eq!(caps.chmap[1].label, None);
		assert_eq!(caps.provided_stypes, vec![SensorType::EEG, SensorType::TRIGGER]);
		assert_eq!(caps.type_nch, vec![1, 2]);
		assert_eq!(caps.nch(SensorType::TRIGGER), 2);
		assert_eq!(caps.nch(SensorType::UNDEFINED), 0);
	}

	#[test]
	fn test_labels_are_copied_unless_shared() {
		let mut block = eeg_block(1);
		block.chmap.to_mut()[0].label = Some(Cow::Borrowed("static label"));

		let copied =
			DeviceCaps::from_plugin_cap(cap_of(vec![block.clone()], CapFlags::empty())).unwrap();
		assert!(matches!(
			copied.chmap[0].label,
			Some(Cow::Owned(_))
		));

		let shared =
			DeviceCaps::from_plugin_cap(cap_of(vec![block], CapFlags::NOCP_CHLABEL)).unwrap();
		assert!(matches!(
			shared.chmap[0].label,
			Some(Cow::Borrowed("static label"))
		));
	}

	#[test]
	fn test_unresolved_signal_info_is_rejected() {
		let block = BlockMapping {
			chmap: Cow::Owned(vec![ChannelDesc {
				label: None,
				stype: SensorType::EEG,
				si: None,
			}]),
			num_skipped: 0,
			skipped_stype: SensorType::UNDEFINED,
			default_info: None,
		};
		assert_eq!(
			DeviceCaps::from_plugin_cap(cap_of(vec![block], CapFlags::empty())).err(),
			Some(Error::InvalidArgument)
		);
	}

	#[test]
	fn test_report_length_budgets() {
		let mut report = ChannelReport {
			label: "x".repeat(100),
			isint: false,
			min: GVal::Double(-1.0),
			max: GVal::Double(1.0),
			unit: "microvolt-per-bit".into(),
			transducer: "t".repeat(200),
			prefiltering: "HP:0.1Hz".into(),
		};
		report.clamp_lengths();
		assert_eq!(report.label.len(), LABEL_LEN - 1);
		assert_eq!(report.unit.len(), UNIT_LEN - 1);
		assert_eq!(report.transducer.len(), TRANSDUCER_LEN - 1);
		assert_eq!(report.prefiltering, "HP:0.1Hz");
	}
}
