use crate::{
	sensor_name, ChannelDesc, ChannelReport, Error, GVal, GrpConf, SelectedChannel, SensorType,
};

/// Position in the channel map of the `tind`-th channel of type
/// `stype`, scanning from `from`.
fn next_chindex(
	chmap: &[ChannelDesc],
	stype: SensorType,
	from: usize,
	tind: usize,
) -> Option<usize> {
	chmap
		.iter()
		.enumerate()
		.skip(from)
		.filter(|(_, ch)| ch.stype == stype)
		.nth(tind)
		.map(|(idx, _)| idx)
}

/// Byte offset of channel `ich` within one input sample. Channels are
/// multiplexed in map order, each one as wide as its data type.
fn in_offset(chmap: &[ChannelDesc], ich: usize) -> Result<usize, Error> {
	let mut offset = 0;
	for ch in &chmap[..ich] {
		offset += ch.si.as_ref().ok_or(Error::InvalidArgument)?.dtype.size();
	}
	Ok(offset)
}

/// Compile one group request into slices of consecutive channels that
/// share the sensor type and the input data type.
fn split_group(
	chmap: &[ChannelDesc],
	grp: &GrpConf,
	out: &mut Vec<SelectedChannel>,
) -> Result<(), Error> {
	if grp.nch == 0 {
		return Ok(());
	}

	let mut ich = next_chindex(chmap, grp.sensortype, 0, grp.index).ok_or(Error::InvalidArgument)?;
	let mut arr_offset = grp.arr_offset;
	let mut consumed = 0;

	while consumed < grp.nch {
		let si = chmap[ich].si.as_ref().ok_or(Error::InvalidArgument)?;
		let typein = si.dtype;

		// Accumulate the run of consecutive channels this slice covers.
		let mut len = 0;
		while consumed + len < grp.nch
			&& ich + len < chmap.len()
			&& chmap[ich + len].stype == grp.sensortype
			&& chmap[ich + len]
				.si
				.as_ref()
				.is_some_and(|s| s.dtype == typein)
		{
			len += 1;
		}

		out.push(SelectedChannel {
			in_offset: in_offset(chmap, ich)?,
			inlen: len * typein.size(),
			typein,
			typeout: grp.datatype,
			iarray: grp.iarray,
			arr_offset,
			sc: GVal::typed(grp.datatype, si.scale),
			scaled: si.scaled,
		});

		consumed += len;
		arr_offset += len * grp.datatype.size();
		if consumed < grp.nch {
			ich = next_chindex(chmap, grp.sensortype, ich + len, 0)
				.ok_or(Error::InvalidArgument)?;
		}
	}

	Ok(())
}

/// Compile the caller's group requests against the device channel map.
pub(crate) fn split_groups(
	chmap: &[ChannelDesc],
	grps: &[GrpConf],
) -> Result<Vec<SelectedChannel>, Error> {
	let mut selected = Vec::new();
	for grp in grps {
		split_group(chmap, grp, &mut selected)?;
	}
	Ok(selected)
}

/// Fill a channel report from the channel map, the fallback when the
/// plugin has no `fill_chinfo` of its own.
pub(crate) fn default_chinfo(
	chmap: &[ChannelDesc],
	stype: SensorType,
	ich: usize,
) -> Result<ChannelReport, Error> {
	let idx = next_chindex(chmap, stype, 0, ich).ok_or(Error::InvalidArgument)?;
	let ch = &chmap[idx];
	let si = ch.si.as_ref().ok_or(Error::InvalidArgument)?;

	let label = match &ch.label {
		Some(label) => label.to_string(),
		None => format!("{}:{}", sensor_name(stype)?, ich),
	};

	Ok(ChannelReport {
		label,
		isint: si.isint,
		min: si.min,
		max: si.max,
		unit: si.unit.to_string(),
		transducer: si.transducer.to_string(),
		prefiltering: si.prefiltering.to_string(),
	})
}

#[cfg(test)]
mod tests {
	use std::borrow::Cow;

	use super::*;
	use crate::{DataType, SignalInfo};

	fn channel(stype: SensorType, dtype: DataType, scale: f64, scaled: bool) -> ChannelDesc {
		ChannelDesc {
			label: None,
			stype,
			si: Some(SignalInfo {
				dtype,
				scale,
				scaled,
				..SignalInfo::default()
			}),
		}
	}

	fn eeg_f32() -> ChannelDesc {
		channel(SensorType::EEG, DataType::Float, 1.0, false)
	}

	fn trig_i32() -> ChannelDesc {
		channel(SensorType::TRIGGER, DataType::Int32, 1.0, false)
	}

	#[test]
	fn test_single_run() {
		let chmap = vec![eeg_f32(), eeg_f32(), eeg_f32(), trig_i32()];
		let grp = GrpConf {
			sensortype: SensorType::EEG,
			index: 0,
			nch: 3,
			iarray: 0,
			arr_offset: 0,
			datatype: DataType::Float,
		};
		let sel = split_groups(&chmap, &[grp]).unwrap();
		assert_eq!(sel.len(), 1);
		assert_eq!(sel[0].in_offset, 0);
		assert_eq!(sel[0].inlen, 12);
		assert_eq!(sel[0].typein, DataType::Float);
		assert_eq!(sel[0].typeout, DataType::Float);
	}

	#[test]
	fn test_interleaved_channels_split_the_run() {
		let chmap = vec![eeg_f32(), trig_i32(), eeg_f32()];
		let grp = GrpConf {
			sensortype: SensorType::EEG,
			index: 0,
			nch: 2,
			iarray: 0,
			arr_offset: 0,
			datatype: DataType::Float,
		};
		let sel = split_groups(&chmap, &[grp]).unwrap();
		assert_eq!(sel.len(), 2);
		assert_eq!((sel[0].in_offset, sel[0].inlen), (0, 4));
		// The second slice starts past the f32 and i32 channels, and
		// packs right behind the first one in the output.
		assert_eq!((sel[1].in_offset, sel[1].inlen), (8, 4));
		assert_eq!(sel[1].arr_offset, 4);
	}

	#[test]
	fn test_data_type_change_splits_the_run() {
		let chmap = vec![
			channel(SensorType::EEG, DataType::Float, 1.0, false),
			channel(SensorType::EEG, DataType::Double, 0.5, true),
		];
		let grp = GrpConf {
			sensortype: SensorType::EEG,
			index: 0,
			nch: 2,
			iarray: 0,
			arr_offset: 0,
			datatype: DataType::Double,
		};
		let sel = split_groups(&chmap, &[grp]).unwrap();
		assert_eq!(sel.len(), 2);
		assert_eq!(sel[0].typein, DataType::Float);
		assert_eq!(sel[1].typein, DataType::Double);
		assert_eq!(sel[1].in_offset, 4);
		assert_eq!(sel[1].sc, GVal::Double(0.5));
		assert!(sel[1].scaled);
	}

	#[test]
	fn test_index_within_sensor_type() {
		let chmap = vec![trig_i32(), eeg_f32(), eeg_f32(), eeg_f32()];
		let grp = GrpConf {
			sensortype: SensorType::EEG,
			index: 1,
			nch: 2,
			iarray: 2,
			arr_offset: 16,
			datatype: DataType::Int32,
		};
		let sel = split_groups(&chmap, &[grp]).unwrap();
		assert_eq!(sel.len(), 1);
		// trigger(4) + first eeg(4)
		assert_eq!(sel[0].in_offset, 8);
		assert_eq!(sel[0].iarray, 2);
		assert_eq!(sel[0].arr_offset, 16);
	}

	#[test]
	fn test_missing_channels_fail() {
		let chmap = vec![eeg_f32()];
		let grp = GrpConf {
			sensortype: SensorType::TRIGGER,
			index: 0,
			nch: 1,
			iarray: 0,
			arr_offset: 0,
			datatype: DataType::Int32,
		};
		assert_eq!(
			split_groups(&chmap, &[grp]).err(),
			Some(Error::InvalidArgument)
		);
	}

	#[test]
	fn test_default_chinfo_labels() {
		let mut chmap = vec![eeg_f32(), eeg_f32()];
		chmap[1].label = Some(Cow::Borrowed("Cz"));

		let report = default_chinfo(&chmap, SensorType::EEG, 0).unwrap();
		assert_eq!(report.label, "eeg:0");
		let report = default_chinfo(&chmap, SensorType::EEG, 1).unwrap();
		assert_eq!(report.label, "Cz");
	}
}
