//! Sawtooth function generator, the reference device plugin.
//!
//! The device advertises eight EEG channels carrying scaled sawtooth
//! waves and one trigger channel pulsing at every wave restart. It is
//! entirely deterministic, which makes it the plugin of choice for
//! exercising the acquisition pipeline end to end.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use biosig::{
	BlockMapping, CapFlags, ChannelDesc, ChannelReport, CoreInterface, CoreLink, DataType,
	DevicePlugin, Error, GVal, OpenCtx, OptName, OptValues, PluginCap, PluginInfo, SensorType,
	SignalInfo, PLUGIN_ABI_VERSION,
};

const NUM_EEG_CH: usize = 8;
const NUM_TRI_CH: usize = 1;
const NCH: usize = NUM_EEG_CH + NUM_TRI_CH;
/// Input samples transferred per ring buffer update.
const NS: usize = 4;
/// Period of the sawtooth, in samples.
const SAWFREQ: i64 = 50;

static EEG_INFO: SignalInfo = SignalInfo {
	dtype: DataType::Int32,
	isint: false,
	scaled: true,
	scale: 1.0 / 8192.0,
	min: GVal::Double(-262144.0),
	max: GVal::Double(262143.96875),
	unit: Cow::Borrowed("uV"),
	transducer: Cow::Borrowed("Fake electrode"),
	prefiltering: Cow::Borrowed(""),
};

static TRI_INFO: SignalInfo = SignalInfo {
	dtype: DataType::Int32,
	isint: true,
	scaled: false,
	scale: 1.0,
	min: GVal::Int32(i32::MIN),
	max: GVal::Int32(i32::MAX),
	unit: Cow::Borrowed("Boolean"),
	transducer: Cow::Borrowed("Trigger"),
	prefiltering: Cow::Borrowed(""),
};

pub static SAW_PLUGIN: PluginInfo = PluginInfo {
	plugin_abi: PLUGIN_ABI_VERSION,
	name: "saw",
	open_device: open_saw,
	supported_opts: &[OptName {
		name: "samplingrate",
		defvalue: "256",
	}],
};

struct SawGen {
	stop: Arc<AtomicBool>,
	thread: Option<JoinHandle<()>>,
}

fn sawtooth(frame: &mut [i32], isample: i64) {
	let phase = (isample % SAWFREQ - SAWFREQ / 2) as i32;
	for (i, ch) in frame[..NUM_EEG_CH].iter_mut().enumerate() {
		*ch = (i as i32 + 1) * phase;
	}
	frame[NUM_EEG_CH] = if isample % SAWFREQ == 0 { 0xAA } else { 0 };
}

fn acq_loop(link: CoreLink, fs: u32, stop: &AtomicBool) {
	let period = Duration::from_nanos(NS as u64 * 1_000_000_000 / u64::from(fs));
	let mut data = [0_i32; NCH * NS];
	let mut bytes = [0_u8; NCH * NS * 4];
	let mut isample: i64 = 0;

	while !stop.load(Ordering::Relaxed) {
		thread::sleep(period);

		for s in 0..NS {
			sawtooth(&mut data[s * NCH..(s + 1) * NCH], isample);
			isample += 1;
		}
		for (dst, v) in bytes.chunks_exact_mut(4).zip(&data) {
			dst.copy_from_slice(&v.to_ne_bytes());
		}

		// A failed update has already latched the error in the core.
		if link.update_ringbuffer(&bytes).is_err() {
			log::warn!("sawtooth generator stopping after a failed update");
			break;
		}
	}
}

fn open_saw(ctx: &OpenCtx<'_>, opts: &OptValues) -> Result<Box<dyn DevicePlugin>, Error> {
	let fs: u32 = opts
		.get("samplingrate", "256")
		.parse()
		.map_err(|_| Error::InvalidArgument)?;
	if fs == 0 {
		return Err(Error::InvalidArgument);
	}

	let mut chmap = Vec::with_capacity(NCH);
	for _ in 0..NUM_EEG_CH {
		chmap.push(ChannelDesc {
			label: None,
			stype: SensorType::EEG,
			si: Some(EEG_INFO.clone()),
		});
	}
	for _ in 0..NUM_TRI_CH {
		chmap.push(ChannelDesc {
			label: None,
			stype: SensorType::TRIGGER,
			si: Some(TRI_INFO.clone()),
		});
	}

	// The device strings are global constants, no need for the core to
	// copy them.
	ctx.set_cap(PluginCap {
		sampling_freq: fs,
		device_type: Cow::Borrowed("Sawtooth function generator"),
		device_id: Cow::Borrowed("N/A"),
		mappings: vec![BlockMapping {
			chmap: Cow::Owned(chmap),
			num_skipped: 0,
			skipped_stype: SensorType::UNDEFINED,
			default_info: None,
		}],
		flags: CapFlags::NOCP_DEVTYPE | CapFlags::NOCP_DEVID,
	})?;
	ctx.set_input_samlen(NCH * 4);

	let stop = Arc::new(AtomicBool::new(false));
	let thread = thread::spawn({
		let link = ctx.link();
		let stop = stop.clone();
		move || acq_loop(link, fs, &stop)
	});

	Ok(Box::new(SawGen {
		stop,
		thread: Some(thread),
	}))
}

impl DevicePlugin for SawGen {
	fn close_device(&mut self) -> Result<(), Error> {
		self.stop.store(true, Ordering::Relaxed);
		if let Some(thread) = self.thread.take() {
			thread.join().map_err(|_| Error::IoFailure)?;
		}
		Ok(())
	}

	fn fill_chinfo(&self, stype: SensorType, ich: usize, report: &mut ChannelReport) {
		report.label = if stype == SensorType::TRIGGER {
			format!("tri:{ich}")
		} else {
			format!("eeg:{ich}")
		};
	}
}

impl Drop for SawGen {
	fn drop(&mut self) {
		let _ = self.close_device();
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use biosig::{open_with, Capability, CapValue, GrpConf, NoConf};

	use super::*;

	fn eeg_grp() -> GrpConf {
		GrpConf {
			sensortype: SensorType::EEG,
			index: 0,
			nch: NUM_EEG_CH,
			iarray: 0,
			arr_offset: 0,
			datatype: DataType::Float,
		}
	}

	fn tri_grp() -> GrpConf {
		GrpConf {
			sensortype: SensorType::TRIGGER,
			index: 0,
			nch: 1,
			iarray: 1,
			arr_offset: 0,
			datatype: DataType::Int32,
		}
	}

	fn f32_at(bytes: &[u8], offset: usize) -> f32 {
		f32::from_ne_bytes(bytes[offset..offset + 4].try_into().unwrap())
	}

	fn i32_at(bytes: &[u8], offset: usize) -> i32 {
		i32::from_ne_bytes(bytes[offset..offset + 4].try_into().unwrap())
	}

	#[test]
	fn test_sawtooth_acquisition() {
		let dev = open_with(&SAW_PLUGIN, &NoConf).unwrap();
		assert_eq!(dev.device_type(), "Sawtooth function generator");
		assert_eq!(dev.device_id(), "N/A");
		assert_eq!(dev.get_numch(SensorType::EEG), NUM_EEG_CH);
		assert_eq!(dev.get_numch(SensorType::TRIGGER), NUM_TRI_CH);
		assert_eq!(
			dev.get_cap(Capability::TypeList),
			CapValue::TypeList(&[SensorType::EEG, SensorType::TRIGGER])
		);

		dev.acq_setup(&[NUM_EEG_CH * 4, 4], &[eeg_grp(), tri_grp()])
			.unwrap();
		dev.start().unwrap();

		let ns = 120;
		let mut eeg = vec![0_u8; ns * NUM_EEG_CH * 4];
		let mut trig = vec![0_u8; ns * 4];
		assert_eq!(dev.get_data(ns, &mut [&mut eeg, &mut trig]).unwrap(), ns);
		dev.stop().unwrap();

		// The acquisition starts at an arbitrary point of the wave;
		// recover the phase from the first sample of channel 0.
		let phase0 = (f32_at(&eeg, 0) * 8192.0).round() as i64;
		assert!((-SAWFREQ / 2..SAWFREQ / 2).contains(&phase0));
		let offset0 = phase0 + SAWFREQ / 2;

		for s in 0..ns {
			let phase = (offset0 + s as i64) % SAWFREQ - SAWFREQ / 2;
			for c in 0..NUM_EEG_CH {
				let expected = ((c as i64 + 1) * phase) as f32 / 8192.0;
				assert_eq!(
					f32_at(&eeg, (s * NUM_EEG_CH + c) * 4),
					expected,
					"eeg sample {s} channel {c}"
				);
			}
			let expected_tri = if (offset0 + s as i64) % SAWFREQ == 0 {
				0xAA
			} else {
				0
			};
			assert_eq!(i32_at(&trig, s * 4), expected_tri, "trigger sample {s}");
		}

		dev.close().unwrap();
	}

	#[test]
	fn test_restart_keeps_the_wave_consistent() {
		let dev = open_with(&SAW_PLUGIN, &NoConf).unwrap();
		dev.acq_setup(&[NUM_EEG_CH * 4, 4], &[eeg_grp(), tri_grp()])
			.unwrap();

		let mut eeg = vec![0_u8; 20 * NUM_EEG_CH * 4];
		let mut trig = vec![0_u8; 20 * 4];

		dev.start().unwrap();
		assert_eq!(dev.get_data(20, &mut [&mut eeg, &mut trig]).unwrap(), 20);
		dev.stop().unwrap();

		// The stop order takes effect at the producer's next push;
		// until then the device still reports itself running.
		let mut restarted = dev.start();
		for _ in 0..200 {
			if restarted.is_ok() {
				break;
			}
			thread::sleep(Duration::from_millis(10));
			restarted = dev.start();
		}
		restarted.unwrap();
		assert_eq!(dev.get_data(20, &mut [&mut eeg, &mut trig]).unwrap(), 20);
		let phase0 = (f32_at(&eeg, 0) * 8192.0).round() as i64;
		assert!((-SAWFREQ / 2..SAWFREQ / 2).contains(&phase0));
		dev.close().unwrap();
	}

	#[test]
	fn test_sampling_rate_option_and_labels() {
		let mut conf = HashMap::new();
		conf.insert("samplingrate".to_owned(), "512".to_owned());

		let dev = open_with(&SAW_PLUGIN, &conf).unwrap();
		assert_eq!(dev.sampling_freq(), 512);

		let report = dev.channel_info(SensorType::EEG, 3).unwrap();
		assert_eq!(report.label, "eeg:3");
		assert_eq!(report.unit, "uV");
		assert!(!report.isint);
		assert_eq!(report.mm_f64(), (-262144.0, 262143.96875));

		let report = dev.channel_info(SensorType::TRIGGER, 0).unwrap();
		assert_eq!(report.label, "tri:0");
		assert!(report.isint);

		assert!(dev.channel_info(SensorType::EEG, NUM_EEG_CH).is_err());
	}

	#[test]
	fn test_rejects_a_broken_sampling_rate() {
		let mut conf = HashMap::new();
		conf.insert("samplingrate".to_owned(), "not-a-rate".to_owned());
		assert_eq!(
			open_with(&SAW_PLUGIN, &conf).err(),
			Some(Error::InvalidArgument)
		);
	}
}
