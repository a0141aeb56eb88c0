use std::collections::HashMap;

use crate::ChannelDesc;

/// One option a plugin supports, with the value used when the
/// configuration provides none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptName {
	pub name: &'static str,
	pub defvalue: &'static str,
}

/// Opaque lookup into the configuration collaborator. The parser and
/// settings store live outside the core; anything able to answer
/// setting queries by name can drive a device open.
pub trait ConfLookup {
	fn setting(&self, name: &str) -> Option<&str>;

	/// Channel map registered in the configuration under `name`, if
	/// any. Plugins query this through the core interface while
	/// opening.
	fn mapping(&self, _name: &str) -> Option<Vec<ChannelDesc>> {
		None
	}
}

/// The empty configuration: every option keeps its default value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConf;

impl ConfLookup for NoConf {
	fn setting(&self, _name: &str) -> Option<&str> {
		None
	}
}

impl ConfLookup for HashMap<String, String> {
	fn setting(&self, name: &str) -> Option<&str> {
		self.get(name).map(String::as_str)
	}
}

/// Effective option values handed to a plugin's open, one entry per
/// declared option, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct OptValues {
	values: Vec<(&'static str, String)>,
}

impl OptValues {
	pub(crate) fn collect(opts: &[OptName], conf: &dyn ConfLookup) -> Self {
		Self {
			values: opts
				.iter()
				.map(|opt| {
					let value = conf
						.setting(opt.name)
						.unwrap_or(opt.defvalue)
						.to_owned();
					(opt.name, value)
				})
				.collect(),
		}
	}

	/// Value of the option called `name`, falling back to `default`
	/// for options the plugin never declared.
	#[must_use]
	pub fn get<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
		self.values
			.iter()
			.find(|(n, _)| *n == name)
			.map_or(default, |(_, v)| v.as_str())
	}

	/// Positional access, following the declaration order of the
	/// plugin's supported options.
	#[must_use]
	pub fn value(&self, index: usize) -> Option<&str> {
		self.values.get(index).map(|(_, v)| v.as_str())
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.values.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

/// Scan `(name, value)` pairs for `opt`, falling back to `default`.
#[must_use]
pub fn getopt<'a>(opt: &str, default: &'a str, optv: &'a [(&'a str, &'a str)]) -> &'a str {
	optv.iter()
		.find(|(name, _)| *name == opt)
		.map_or(default, |(_, value)| *value)
}
