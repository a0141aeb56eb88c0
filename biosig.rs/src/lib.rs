#![allow(clippy::cast_possible_truncation)]

mod common;
pub use common::*;

mod types;
pub use types::*;

mod ns_count;
pub use ns_count::*;

mod cast;

mod sensors;
pub use sensors::*;

mod sync;

mod channels;
pub use channels::*;

mod split;

mod options;
pub use options::*;

mod plugin;
pub use plugin::*;

mod ringbuf;

mod device;
pub use device::*;
