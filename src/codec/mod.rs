//! Codec module - MessagePack primitives and dynamic argument values.
//!
//! - [`MsgPackReader`] - cursor reading one MessagePack primitive at a time
//! - [`DynamicValue`] - decoded argument tree
//! - [`read_value`] - recursive value decoder bounded by [`DecodeLimits`]
//!
//! # Example
//!
//! ```
//! use hubwire::codec::{read_value, DecodeLimits, DynamicValue, MsgPackReader};
//!
//! let bytes = rmp_serde::to_vec(&vec![1, 2, 3]).unwrap();
//! let mut reader = MsgPackReader::new(&bytes);
//! let value = read_value(&mut reader, "arguments[0]", &DecodeLimits::default()).unwrap();
//!
//! assert_eq!(
//!     value,
//!     DynamicValue::Array(vec![
//!         DynamicValue::Integer(1),
//!         DynamicValue::Integer(2),
//!         DynamicValue::Integer(3),
//!     ])
//! );
//! ```

mod msgpack;
mod value;

pub use msgpack::MsgPackReader;
pub use value::{read_value, DecodeLimits, DynamicValue, DEFAULT_MAX_DEPTH};
