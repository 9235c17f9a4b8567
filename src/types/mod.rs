//! Small value types shared by the codec, interpreter and channel.
//!
//! - [`DeviceClass`] selects registry parameters and decode formulas
//! - [`SearchFlags`] tracks the quick-search / waiting / pairing state
//! - [`delta_u8`] and [`delta_u16`] compute rolling-counter differences

mod counter;
mod device_class;
mod flags;

pub use counter::{delta_u16, delta_u8};
pub use device_class::DeviceClass;
pub use flags::SearchFlags;
