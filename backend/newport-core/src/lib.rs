mod api;
pub mod cmap;
pub mod color;
pub mod dcb;
pub mod ramdac;
pub mod rex3;
pub mod vc2;
pub mod xmap9;

pub use api::{Newport, NewportConfig, NewportError, NewportResult};
pub use dcb::DcbTimeoutScheduler;
