//! Slide container formats.
//!
//! - [`tiff`]: TIFF/BigTIFF header, IFD chain and tag value reading
//! - [`svs`]: the pipe-separated ImageDescription grammar of SVS files
//! - [`detect`]: scanner vendor classification from the first description

pub mod detect;
pub mod svs;
pub mod tiff;

pub use detect::{classify, is_tiff_header, UnlinkStrategy, VendorProfile};
pub use svs::SvsDescription;
