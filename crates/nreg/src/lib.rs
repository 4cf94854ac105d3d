#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use nreg_linalg as linalg;

#[doc(inline)]
pub use nreg_image as image;

#[doc(inline)]
pub use nreg_blockmatch as blockmatch;

#[doc(inline)]
pub use nreg_spline as spline;
