pub mod bitmap;
pub mod hash;
