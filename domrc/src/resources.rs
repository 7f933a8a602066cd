//! Resource plugins. Each type implements [`crate::entry::Entry`] twice
//! over: a factory instance claims its command-line switch and creates
//! loaded instances that live in the resource file.

pub mod binary;
pub mod bitmap;
pub mod font;
pub mod string;
pub mod wave;
