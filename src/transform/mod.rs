//! Transform stages.
//!
//! A [`Transform`] is writable on one side and readable on the other; a
//! [`Converter`] turns input chunks into output chunks in between.
//!
//! - [`PassThrough`], [`MapConverter`] - Generic converters
//! - [`LineSplitter`], [`TextDecoder`] - Byte-to-line and byte-to-text boundaries

mod converter;
mod stage;
mod text;

pub use converter::{Converter, MapConverter, Output, PassThrough};
pub use stage::{Transform, TransformState};
pub use text::{LineSplitter, TextDecoder};
