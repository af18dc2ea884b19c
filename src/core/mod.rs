//! Core image-collection processing stages

pub mod bitmask;
pub mod cloud_mask;
pub mod class_mask;
pub mod expression;
pub mod filter;
pub mod mosaic;
pub mod temporal;

// Re-export main types
pub use bitmask::{is_flag_clear, BitmaskDecoder};
pub use cloud_mask::{CloudMaskParams, CloudMasker};
pub use class_mask::{ClassMaskParams, ClassMasker};
pub use expression::{parse_expression, Clause};
pub use filter::{CollectionFilter, Comparison, Predicate};
pub use mosaic::Mosaicker;
pub use temporal::TemporalAggregator;
