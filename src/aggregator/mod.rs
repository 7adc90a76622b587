//! Named-field JSON aggregation
//!
//! Independently running producers each own one field of a shared JSON
//! document. The [`FieldAggregator`] serializes all mutations through a single
//! task and emits the whole document after each batch.

pub mod serialize;
pub mod setter;
pub mod updater;

pub use serialize::force_serialize;
pub use setter::{FieldSetter, FieldUpdate, SnapshotSink};
pub use updater::{FieldAggregator, FieldHandle};
