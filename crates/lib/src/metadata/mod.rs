//! Native-image metadata aggregation.
//!
//! Steps contribute reflection, resource, proxy, JNI and serialization
//! requests as [`Contribution`]s. The [`MetadataAggregator`] merges them per
//! class name into one [`NativeImageMetadata`], which the emitters serialize.

mod aggregate;
mod contribution;
mod reflection;
mod resources;
mod types;

pub use aggregate::{MetadataAggregator, NativeImageMetadata};
pub use contribution::{Contribution, ReflectiveClass};
pub use reflection::{JniInfo, MethodRef, ReflectionInfo};
pub use resources::{ResourceInfo, literal_pattern};
pub use types::MetadataError;
