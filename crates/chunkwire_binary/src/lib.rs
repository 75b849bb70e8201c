pub mod slice_serialization;
