pub mod id_locks;
pub mod image_normalizer;
pub mod orphan_sweeper;
pub mod photo_service;
pub mod pointer_registry;

#[cfg(feature = "s3")]
pub mod s3_service;
