pub mod keyword;
pub mod relations;
pub mod retriever;

pub use keyword::extract_keywords;
pub use relations::{filter_dataset_mixing, FK_PARTNERS};
pub use retriever::{LinkTier, SchemaLink, SchemaLinker};
