pub mod catalog;
pub mod checkpoint;
pub mod date_range;
pub mod identity;
pub mod loaders;
pub mod work_item;

pub use catalog::{Catalog, CatalogEntry};
pub use checkpoint::{BatchStatus, CheckpointRecord};
pub use date_range::{DateRange, YearMonth};
pub use identity::Secret;
pub use loaders::{load_catalog, load_catalog_from_toml};
pub use work_item::{OperationMode, Variant, WorkItem, WorkPlan};
