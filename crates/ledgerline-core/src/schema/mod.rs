mod catalog;
mod migrations;

pub use catalog::{Catalog, CATALOG_FILE_NAME};
pub use migrations::{Migration, MIGRATIONS};
