pub mod config;
pub mod scan;
pub mod status;

pub use scan::run_scan;
pub use status::show_status;
