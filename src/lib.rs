pub mod adapters;
pub mod filesystem;
pub mod fs;
pub mod model;
pub mod util;
