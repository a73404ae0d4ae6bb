//! Steps del run, uno por archivo.

pub mod archive;
pub mod detect;
pub mod fetch;
pub mod promote;

pub use archive::archive_staged;
pub use detect::detect_change;
pub use fetch::fetch_to_staging;
pub use promote::promote_archived;
