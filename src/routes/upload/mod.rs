mod handler;
mod model;

pub use handler::{upload_file, upload_multiple};
pub use model::{MultiUploadResponse, UploadResponse, sanitize_filename};
