pub mod domain;
pub mod repository;
pub mod uploads;

pub use domain::{Flash, FlashLevel, LikeState};
pub use repository::{BlogRepository, RepositoryError, SqliteBlogRepository};
pub use uploads::UploadStore;
