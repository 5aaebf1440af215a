pub mod gallery;
pub mod posts;
pub mod users;

pub use gallery::GalleryService;
pub use posts::{Pagination, PostService};
pub use users::UserService;
