//! Core of a VRChat screenshot album: folder scanning, embedded user/world
//! metadata, a disk thumbnail cache and a sortable per-user photo index.

pub mod config;
pub mod gallery;
pub mod logging;
pub mod metadata;
pub mod photo;
pub mod scanner;
pub mod search;
pub mod thumbnails;
pub mod transform;
pub mod users;

pub use config::Config;
pub use gallery::Gallery;
pub use metadata::{MetadataReader, MetadataWriter, PngChunkCodec, User, VrcMetadata};
pub use photo::Photo;
pub use search::filter_by_user_prefix;
pub use thumbnails::{ThumbnailCache, ThumbnailError, ThumbnailService, ThumbnailTask};
pub use transform::Transform;
pub use users::{UserEntry, UserIndex, UserSortType, UsersChanged};
