//! Data models for Skyloft

mod account;
mod draft;
mod post;
mod profile;

pub use account::Account;
pub use draft::Draft;
pub use post::{Author, Post, PostRecord, ReplyRef, StrongRef};
pub(crate) use post::{relative_time, rkey_of};
pub use profile::{Profile, ProfileViewer};
