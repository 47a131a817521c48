//! Client state shared by the views of the admin shell.

pub mod app;
pub mod user;

pub use app::{AppStore, Breadcrumb, Language, Theme};
pub use user::{UserSortKey, UserStore};
