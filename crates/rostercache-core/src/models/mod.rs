//! Data models for roster pages.
//!
//! - `Member`, `MemberRole`: one roster row
//! - `Page`, `Pagination`: a page of members plus its metadata

pub mod member;
pub mod page;

pub use member::{Member, MemberRole};
pub use page::{Page, Pagination};
