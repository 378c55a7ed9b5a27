//! # ntbridge Group
//!
//! Group management, membership and moderation operations built on the
//! ntbridge core.
//!
//! [`GroupApi`] is the entry point. Operations the host offers both in-process
//! and as commands run through the [`TransportResolver`] so the direct
//! [`NtSession`] is used whenever one is attached. Member lookups go through a
//! per-group [`MemberCache`] that refreshes at most once per miss.
//!
//! [`TransportResolver`]: ntbridge_core::TransportResolver

pub mod api;
pub mod cache;
pub mod model;
pub mod names;
pub mod session;

pub use api::{
    DEFAULT_ALL_INFO_TIMEOUT, DEFAULT_MEMBER_FETCH_SIZE, GroupApi, GroupOptions,
    MemberListFetcher, SessionResolver,
};
pub use cache::{CacheState, CacheStatus, MemberCache, MemberFetcher, MemberSnapshot};
pub use model::{Group, GroupMember, MemberRole, MuteEntry, RequestFlag, RequestOperation};
pub use session::{GroupService, NtSession};
