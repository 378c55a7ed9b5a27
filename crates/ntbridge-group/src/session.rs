//! The host's in-process service surface, as seen by the direct path.
//!
//! When the bridge runs embedded in the host, the host lends it a live
//! session object. These traits describe the slice of that object the group
//! operations call. Every method returns the host's raw status payload; the
//! caller checks it with [`ensure_success`](ntbridge_core::ensure_success)
//! exactly as it does for replies on the correlated path.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use ntbridge_core::BridgeResult;

use crate::model::{MemberRole, MuteEntry};

/// A live host session.
pub trait NtSession: Send + Sync {
    /// The session's group service.
    fn group_service(&self) -> Arc<dyn GroupService>;
}

/// The host's group service.
#[async_trait]
pub trait GroupService: Send + Sync {
    /// Opens a member-list scene for `group_code` and returns its id.
    fn create_member_list_scene(&self, group_code: &str, scene: &str) -> String;

    /// Fetches up to `num` members for an open scene.
    async fn get_next_member_list(&self, scene_id: &str, num: u32) -> BridgeResult<Value>;

    /// Answers a system notify (join/invite request).
    async fn operate_sys_notify(&self, doubt: bool, operate: Value) -> BridgeResult<Value>;

    async fn quit_group(&self, group_code: &str) -> BridgeResult<Value>;

    async fn kick_member(
        &self,
        group_code: &str,
        uids: &[String],
        refuse_forever: bool,
        reason: &str,
    ) -> BridgeResult<Value>;

    async fn set_member_shut_up(
        &self,
        group_code: &str,
        members: &[MuteEntry],
    ) -> BridgeResult<Value>;

    async fn set_group_shut_up(&self, group_code: &str, shut_up: bool) -> BridgeResult<Value>;

    async fn modify_member_card_name(
        &self,
        group_code: &str,
        uid: &str,
        card_name: &str,
    ) -> BridgeResult<Value>;

    async fn modify_member_role(
        &self,
        group_code: &str,
        uid: &str,
        role: MemberRole,
    ) -> BridgeResult<Value>;

    async fn modify_group_name(
        &self,
        group_code: &str,
        group_name: &str,
        is_normal_member: bool,
    ) -> BridgeResult<Value>;
}
