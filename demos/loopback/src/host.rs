//! A simulated host.
//!
//! Keeps a few groups in memory and answers both surfaces: commands arriving
//! over the bridge's built-in channel, and direct calls on [`LoopbackSession`].
//! Results of list-style commands are pushed back as events after a short
//! delay, the way the real host does.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info};

use ntbridge::group::names::{event, method};
use ntbridge::prelude::*;

const EVENT_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
struct Member {
    uid: String,
    uin: String,
    nick: String,
    card_name: String,
    role: MemberRole,
}

impl Member {
    fn to_json(&self) -> Value {
        json!({
            "uid": self.uid,
            "uin": self.uin,
            "nick": self.nick,
            "cardName": self.card_name,
            "role": self.role,
        })
    }
}

#[derive(Debug)]
struct GroupState {
    name: String,
    members: Vec<Member>,
    muted: bool,
}

/// In-memory host state shared by both surfaces.
#[derive(Debug, Default)]
pub struct HostState {
    groups: Mutex<BTreeMap<String, GroupState>>,
    next_req: AtomicU64,
}

fn ok() -> Value {
    json!({ "result": 0, "errMsg": "" })
}

fn not_found(group: &str) -> Value {
    json!({ "result": 11004, "errMsg": format!("group {group} not found") })
}

impl HostState {
    /// A host with two groups.
    pub fn seeded() -> Arc<Self> {
        let state = Self::default();
        {
            let mut groups = state.groups.lock();
            groups.insert(
                "100200".into(),
                GroupState {
                    name: "Rust learners".into(),
                    members: vec![
                        member("u_owner", "10001", "ferris", MemberRole::Owner),
                        member("u_admin", "10002", "borrowck", MemberRole::Admin),
                        member("u_alice", "10003", "alice", MemberRole::Normal),
                    ],
                    muted: false,
                },
            );
            groups.insert(
                "300400".into(),
                GroupState {
                    name: "Async corner".into(),
                    members: vec![member("u_owner", "10001", "ferris", MemberRole::Owner)],
                    muted: false,
                },
            );
        }
        Arc::new(state)
    }

    /// Adds a member behind the bridge's back, as if they just joined.
    pub fn join(&self, group: &str, uid: &str, uin: &str, nick: &str) {
        if let Some(g) = self.groups.lock().get_mut(group) {
            g.members.push(member(uid, uin, nick, MemberRole::Normal));
        }
    }

    fn group_list(&self) -> Value {
        let groups = self.groups.lock();
        let list: Vec<Value> = groups
            .iter()
            .map(|(code, g)| {
                json!({
                    "groupCode": code,
                    "groupName": g.name,
                    "memberCount": g.members.len(),
                    "maxMember": 200,
                })
            })
            .collect();
        json!({ "updateType": 1, "groupList": list })
    }

    fn member_list(&self, group: &str, num: usize) -> Value {
        let groups = self.groups.lock();
        let Some(g) = groups.get(group) else {
            return json!({ "errCode": 11004, "errMsg": "no such group", "result": {} });
        };
        let infos: Map<String, Value> = g
            .members
            .iter()
            .take(num)
            .map(|m| (m.uid.clone(), m.to_json()))
            .collect();
        json!({ "errCode": 0, "errMsg": "", "result": { "infos": infos, "finish": true } })
    }

    fn all_info(&self, group: &str) -> Option<Value> {
        let groups = self.groups.lock();
        groups.get(group).map(|g| {
            json!({
                "groupAll": {
                    "groupCode": group,
                    "groupName": g.name,
                    "memberNum": g.members.len(),
                    "shutUpAll": g.muted,
                }
            })
        })
    }

    fn with_group(&self, group: &str, f: impl FnOnce(&mut GroupState)) -> Value {
        match self.groups.lock().get_mut(group) {
            Some(g) => {
                f(g);
                ok()
            }
            None => not_found(group),
        }
    }

    fn with_member(&self, group: &str, uid: &str, f: impl FnOnce(&mut Member)) -> Value {
        let mut groups = self.groups.lock();
        let Some(g) = groups.get_mut(group) else {
            return not_found(group);
        };
        match g.members.iter_mut().find(|m| m.uid == uid) {
            Some(m) => {
                f(m);
                ok()
            }
            None => json!({ "result": 11005, "errMsg": format!("{uid} is not a member") }),
        }
    }

    fn remove_members(&self, group: &str, uids: &[String]) -> Value {
        self.with_group(group, |g| g.members.retain(|m| !uids.contains(&m.uid)))
    }
}

fn member(uid: &str, uin: &str, nick: &str, role: MemberRole) -> Member {
    Member {
        uid: uid.into(),
        uin: uin.into(),
        nick: nick.into(),
        card_name: String::new(),
        role,
    }
}

fn arg<'a>(payload: &'a Value, key: &str) -> &'a Value {
    &payload[0][key]
}

fn arg_str<'a>(payload: &'a Value, key: &str) -> &'a str {
    arg(payload, key).as_str().unwrap_or_default()
}

// =============================================================================
// Correlated surface
// =============================================================================

/// Serves the bridge's command channel until the bridge is dropped.
pub async fn serve(
    state: Arc<HostState>,
    bridge: Weak<Bridge>,
    mut requests: mpsc::Receiver<HostRequest>,
) {
    while let Some(request) = requests.recv().await {
        match request {
            HostRequest::Subscribe { event, reply } => {
                debug!(event = %event, "Host subscription");
                let _ = reply.send(Ok(()));
            }
            HostRequest::Command { command, reply } => {
                let (answer, push) = handle(&state, &command);
                let _ = reply.send(Ok(answer));
                if let Some((name, payload)) = push {
                    let bridge = Weak::clone(&bridge);
                    tokio::spawn(async move {
                        tokio::time::sleep(EVENT_DELAY).await;
                        if let Some(bridge) = bridge.upgrade() {
                            bridge.emit(name, payload);
                        }
                    });
                }
            }
        }
    }
    info!("Host channel closed");
}

type Push = Option<(&'static str, Value)>;

fn handle(state: &HostState, command: &Command) -> (Option<Value>, Push) {
    let payload = command.payload();
    debug!(command = %command.name(), "Host received command");

    match command.name() {
        method::GROUP_LIST => (Some(ok()), Some((event::GROUP_LIST_UPDATE, state.group_list()))),
        method::GROUP_MEMBER_SCENE => {
            let scene = format!("scene:{}", arg_str(payload, "groupCode"));
            (Some(Value::String(scene)), None)
        }
        method::GROUP_MEMBERS => {
            let scene = arg_str(payload, "sceneId");
            let group = scene.strip_prefix("scene:").unwrap_or_default();
            let num = arg(payload, "num").as_u64().unwrap_or(0) as usize;
            (Some(state.member_list(group, num)), None)
        }
        method::GROUP_ALL_INFO => {
            let group = arg_str(payload, "groupCode");
            let push = state
                .all_info(group)
                .map(|info| (event::GROUP_ALL_INFO_CHANGE, info));
            (Some(ok()), push)
        }
        method::GROUP_FILE_LIST => {
            let req_id = format!("req-{}", state.next_req.fetch_add(1, Ordering::Relaxed));
            let listing = json!({
                "fileInfo": {
                    "reqId": req_id,
                    "groupCode": arg_str(payload, "groupId"),
                    "item": [{ "type": 1, "fileInfo": { "fileName": "notes.md", "fileSize": 1024 } }],
                }
            });
            (
                Some(Value::String(req_id)),
                Some((event::GROUP_FILE_INFO_UPDATE, listing)),
            )
        }
        method::SET_MEMBER_CARD => {
            let card = arg_str(payload, "cardName").to_string();
            let answer = state.with_member(
                arg_str(payload, "groupCode"),
                arg_str(payload, "uid"),
                |m| m.card_name = card,
            );
            (Some(answer), None)
        }
        method::MUTE_GROUP => {
            let shut_up = arg(payload, "shutUp").as_bool().unwrap_or(false);
            let answer = state.with_group(arg_str(payload, "groupCode"), |g| g.muted = shut_up);
            (Some(answer), None)
        }
        method::KICK_MEMBER => {
            let uids: Vec<String> = arg(payload, "kickUids")
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default();
            (Some(state.remove_members(arg_str(payload, "groupCode"), &uids)), None)
        }
        method::GROUP_AT_ALL_REMAIN_COUNT => (
            Some(json!({ "result": 0, "atInfo": { "RemainAtAllCountForGroup": 10 } })),
            None,
        ),
        _ => (Some(ok()), None),
    }
}

// =============================================================================
// Direct surface
// =============================================================================

/// The host's live session, lent to the bridge.
#[derive(Debug, Clone)]
pub struct LoopbackSession {
    state: Arc<HostState>,
}

impl LoopbackSession {
    pub fn new(state: Arc<HostState>) -> Self {
        Self { state }
    }
}

impl NtSession for LoopbackSession {
    fn group_service(&self) -> Arc<dyn GroupService> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl GroupService for LoopbackSession {
    fn create_member_list_scene(&self, group_code: &str, _scene: &str) -> String {
        format!("scene:{group_code}")
    }

    async fn get_next_member_list(&self, scene_id: &str, num: u32) -> BridgeResult<Value> {
        let group = scene_id.strip_prefix("scene:").unwrap_or_default();
        Ok(self.state.member_list(group, num as usize))
    }

    async fn operate_sys_notify(&self, _doubt: bool, _operate: Value) -> BridgeResult<Value> {
        Ok(ok())
    }

    async fn quit_group(&self, group_code: &str) -> BridgeResult<Value> {
        match self.state.groups.lock().remove(group_code) {
            Some(_) => Ok(ok()),
            None => Ok(not_found(group_code)),
        }
    }

    async fn kick_member(
        &self,
        group_code: &str,
        uids: &[String],
        _refuse_forever: bool,
        _reason: &str,
    ) -> BridgeResult<Value> {
        Ok(self.state.remove_members(group_code, uids))
    }

    async fn set_member_shut_up(
        &self,
        group_code: &str,
        _members: &[MuteEntry],
    ) -> BridgeResult<Value> {
        Ok(self.state.with_group(group_code, |_| {}))
    }

    async fn set_group_shut_up(&self, group_code: &str, shut_up: bool) -> BridgeResult<Value> {
        Ok(self.state.with_group(group_code, |g| g.muted = shut_up))
    }

    async fn modify_member_card_name(
        &self,
        group_code: &str,
        uid: &str,
        card_name: &str,
    ) -> BridgeResult<Value> {
        Ok(self
            .state
            .with_member(group_code, uid, |m| m.card_name = card_name.to_string()))
    }

    async fn modify_member_role(
        &self,
        group_code: &str,
        uid: &str,
        role: MemberRole,
    ) -> BridgeResult<Value> {
        Ok(self.state.with_member(group_code, uid, |m| m.role = role))
    }

    async fn modify_group_name(
        &self,
        group_code: &str,
        group_name: &str,
        _is_normal_member: bool,
    ) -> BridgeResult<Value> {
        Ok(self
            .state
            .with_group(group_code, |g| g.name = group_name.to_string()))
    }
}
