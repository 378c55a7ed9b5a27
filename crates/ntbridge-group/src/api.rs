//! Group management, membership and moderation operations.
//!
//! Every operation the host exposes on both surfaces is written twice, once
//! against the live [`GroupService`] and once as host commands, and handed to
//! [`TransportResolver::call`]. Both paths check the host status the same way,
//! so callers see the same [`BridgeError`] whichever path ran.
//!
//! A few operations only exist as commands (their results arrive as events);
//! those go straight to the [`Correlator`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use ntbridge_core::{
    BridgeError, BridgeResult, Command, CorrelateOptions, Correlator, Expect, TransportResolver,
    ensure_success,
};

use crate::cache::{MemberCache, MemberFetcher, MemberSnapshot};
use crate::model::{Group, GroupMember, MemberRole, MuteEntry, RequestFlag, RequestOperation};
use crate::names::{MEMBER_LIST_SCENE, event, method};
use crate::session::NtSession;

/// Page size for full member-list fetches.
pub const DEFAULT_MEMBER_FETCH_SIZE: u32 = 3000;

/// Window for `getGroupAllInfo`, whose change event the host pushes quickly.
pub const DEFAULT_ALL_INFO_TIMEOUT: Duration = Duration::from_millis(1000);

/// Tunables for [`GroupApi`].
#[derive(Debug, Clone)]
pub struct GroupOptions {
    /// Number of members requested per full member-list fetch.
    pub member_fetch_size: u32,
    /// Default window for [`GroupApi::get_group_all_info`].
    pub all_info_timeout: Duration,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            member_fetch_size: DEFAULT_MEMBER_FETCH_SIZE,
            all_info_timeout: DEFAULT_ALL_INFO_TIMEOUT,
        }
    }
}

/// Shorthand for the resolver over a host session.
pub type SessionResolver = TransportResolver<dyn NtSession>;

// =============================================================================
// Member list fetcher
// =============================================================================

/// Fetches full member lists through the resolver.
///
/// Kept separate from [`GroupApi`] so the cache can own one without the API
/// and the cache owning each other.
#[derive(Clone)]
pub struct MemberListFetcher {
    resolver: SessionResolver,
    num: u32,
}

impl MemberListFetcher {
    pub fn new(resolver: SessionResolver, num: u32) -> Self {
        Self { resolver, num }
    }

    async fn fetch(&self, group: &str, num: u32) -> BridgeResult<MemberSnapshot> {
        let group_code = group.to_string();
        let result = self
            .resolver
            .call(
                "getGroupMembers",
                |session| async move {
                    let service = session.group_service();
                    let scene_id = service.create_member_list_scene(&group_code, MEMBER_LIST_SCENE);
                    service.get_next_member_list(&scene_id, num).await
                },
                |correlator| async move {
                    let scene_id = correlator
                        .send(Command::new(
                            method::GROUP_MEMBER_SCENE,
                            json!([{ "groupCode": group, "scene": MEMBER_LIST_SCENE }]),
                        ))
                        .await?;
                    correlator
                        .send(Command::new(
                            method::GROUP_MEMBERS,
                            json!([{ "sceneId": scene_id, "num": num }, null]),
                        ))
                        .await
                },
            )
            .await?;

        ensure_success(&result)?;
        let snapshot = MemberSnapshot::from_infos(&result["result"]["infos"])?;
        debug!(group = %group, members = snapshot.len(), "Fetched group members");
        Ok(snapshot)
    }
}

#[async_trait]
impl MemberFetcher for MemberListFetcher {
    async fn fetch_members(&self, group: &str) -> BridgeResult<MemberSnapshot> {
        self.fetch(group, self.num).await
    }
}

// =============================================================================
// GroupApi
// =============================================================================

/// Group operations over the resolver, with a member cache.
///
/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct GroupApi {
    resolver: SessionResolver,
    members: MemberListFetcher,
    cache: Arc<MemberCache>,
    options: GroupOptions,
}

impl GroupApi {
    /// Creates the API and its member cache.
    pub fn new(resolver: SessionResolver, options: GroupOptions) -> Self {
        let members = MemberListFetcher::new(resolver.clone(), options.member_fetch_size);
        let cache = Arc::new(MemberCache::new(Arc::new(members.clone())));
        Self {
            resolver,
            members,
            cache,
            options,
        }
    }

    /// The member cache.
    pub fn member_cache(&self) -> &Arc<MemberCache> {
        &self.cache
    }

    /// The resolver.
    pub fn resolver(&self) -> &SessionResolver {
        &self.resolver
    }

    fn correlator(&self) -> &Correlator {
        self.resolver.correlator()
    }

    // =========================================================================
    // Groups & members
    // =========================================================================

    /// Lists the groups the account belongs to.
    pub async fn get_groups(&self) -> BridgeResult<Vec<Group>> {
        let payload = self
            .correlator()
            .correlate(
                Command::new(method::GROUP_LIST, json!([])).first_event_only(),
                Some(Expect::first(event::GROUP_LIST_UPDATE)),
                CorrelateOptions::new(),
            )
            .await?;
        Ok(serde_json::from_value(payload["groupList"].clone())?)
    }

    /// Fetches up to `num` members of `group` straight from the host.
    pub async fn get_group_members(&self, group: &str, num: u32) -> BridgeResult<MemberSnapshot> {
        self.members.fetch(group, num).await
    }

    /// Looks up a member by uin or uid through the cache.
    ///
    /// `None` covers both "no such member" and "could not fetch the group";
    /// see [`MemberCache::status`] to tell them apart.
    pub async fn get_group_member(&self, group: &str, member: &str) -> Option<GroupMember> {
        self.cache.get(group, member).await
    }

    /// Reads the first screen of group system notifies.
    pub async fn get_single_screen_notifies(&self, num: u32) -> BridgeResult<Vec<Value>> {
        let payload = self
            .correlator()
            .correlate(
                Command::new(
                    method::SINGLE_SCREEN_NOTIFIES,
                    json!([{ "doubt": false, "startSeq": "", "number": num }, null]),
                )
                .first_event_only(),
                Some(Expect::first(event::GROUP_NOTIFY)),
                CorrelateOptions::new(),
            )
            .await?;
        Ok(serde_json::from_value(payload["notifies"].clone())?)
    }

    /// Full group detail; waits for the change event carrying `group`.
    pub async fn get_group_all_info(
        &self,
        group: &str,
        timeout: Option<Duration>,
    ) -> BridgeResult<Value> {
        let code = group.to_string();
        let mut payload = self
            .correlator()
            .correlate(
                Command::new(
                    method::GROUP_ALL_INFO,
                    json!([{ "groupCode": group, "source": 4 }, null]),
                ),
                Some(Expect::matching(event::GROUP_ALL_INFO_CHANGE, move |p| {
                    p["groupAll"]["groupCode"] == code.as_str()
                })),
                CorrelateOptions::new().timeout(timeout.unwrap_or(self.options.all_info_timeout)),
            )
            .await?;
        Ok(payload["groupAll"].take())
    }

    // =========================================================================
    // Moderation
    // =========================================================================

    /// Answers a join/invite request identified by `flag`
    /// (`groupCode|seq|type`).
    pub async fn handle_group_request(
        &self,
        flag: &str,
        operation: RequestOperation,
        reason: Option<&str>,
    ) -> BridgeResult<()> {
        let flag = RequestFlag::parse(flag)
            .ok_or_else(|| BridgeError::InvalidArgument(format!("malformed request flag '{flag}'")))?;
        // The host rejects an empty postscript.
        let postscript = reason.filter(|r| !r.is_empty()).unwrap_or(" ");
        let target = json!({
            "seq": flag.seq,
            "type": flag.kind,
            "groupCode": flag.group_code,
            "postscript": postscript,
        });
        let operate_type = operation.code();

        let operate = json!({ "operateType": operate_type, "targetMsg": target.clone() });
        let result = self
            .resolver
            .call(
                "handleGroupRequest",
                |session| async move {
                    session
                        .group_service()
                        .operate_sys_notify(false, operate)
                        .await
                },
                |correlator| async move {
                    correlator
                        .send(Command::new(
                            method::HANDLE_GROUP_REQUEST,
                            json!([{
                                "doubt": false,
                                "operateMsg": { "operateType": operate_type, "targetMsg": target },
                            }, null]),
                        ))
                        .await
                },
            )
            .await?;
        ensure_success(&result)
    }

    /// Leaves `group`.
    pub async fn quit_group(&self, group: &str) -> BridgeResult<()> {
        let result = self
            .resolver
            .call(
                "quitGroup",
                |session| async move { session.group_service().quit_group(group).await },
                |correlator| async move {
                    correlator
                        .send(Command::new(
                            method::QUIT_GROUP,
                            json!([{ "groupCode": group }, null]),
                        ))
                        .await
                },
            )
            .await?;
        ensure_success(&result)?;
        self.cache.invalidate(group);
        Ok(())
    }

    /// Removes members from `group`.
    pub async fn kick_member(
        &self,
        group: &str,
        uids: &[String],
        refuse_forever: bool,
        reason: &str,
    ) -> BridgeResult<()> {
        let result = self
            .resolver
            .call(
                "kickMember",
                |session| async move {
                    session
                        .group_service()
                        .kick_member(group, uids, refuse_forever, reason)
                        .await
                },
                |correlator| async move {
                    correlator
                        .send(Command::new(
                            method::KICK_MEMBER,
                            json!([{
                                "groupCode": group,
                                "kickUids": uids,
                                "refuseForever": refuse_forever,
                                "kickReason": reason,
                            }]),
                        ))
                        .await
                },
            )
            .await?;
        ensure_success(&result)
    }

    /// Mutes or unmutes members; a zero `time_stamp` lifts the mute.
    pub async fn ban_member(&self, group: &str, members: &[MuteEntry]) -> BridgeResult<()> {
        let result = self
            .resolver
            .call(
                "banMember",
                |session| async move {
                    session
                        .group_service()
                        .set_member_shut_up(group, members)
                        .await
                },
                |correlator| async move {
                    correlator
                        .send(Command::new(
                            method::MUTE_MEMBER,
                            json!([{ "groupCode": group, "memList": members }]),
                        ))
                        .await
                },
            )
            .await?;
        ensure_success(&result)
    }

    /// Turns whole-group mute on or off.
    pub async fn ban_group(&self, group: &str, shut_up: bool) -> BridgeResult<()> {
        let result = self
            .resolver
            .call(
                "banGroup",
                |session| async move {
                    session
                        .group_service()
                        .set_group_shut_up(group, shut_up)
                        .await
                },
                |correlator| async move {
                    correlator
                        .send(Command::new(
                            method::MUTE_GROUP,
                            json!([{ "groupCode": group, "shutUp": shut_up }, null]),
                        ))
                        .await
                },
            )
            .await?;
        ensure_success(&result)
    }

    /// Sets a member's group card.
    pub async fn set_member_card(&self, group: &str, uid: &str, card_name: &str) -> BridgeResult<()> {
        let result = self
            .resolver
            .call(
                "setMemberCard",
                |session| async move {
                    session
                        .group_service()
                        .modify_member_card_name(group, uid, card_name)
                        .await
                },
                |correlator| async move {
                    correlator
                        .send(Command::new(
                            method::SET_MEMBER_CARD,
                            json!([{ "groupCode": group, "uid": uid, "cardName": card_name }, null]),
                        ))
                        .await
                },
            )
            .await?;
        ensure_success(&result)
    }

    /// Promotes or demotes a member.
    pub async fn set_member_role(&self, group: &str, uid: &str, role: MemberRole) -> BridgeResult<()> {
        let result = self
            .resolver
            .call(
                "setMemberRole",
                |session| async move {
                    session
                        .group_service()
                        .modify_member_role(group, uid, role)
                        .await
                },
                |correlator| async move {
                    correlator
                        .send(Command::new(
                            method::SET_MEMBER_ROLE,
                            json!([{ "groupCode": group, "uid": uid, "role": role }, null]),
                        ))
                        .await
                },
            )
            .await?;
        ensure_success(&result)
    }

    /// Renames `group`.
    pub async fn set_group_name(&self, group: &str, group_name: &str) -> BridgeResult<()> {
        let result = self
            .resolver
            .call(
                "setGroupName",
                |session| async move {
                    session
                        .group_service()
                        .modify_group_name(group, group_name, false)
                        .await
                },
                |correlator| async move {
                    correlator
                        .send(Command::new(
                            method::SET_GROUP_NAME,
                            json!([{ "groupCode": group, "groupName": group_name }, null]),
                        ))
                        .await
                },
            )
            .await?;
        ensure_success(&result)
    }

    // =========================================================================
    // Command-only operations
    // =========================================================================

    /// How many @all mentions remain today.
    pub async fn get_group_remain_at_times(&self, group: &str) -> BridgeResult<Value> {
        self.command(method::GROUP_AT_ALL_REMAIN_COUNT, json!([{ "groupCode": group }, null]))
            .await
    }

    pub async fn create_group_file_folder(&self, group: &str, folder_name: &str) -> BridgeResult<Value> {
        self.command(
            method::CREATE_FILE_FOLDER,
            json!([{ "groupId": group, "folderName": folder_name }, null]),
        )
        .await
    }

    pub async fn delete_group_file_folder(&self, group: &str, folder_id: &str) -> BridgeResult<Value> {
        self.command(
            method::DELETE_FILE_FOLDER,
            json!([{ "groupId": group, "folderId": folder_id }, null]),
        )
        .await
    }

    pub async fn delete_group_file(
        &self,
        group: &str,
        file_ids: &[String],
        bus_ids: &[i64],
    ) -> BridgeResult<Value> {
        self.command(
            method::DELETE_FILE,
            json!([{ "groupId": group, "busIdList": bus_ids, "fileIdList": file_ids }, null]),
        )
        .await
    }

    /// Lists group files.
    ///
    /// The host answers with a request id and later pushes the listing tagged
    /// with that id; only that push is accepted.
    pub async fn get_group_file_list(&self, group: &str, list_form: Value) -> BridgeResult<Value> {
        let mut payload = self
            .correlator()
            .correlate(
                Command::new(
                    method::GROUP_FILE_LIST,
                    json!([{ "groupId": group, "fileListForm": list_form }, null]),
                ),
                Some(Expect::matching_reply(
                    event::GROUP_FILE_INFO_UPDATE,
                    |p, reply| reply.is_some_and(|id| p["fileInfo"]["reqId"] == *id),
                )),
                CorrelateOptions::new(),
            )
            .await?;
        Ok(payload["fileInfo"].take())
    }

    /// The recommend-contact card of `group`, as ark JSON.
    pub async fn get_group_recommend_contact(&self, group: &str) -> BridgeResult<String> {
        let reply = self
            .command(method::GROUP_RECOMMEND_CONTACT, json!([{ "groupCode": group }, null]))
            .await?;
        reply["arkJson"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BridgeError::Serialization("missing arkJson".into()))
    }

    pub async fn query_cached_essence_msg(
        &self,
        group: &str,
        msg_seq: u64,
        msg_random: u64,
    ) -> BridgeResult<Value> {
        self.command(
            method::QUERY_CACHED_ESSENCE,
            json!([{
                "key": { "groupCode": group, "msgSeq": msg_seq, "msgRandom": msg_random }
            }, null]),
        )
        .await
    }

    pub async fn get_group_honor_list(&self, group: &str) -> BridgeResult<Value> {
        let code: i64 = group
            .parse()
            .map_err(|_| BridgeError::InvalidArgument(format!("group code '{group}' is not numeric")))?;
        self.command(
            method::GROUP_HONOR_LIST,
            json!([{ "req": { "groupCode": [code] } }, null]),
        )
        .await
    }

    async fn command(&self, name: &str, payload: Value) -> BridgeResult<Value> {
        self.correlator().send(Command::new(name, payload)).await
    }
}

impl std::fmt::Debug for GroupApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupApi")
            .field("resolver", &self.resolver)
            .field("cache", &self.cache)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::GroupService;
    use ntbridge_core::{CommandChannel, EventBus, SessionSlot};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    // -------------------------------------------------------------------------
    // Fixtures
    // -------------------------------------------------------------------------

    /// Host stand-in for the correlated path. Replies per command name and
    /// may push an event from inside `send`.
    #[derive(Default)]
    struct ScriptedHost {
        bus: Option<Arc<EventBus>>,
        replies: HashMap<String, Value>,
        pushes: HashMap<String, (String, Value)>,
        sent: Mutex<Vec<Command>>,
    }

    impl ScriptedHost {
        fn reply(mut self, command: &str, reply: Value) -> Self {
            self.replies.insert(command.to_string(), reply);
            self
        }

        fn push(mut self, command: &str, event: &str, payload: Value) -> Self {
            self.pushes
                .insert(command.to_string(), (event.to_string(), payload));
            self
        }

        fn sent(&self) -> Vec<Command> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl CommandChannel for ScriptedHost {
        async fn send(&self, command: &Command) -> BridgeResult<Option<Value>> {
            self.sent.lock().push(command.clone());
            if let (Some(bus), Some((event, payload))) =
                (&self.bus, self.pushes.get(command.name()))
            {
                bus.emit(event, payload.clone());
            }
            Ok(self.replies.get(command.name()).cloned())
        }
    }

    /// Host stand-in for the direct path.
    #[derive(Default)]
    struct FakeService {
        calls: Mutex<Vec<String>>,
        status: Option<Value>,
    }

    impl FakeService {
        fn record(&self, call: impl Into<String>) -> BridgeResult<Value> {
            self.calls.lock().push(call.into());
            Ok(self
                .status
                .clone()
                .unwrap_or_else(|| json!({ "result": 0, "errMsg": "" })))
        }
    }

    #[async_trait]
    impl GroupService for FakeService {
        fn create_member_list_scene(&self, group_code: &str, scene: &str) -> String {
            self.calls.lock().push(format!("scene:{group_code}:{scene}"));
            format!("scene-{group_code}")
        }

        async fn get_next_member_list(&self, scene_id: &str, num: u32) -> BridgeResult<Value> {
            self.calls.lock().push(format!("members:{scene_id}:{num}"));
            Ok(json!({
                "errCode": 0,
                "result": { "infos": { "u_a": { "uid": "u_a", "uin": "1001" } } }
            }))
        }

        async fn operate_sys_notify(&self, doubt: bool, operate: Value) -> BridgeResult<Value> {
            self.record(format!("notify:{doubt}:{operate}"))
        }

        async fn quit_group(&self, group_code: &str) -> BridgeResult<Value> {
            self.record(format!("quit:{group_code}"))
        }

        async fn kick_member(
            &self,
            group_code: &str,
            uids: &[String],
            refuse_forever: bool,
            _reason: &str,
        ) -> BridgeResult<Value> {
            self.record(format!("kick:{group_code}:{}:{refuse_forever}", uids.join(",")))
        }

        async fn set_member_shut_up(
            &self,
            group_code: &str,
            members: &[MuteEntry],
        ) -> BridgeResult<Value> {
            self.record(format!("mute:{group_code}:{}", members.len()))
        }

        async fn set_group_shut_up(&self, group_code: &str, shut_up: bool) -> BridgeResult<Value> {
            self.record(format!("muteAll:{group_code}:{shut_up}"))
        }

        async fn modify_member_card_name(
            &self,
            group_code: &str,
            uid: &str,
            card_name: &str,
        ) -> BridgeResult<Value> {
            self.record(format!("card:{group_code}:{uid}:{card_name}"))
        }

        async fn modify_member_role(
            &self,
            group_code: &str,
            uid: &str,
            role: MemberRole,
        ) -> BridgeResult<Value> {
            self.record(format!("role:{group_code}:{uid}:{}", u8::from(role)))
        }

        async fn modify_group_name(
            &self,
            group_code: &str,
            group_name: &str,
            _is_normal_member: bool,
        ) -> BridgeResult<Value> {
            self.record(format!("name:{group_code}:{group_name}"))
        }
    }

    struct FakeSession(Arc<FakeService>);

    impl NtSession for FakeSession {
        fn group_service(&self) -> Arc<dyn GroupService> {
            Arc::clone(&self.0) as Arc<dyn GroupService>
        }
    }

    fn api(host: ScriptedHost, session: Option<Arc<FakeService>>) -> (GroupApi, Arc<ScriptedHost>) {
        let bus = host.bus.clone().unwrap_or_else(|| Arc::new(EventBus::new()));
        let host = Arc::new(host);
        let correlator = Correlator::new(bus, Arc::clone(&host) as Arc<dyn CommandChannel>);
        let slot: SessionSlot<dyn NtSession> = SessionSlot::empty();
        if let Some(service) = session {
            slot.attach(Arc::new(FakeSession(service)) as Arc<dyn NtSession>);
        }
        let resolver = TransportResolver::new(Arc::new(slot), correlator);
        (GroupApi::new(resolver, GroupOptions::default()), host)
    }

    fn ok() -> Value {
        json!({ "result": 0, "errMsg": "" })
    }

    // -------------------------------------------------------------------------
    // Dual-path operations
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_direct_path_skips_the_channel() {
        let service = Arc::new(FakeService::default());
        let (api, host) = api(ScriptedHost::default(), Some(Arc::clone(&service)));

        api.set_member_card("100", "u_a", "Alice").await.unwrap();
        api.ban_group("100", true).await.unwrap();

        assert_eq!(
            *service.calls.lock(),
            vec!["card:100:u_a:Alice".to_string(), "muteAll:100:true".to_string()]
        );
        assert!(host.sent().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_path_sends_host_command() {
        let host = ScriptedHost::default().reply(method::KICK_MEMBER, ok());
        let (api, host) = api(host, None);

        api.kick_member("100", &["u_a".to_string()], true, "spam")
            .await
            .unwrap();

        let sent = host.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].name(), method::KICK_MEMBER);
        assert_eq!(sent[0].payload()[0]["kickUids"], json!(["u_a"]));
        assert_eq!(sent[0].payload()[0]["refuseForever"], json!(true));
    }

    #[tokio::test]
    async fn test_host_status_errors_match_across_paths() {
        let failure = json!({ "result": 1, "errMsg": "no permission" });

        let service = Arc::new(FakeService {
            status: Some(failure.clone()),
            ..Default::default()
        });
        let (direct, _) = api(ScriptedHost::default(), Some(service));
        let (fallback, _) = api(ScriptedHost::default().reply(method::SET_GROUP_NAME, failure), None);

        let a = direct.set_group_name("100", "new").await.unwrap_err();
        let b = fallback.set_group_name("100", "new").await.unwrap_err();

        assert_eq!(a, b);
        assert_eq!(a, BridgeError::transport(1, "no permission"));
    }

    #[tokio::test]
    async fn test_handle_group_request_direct() {
        let service = Arc::new(FakeService::default());
        let (api, _) = api(ScriptedHost::default(), Some(Arc::clone(&service)));

        api.handle_group_request("100|17|7", RequestOperation::Reject, None)
            .await
            .unwrap();

        let calls = service.calls.lock();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("notify:false:"));
        assert!(calls[0].contains(r#""operateType":2"#));
        assert!(calls[0].contains(r#""postscript":" ""#));
    }

    #[tokio::test]
    async fn test_handle_group_request_fallback_payload() {
        let host = ScriptedHost::default().reply(method::HANDLE_GROUP_REQUEST, ok());
        let (api, host) = api(host, None);

        api.handle_group_request("100|17|7", RequestOperation::Approve, Some("welcome"))
            .await
            .unwrap();

        let sent = host.sent();
        let operate = &sent[0].payload()[0]["operateMsg"];
        assert_eq!(operate["operateType"], json!(1));
        assert_eq!(operate["targetMsg"]["groupCode"], json!("100"));
        assert_eq!(operate["targetMsg"]["seq"], json!("17"));
        assert_eq!(operate["targetMsg"]["type"], json!(7));
        assert_eq!(operate["targetMsg"]["postscript"], json!("welcome"));
    }

    #[tokio::test]
    async fn test_malformed_request_flag_is_rejected_before_send() {
        let (api, host) = api(ScriptedHost::default(), None);

        let err = api
            .handle_group_request("100|17", RequestOperation::Approve, None)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::InvalidArgument(_)));
        assert!(host.sent().is_empty());
    }

    // -------------------------------------------------------------------------
    // Members
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_member_fetch_direct_path() {
        let service = Arc::new(FakeService::default());
        let (api, _) = api(ScriptedHost::default(), Some(Arc::clone(&service)));

        let members = api.get_group_members("100", 50).await.unwrap();

        assert_eq!(members.len(), 1);
        assert_eq!(
            *service.calls.lock(),
            vec![
                format!("scene:100:{MEMBER_LIST_SCENE}"),
                "members:scene-100:50".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_member_fetch_fallback_uses_scene_reply() {
        let host = ScriptedHost::default()
            .reply(method::GROUP_MEMBER_SCENE, json!("scene-7"))
            .reply(
                method::GROUP_MEMBERS,
                json!({
                    "errCode": 0,
                    "result": { "infos": [
                        { "uid": "u_a", "uin": "1001" },
                        { "uid": "u_b", "uin": "1002" }
                    ] }
                }),
            );
        let (api, host) = api(host, None);

        let member = api.get_group_member("100", "1002").await.unwrap();
        assert_eq!(member.uid, "u_b");

        let sent = host.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].payload()[0]["sceneId"], json!("scene-7"));
        assert_eq!(sent[1].payload()[0]["num"], json!(DEFAULT_MEMBER_FETCH_SIZE));

        // Served from the cache.
        assert!(api.get_group_member("100", "u_a").await.is_some());
        assert_eq!(host.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_quit_group_drops_cached_members() {
        let service = Arc::new(FakeService::default());
        let (api, _) = api(ScriptedHost::default(), Some(service));

        assert!(api.get_group_member("100", "u_a").await.is_some());
        assert!(api.member_cache().snapshot("100").is_some());

        api.quit_group("100").await.unwrap();
        assert!(api.member_cache().snapshot("100").is_none());
    }

    // -------------------------------------------------------------------------
    // Event-correlated operations
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_get_groups_takes_first_list_update() {
        let bus = Arc::new(EventBus::new());
        let host = ScriptedHost {
            bus: Some(Arc::clone(&bus)),
            ..Default::default()
        }
        .push(
            method::GROUP_LIST,
            event::GROUP_LIST_UPDATE,
            json!({ "updateType": 1, "groupList": [
                { "groupCode": "100", "groupName": "Rust", "memberCount": 3, "maxMember": 200 }
            ] }),
        );
        let (api, _) = api(host, None);

        let groups = api.get_groups().await.unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group_code, "100");
        assert_eq!(groups[0].member_count, 3);
        assert_eq!(groups[0].extra.len(), 0);
    }

    #[tokio::test]
    async fn test_group_all_info_ignores_other_groups() {
        let bus = Arc::new(EventBus::new());
        let host = ScriptedHost {
            bus: Some(Arc::clone(&bus)),
            ..Default::default()
        };
        let (api, _) = api(host, None);

        let emitter = Arc::clone(&bus);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            emitter.emit(
                event::GROUP_ALL_INFO_CHANGE,
                json!({ "groupAll": { "groupCode": "200", "groupName": "other" } }),
            );
            emitter.emit(
                event::GROUP_ALL_INFO_CHANGE,
                json!({ "groupAll": { "groupCode": "100", "groupName": "mine" } }),
            );
        });

        let info = api.get_group_all_info("100", None).await.unwrap();
        assert_eq!(info["groupName"], json!("mine"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_all_info_uses_short_window() {
        let (api, _) = api(ScriptedHost::default(), None);

        let err = api.get_group_all_info("100", None).await.unwrap_err();

        assert_eq!(
            err,
            BridgeError::Timeout {
                event: event::GROUP_ALL_INFO_CHANGE.to_string(),
                after: DEFAULT_ALL_INFO_TIMEOUT,
            }
        );
    }

    #[tokio::test]
    async fn test_file_list_matches_request_id_from_reply() {
        let bus = Arc::new(EventBus::new());
        let host = ScriptedHost {
            bus: Some(Arc::clone(&bus)),
            ..Default::default()
        }
        .reply(method::GROUP_FILE_LIST, json!("req-2"));
        let (api, _) = api(host, None);

        let emitter = Arc::clone(&bus);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            emitter.emit(
                event::GROUP_FILE_INFO_UPDATE,
                json!({ "fileInfo": { "reqId": "req-1", "item": ["stale"] } }),
            );
            emitter.emit(
                event::GROUP_FILE_INFO_UPDATE,
                json!({ "fileInfo": { "reqId": "req-2", "item": ["fresh"] } }),
            );
        });

        let info = api
            .get_group_file_list("100", json!({ "folderId": "/" }))
            .await
            .unwrap();
        assert_eq!(info["item"], json!(["fresh"]));
    }

    #[tokio::test]
    async fn test_recommend_contact_returns_ark_json() {
        let host = ScriptedHost::default().reply(
            method::GROUP_RECOMMEND_CONTACT,
            json!({ "result": 0, "arkJson": "{\"app\":\"card\"}" }),
        );
        let (api, _) = api(host, None);

        let ark = api.get_group_recommend_contact("100").await.unwrap();
        assert_eq!(ark, r#"{"app":"card"}"#);
    }

    #[tokio::test]
    async fn test_honor_list_requires_numeric_group() {
        let (api, host) = api(ScriptedHost::default(), None);

        let err = api.get_group_honor_list("abc").await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
        assert!(host.sent().is_empty());
    }
}
