//! Host command and event names used by the group operations.

/// Commands sent to the host's group service.
pub mod method {
    pub const GROUP_LIST: &str = "nodeIKernelGroupService/getGroupList";
    pub const GROUP_MEMBER_SCENE: &str = "nodeIKernelGroupService/createMemberListScene";
    pub const GROUP_MEMBERS: &str = "nodeIKernelGroupService/getNextMemberList";
    pub const SINGLE_SCREEN_NOTIFIES: &str = "nodeIKernelGroupService/getSingleScreenNotifies";
    pub const HANDLE_GROUP_REQUEST: &str = "nodeIKernelGroupService/operateSysNotify";
    pub const QUIT_GROUP: &str = "nodeIKernelGroupService/quitGroup";
    pub const KICK_MEMBER: &str = "nodeIKernelGroupService/kickMember";
    pub const MUTE_MEMBER: &str = "nodeIKernelGroupService/setMemberShutUp";
    pub const MUTE_GROUP: &str = "nodeIKernelGroupService/setGroupShutUp";
    pub const SET_MEMBER_CARD: &str = "nodeIKernelGroupService/modifyMemberCardName";
    pub const SET_MEMBER_ROLE: &str = "nodeIKernelGroupService/modifyMemberRole";
    pub const SET_GROUP_NAME: &str = "nodeIKernelGroupService/modifyGroupName";
    pub const GROUP_AT_ALL_REMAIN_COUNT: &str = "nodeIKernelGroupService/getGroupRemainAtTimes";
    pub const GROUP_RECOMMEND_CONTACT: &str =
        "nodeIKernelGroupService/getGroupRecommendContactArkJson";
    pub const QUERY_CACHED_ESSENCE: &str = "nodeIKernelGroupService/queryCachedEssenceMsg";
    pub const GROUP_HONOR_LIST: &str = "nodeIKernelGroupService/getGroupHonorList";
    pub const GROUP_ALL_INFO: &str = "nodeIKernelGroupService/getGroupAllInfo";
    pub const CREATE_FILE_FOLDER: &str = "nodeIKernelRichMediaService/createGroupFolder";
    pub const DELETE_FILE_FOLDER: &str = "nodeIKernelRichMediaService/deleteGroupFolder";
    pub const DELETE_FILE: &str = "nodeIKernelRichMediaService/deleteGroupFile";
    pub const GROUP_FILE_LIST: &str = "nodeIKernelRichMediaService/getGroupFileList";
}

/// Events the group operations wait on.
pub mod event {
    pub const GROUP_LIST_UPDATE: &str = "nodeIKernelGroupListener/onGroupListUpdate";
    pub const GROUP_NOTIFY: &str = "nodeIKernelGroupListener/onGroupSingleScreenNotifies";
    pub const GROUP_ALL_INFO_CHANGE: &str = "nodeIKernelGroupListener/onGroupAllInfoChange";
    pub const GROUP_FILE_INFO_UPDATE: &str = "nodeIKernelMsgListener/onGroupFileInfoUpdate";
}

/// Scene name for full member-list fetches.
pub const MEMBER_LIST_SCENE: &str = "groupMemberList_MainWindow";
