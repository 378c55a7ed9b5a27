//! Loopback Demo
//!
//! Runs the bridge against a simulated host living in the same process. The
//! host answers commands over the bridge's built-in channel and pushes
//! results back as events; it can also lend the bridge a live session so the
//! same operations run on the direct path.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package loopback
//! cargo run --package loopback -- --path direct --verbose
//! cargo run --package loopback -- --config ntbridge.toml
//! ```

mod host;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::json;
use tracing::{error, info, warn};

use ntbridge::group::names::{event, method};
use ntbridge::prelude::*;
use ntbridge::runtime::RuntimeResult;
use ntbridge::runtime::config::LogLevel;

use host::{HostState, LoopbackSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PathChoice {
    /// Commands and events only.
    Correlated,
    /// Live session calls only.
    Direct,
    /// Correlated first, then direct.
    Both,
}

#[derive(Debug, Parser)]
#[command(about = "Drive ntbridge against a simulated host")]
struct Args {
    /// Configuration file; defaults are searched otherwise.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Group to operate on.
    #[arg(short, long, default_value = "100200")]
    group: String,

    /// Which transport path to exercise.
    #[arg(long, value_enum, default_value_t = PathChoice::Both)]
    path: PathChoice,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    let mut config = loader.load().context("loading configuration")?;
    if args.verbose {
        config.logging.level = LogLevel::Debug;
    }

    let bridge = Arc::new(Bridge::builder().config(config).init_logging(true).build()?);
    let state = HostState::seeded();
    let requests = bridge
        .take_host_requests()
        .context("bridge was built without its command channel")?;
    let host = tokio::spawn(host::serve(
        Arc::clone(&state),
        Arc::downgrade(&bridge),
        requests,
    ));

    if matches!(args.path, PathChoice::Correlated | PathChoice::Both) {
        info!("--- correlated path ---");
        if let Err(e) = correlated(&bridge, &state, &args.group).await {
            error!(error = %e, "Correlated scenario failed");
        }
    }

    if matches!(args.path, PathChoice::Direct | PathChoice::Both) {
        info!("--- direct path ---");
        bridge.attach_session(Arc::new(LoopbackSession::new(Arc::clone(&state))));
        if let Err(e) = direct(&bridge, &args.group).await {
            error!(error = %e, "Direct scenario failed");
        }
        bridge.detach_session();
    }

    drop(bridge);
    host.await?;
    Ok(())
}

async fn correlated(bridge: &Bridge, state: &HostState, group: &str) -> RuntimeResult<()> {
    let api = bridge.group();

    for g in api.get_groups().await? {
        info!(code = %g.group_code, name = %g.group_name, members = g.member_count, "Group");
    }

    let members = api.get_group_members(group, 50).await?;
    info!(count = members.len(), "Fetched members");

    // First lookup fills the cache; the second is served from it.
    if let Some(m) = api.get_group_member(group, "10003").await {
        info!(uid = %m.uid, nick = %m.nick, "Member by uin");
    }
    if let Some(m) = api.get_group_member(group, "u_admin").await {
        info!(uin = %m.uin, role = ?m.role, "Member by uid");
    }

    // A member the cache has not seen yet forces one refresh.
    state.join(group, "u_newbie", "10042", "newbie");
    match api.get_group_member(group, "u_newbie").await {
        Some(m) => info!(uin = %m.uin, "Found just-joined member after refresh"),
        None => warn!(status = ?api.member_cache().status(group), "Just-joined member missing"),
    }

    api.set_member_card(group, "u_alice", "alice (correlated)").await?;

    let info = api.get_group_all_info(group, None).await?;
    info!(name = %info["groupName"], members = %info["memberNum"], "Group detail");

    let files = api
        .get_group_file_list(group, json!({ "folderId": "/", "startIndex": 0, "fileCount": 20 }))
        .await?;
    info!(req = %files["reqId"], items = %files["item"], "Group files");

    let remain = api.get_group_remain_at_times(group).await?;
    info!(remain = %remain["atInfo"]["RemainAtAllCountForGroup"], "@all remaining");

    // Nothing answers for an unknown group: bounded by the short detail window.
    match api
        .get_group_all_info("999999", Some(Duration::from_millis(300)))
        .await
    {
        Err(e) if e.is_timeout() => info!(error = %e, "Unknown group timed out as expected"),
        other => warn!(result = ?other, "Unexpected detail result"),
    }

    // Cancelling a pending correlation.
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });
    let result = bridge
        .correlator()
        .correlate(
            Command::new(
                method::GROUP_ALL_INFO,
                json!([{ "groupCode": "999999", "source": 4 }, null]),
            ),
            Some(Expect::matching(event::GROUP_ALL_INFO_CHANGE, |p| {
                p["groupAll"]["groupCode"] == "999999"
            })),
            CorrelateOptions::new().cancel_on(token),
        )
        .await;
    if let Err(e) = result {
        info!(cancelled = e.is_cancelled(), "Correlation ended");
    }

    Ok(())
}

async fn direct(bridge: &Bridge, group: &str) -> RuntimeResult<()> {
    let api = bridge.group();
    info!(path = ?bridge.path(), "Session attached");

    api.set_member_card(group, "u_alice", "alice (direct)").await?;
    api.set_member_role(group, "u_alice", MemberRole::Admin).await?;
    api.ban_group(group, true).await?;
    api.ban_group(group, false).await?;

    // Refresh so the cache reflects the edits made above.
    let snapshot = api.member_cache().refresh(group).await?;
    for m in snapshot.members() {
        info!(uid = %m.uid, card = %m.card_name, role = ?m.role, "Member");
    }

    match api.set_member_card(group, "u_nobody", "ghost").await {
        Err(BridgeError::Transport { code, message }) => {
            info!(code, message = %message, "Host refused as expected");
        }
        other => warn!(result = ?other, "Unexpected card result"),
    }

    api.kick_member(group, &["u_newbie".to_string()], false, "demo")
        .await?;
    info!("Kicked u_newbie");

    Ok(())
}
