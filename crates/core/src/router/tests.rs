use std::collections::HashSet;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use super::*;
use crate::channel::{Outbound, QueueChannel};
use crate::outcome::OutcomeStatus;
use crate::store::MemoryStore;
use crate::testing::{RecordingSink, drain_json, settle};

struct Fixture {
	router: CommandRouter,
	sink: Arc<RecordingSink>,
}

impl Fixture {
	fn new() -> Self {
		let registry = SessionRegistry::new(Duration::from_secs(60), Arc::new(MemoryStore::new()));
		let sink = RecordingSink::new();
		let correlator = CommandCorrelator::new(Duration::from_secs(30), sink.clone());
		Self {
			router: CommandRouter::new(registry, correlator),
			sink,
		}
	}

	fn agent(&self, access_code: &str) -> UnboundedReceiver<Outbound> {
		let (channel, rx) = QueueChannel::new();
		self.router.registry().register(access_code, "Firefox", channel);
		rx
	}

	fn pending(&self) -> usize {
		self.router.correlator().len()
	}
}

fn targets(report: RouteReport) -> Vec<DispatchTarget> {
	match report {
		RouteReport::Dispatched { targets, .. } => targets,
		other => panic!("expected dispatch, got {other:?}"),
	}
}

#[tokio::test(start_paused = true)]
async fn targeted_command_reaches_only_that_agent() {
	let fx = Fixture::new();
	let mut abc = fx.agent("abc");
	let mut other = fx.agent("xyz");

	let report = fx
		.router
		.handle_line("main:goto url=https://example.com browser=abc", None)
		.unwrap();
	let sent = targets(report);
	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].access_code, "abc");

	let frames = drain_json(&mut abc);
	assert_eq!(frames.len(), 1);
	assert_eq!(frames[0]["type"], "command");
	assert_eq!(frames[0]["data"]["command"], "goto");
	assert_eq!(frames[0]["data"]["accessCode"], "abc");
	assert_eq!(frames[0]["data"]["commandId"], sent[0].command_id.as_str());
	assert_eq!(frames[0]["data"]["params"], json!({"url": "https://example.com"}));
	assert!(drain_json(&mut other).is_empty());

	assert!(fx.router.correlator().contains(&sent[0].command_id));
}

#[tokio::test(start_paused = true)]
async fn unknown_target_creates_no_pending_command() {
	let fx = Fixture::new();
	let mut abc = fx.agent("abc");

	let err = fx
		.router
		.handle_line("main:click selector=#go browser=nobody", None)
		.unwrap_err();
	assert!(matches!(err, Error::UnknownTarget { ref access_code } if access_code == "nobody"));
	assert_eq!(err.access_code(), Some("nobody"));
	assert_eq!(fx.pending(), 0);
	assert!(drain_json(&mut abc).is_empty());
}

#[tokio::test(start_paused = true)]
async fn broadcast_fans_out_with_distinct_ids() {
	let fx = Fixture::new();
	let mut receivers = vec![fx.agent("a"), fx.agent("b"), fx.agent("c")];

	let sent = targets(fx.router.handle_line("main:reload", None).unwrap());
	let codes: Vec<_> = sent.iter().map(|t| t.access_code.as_str()).collect();
	assert_eq!(codes, vec!["a", "b", "c"]);

	let ids: HashSet<_> = sent.iter().map(|t| t.command_id.clone()).collect();
	assert_eq!(ids.len(), 3);
	assert_eq!(fx.pending(), 3);

	for rx in &mut receivers {
		assert_eq!(drain_json(rx).len(), 1);
	}
}

#[tokio::test(start_paused = true)]
async fn broadcast_without_agents_fails() {
	let fx = Fixture::new();
	let err = fx.router.handle_line("main:reload", None).unwrap_err();
	assert!(matches!(err, Error::NoAgents));
	assert_eq!(fx.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn exit_is_broadcast_without_tracking() {
	let fx = Fixture::new();
	let mut a = fx.agent("a");
	let mut b = fx.agent("b");

	let report = fx.router.handle_line("main:exit", None).unwrap();
	let RouteReport::Dispatched { command, targets } = report else {
		panic!("exit should dispatch");
	};
	assert_eq!(command, CommandName::Exit);
	assert_eq!(targets.len(), 2);
	assert_eq!(fx.pending(), 0);

	assert_eq!(drain_json(&mut a)[0]["data"]["command"], "exit");
	assert_eq!(drain_json(&mut b)[0]["data"]["command"], "exit");
}

#[tokio::test(start_paused = true)]
async fn list_browsers_returns_snapshot() {
	let fx = Fixture::new();
	let _a = fx.agent("b");
	let _b = fx.agent("a");

	let report = fx.router.handle_line("main:listBrowsers", None).unwrap();
	let RouteReport::Browsers(browsers) = &report else {
		panic!("expected browsers");
	};
	let codes: Vec<_> = browsers.iter().map(|b| b.access_code.as_str()).collect();
	assert_eq!(codes, vec!["a", "b"]);
	assert_eq!(browsers[0].user_agent, "Firefox");
	assert_eq!(fx.pending(), 0);

	let packet = serde_json::to_value(report.to_packet()).unwrap();
	assert_eq!(packet["type"], "browsers");
	assert_eq!(packet["data"]["browsers"][1]["accessCode"], "b");
}

#[tokio::test(start_paused = true)]
async fn reregistration_routes_to_second_channel_only() {
	let fx = Fixture::new();
	let mut first = fx.agent("abc");
	let mut second = fx.agent("abc");

	fx.router.handle_line("main:back browser=abc", None).unwrap();

	assert!(drain_json(&mut first).is_empty());
	assert_eq!(drain_json(&mut second).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_send_cancels_tracking_and_evicts() {
	let fx = Fixture::new();
	let rx = fx.agent("abc");
	drop(rx);

	let err = fx
		.router
		.handle_line("main:click selector=a browser=abc", None)
		.unwrap_err();
	assert!(matches!(err, Error::Delivery { .. }));
	assert_eq!(fx.pending(), 0);
	assert!(fx.router.registry().get("abc").is_none());
}

#[tokio::test(start_paused = true)]
async fn broadcast_skips_dead_agents() {
	let fx = Fixture::new();
	let mut live = fx.agent("live");
	drop(fx.agent("dead"));

	let sent = targets(fx.router.handle_line("main:getTitle", None).unwrap());
	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].access_code, "live");
	assert_eq!(fx.pending(), 1);
	assert_eq!(drain_json(&mut live).len(), 1);
	assert!(fx.router.registry().get("dead").is_none());
}

#[tokio::test(start_paused = true)]
async fn result_is_reported_once() {
	let fx = Fixture::new();
	let _abc = fx.agent("abc");
	let sent = targets(fx.router.handle_line("main:getUrl browser=abc", None).unwrap());
	let command_id = sent[0].command_id.clone();

	let result = CommandResult {
		command_id: command_id.clone(),
		access_code: Some("abc".into()),
		success: Some(true),
		result: Some(json!("https://example.com/")),
		error: None,
	};
	assert!(fx.router.ingest_result(result.clone()));
	assert!(!fx.router.ingest_result(result));

	let outcomes = fx.sink.outcomes();
	assert_eq!(outcomes.len(), 1);
	assert_eq!(outcomes[0].command_id, command_id);
	assert_eq!(outcomes[0].command, CommandName::GetUrl);
	assert!(outcomes[0].succeeded());
}

#[tokio::test(start_paused = true)]
async fn late_result_after_timeout_is_dropped() {
	let fx = Fixture::new();
	let _abc = fx.agent("abc");
	let sent = targets(fx.router.handle_line("main:wait ms=100000 browser=abc", None).unwrap());

	tokio::time::sleep(Duration::from_secs(31)).await;
	settle().await;

	let late = CommandResult {
		command_id: sent[0].command_id.clone(),
		access_code: None,
		success: None,
		result: None,
		error: None,
	};
	assert!(!fx.router.ingest_result(late));

	let outcomes = fx.sink.outcomes();
	assert_eq!(outcomes.len(), 1);
	assert_eq!(outcomes[0].status, OutcomeStatus::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn unknown_result_is_discarded() {
	let fx = Fixture::new();
	let result = CommandResult {
		command_id: "never-sent".into(),
		access_code: None,
		success: Some(false),
		result: None,
		error: Some("boom".into()),
	};
	assert!(!fx.router.ingest_result(result));
	assert!(fx.sink.outcomes().is_empty());
}
