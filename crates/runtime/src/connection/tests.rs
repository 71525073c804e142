use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};

use super::*;
use crate::channel::Channel;
use crate::remote_object::private;
use crate::testing::{PeerHandle, memory_transport};

type Log = Arc<Mutex<Vec<String>>>;

struct TestObject {
	channel: Channel,
	type_name: String,
	log: Log,
}

impl private::Sealed for TestObject {}

impl RemoteObject for TestObject {
	fn identifier(&self) -> &str {
		self.channel.identifier()
	}

	fn type_name(&self) -> &str {
		&self.type_name
	}

	fn object_found(&self, data: Map<String, Value>) {
		self.log
			.lock()
			.push(format!("{}:reset:{}", self.identifier(), Value::Object(data)));
	}

	fn method_invoked(&self, method: &str, _parameters: Vec<Value>) {
		self.log.lock().push(format!("{}:{}", self.identifier(), method));
		if method == "trigger" {
			self.channel.reset(true).unwrap();
		}
	}
}

impl Drop for TestObject {
	fn drop(&mut self) {
		self.channel.release(&*self);
	}
}

struct TestFactory {
	log: Log,
}

impl ObjectFactory for TestFactory {
	fn create_object(
		&self,
		connection: &Arc<Connection>,
		identifier: Arc<str>,
		type_info: &TypeDescriptor,
	) -> Result<Arc<dyn RemoteObject>> {
		self.log.lock().push(format!("create:{identifier}"));
		Ok(Arc::new(TestObject {
			channel: Channel::new(identifier, connection),
			type_name: type_info.name.clone(),
			log: Arc::clone(&self.log),
		}))
	}
}

fn create_test_connection(options: ConnectionOptions) -> (Arc<Connection>, PeerHandle, Log) {
	let (transport, peer) = memory_transport();
	let connection = Connection::with_transport(Box::new(transport), options).unwrap();
	let log: Log = Arc::default();
	connection.set_factory(Arc::new(TestFactory {
		log: Arc::clone(&log),
	}));
	(connection, peer, log)
}

fn version() -> Value {
	json!({"command": "VERSION", "version": 2})
}

fn creatable_types() -> Value {
	json!({"command": "CREATABLE_TYPES", "types": [{"name": "Note", "properties": {"text": "string"}}]})
}

fn emit(identifier: &str, method: &str) -> Value {
	json!({"command": "EMIT", "identifier": identifier, "method": method, "parameters": []})
}

fn established() -> (Arc<Connection>, PeerHandle, Log) {
	let (connection, peer, log) = create_test_connection(ConnectionOptions::default());
	peer.send_all([version(), creatable_types()]);
	connection.process_events().unwrap();
	assert_eq!(connection.state(), ConnectionState::Established);
	(connection, peer, log)
}

fn thing() -> TypeDescriptor {
	TypeDescriptor::named("Thing")
}

#[test]
fn test_handshake_in_order() {
	let (connection, peer, _) = create_test_connection(ConnectionOptions::default());
	assert_eq!(connection.state(), ConnectionState::WantVersion);

	peer.send(version());
	connection.process_events().unwrap();
	assert_eq!(connection.state(), ConnectionState::WantTypes);
	assert_eq!(connection.version(), Some(2));

	peer.send(creatable_types());
	connection.process_events().unwrap();
	assert_eq!(connection.state(), ConnectionState::Established);
	assert_eq!(connection.creatable_types()[0].name, "Note");
}

#[test]
fn test_types_before_version_are_queued() {
	let (connection, peer, _) = create_test_connection(ConnectionOptions::default());
	peer.send_all([creatable_types(), version()]);

	connection.process_events().unwrap();

	assert_eq!(connection.state(), ConnectionState::Established);
	assert_eq!(connection.version(), Some(2));
	assert!(connection.pending.lock().is_empty());
}

#[test]
fn test_object_commands_wait_for_handshake() {
	let (connection, peer, log) = create_test_connection(ConnectionOptions::default());
	peer.send(json!({"command": "ROOT", "identifier": "root", "type": {"name": "Root"}, "data": {"title": "hi"}}));
	peer.send_all([version(), creatable_types()]);

	connection.process_events().unwrap();

	assert_eq!(
		*log.lock(),
		vec!["create:root".to_string(), r#"root:reset:{"title":"hi"}"#.to_string()]
	);
	let root = connection.root().unwrap();
	assert_eq!(root.type_name(), "Root");
}

#[test]
fn test_ensure_types_steals_version_out_of_order() {
	let (connection, peer, _) = create_test_connection(ConnectionOptions::default());
	peer.send_all([creatable_types(), version()]);

	connection.ensure_types().unwrap();

	assert_eq!(connection.state(), ConnectionState::Established);
	assert!(connection.pending.lock().is_empty());
}

#[test]
fn test_host_ready_gates_established() {
	let options = ConnectionOptions::default().host_ready(false);
	let (connection, peer, log) = create_test_connection(options);
	peer.send_all([
		version(),
		creatable_types(),
		json!({"command": "ROOT", "identifier": "root", "type": {"name": "Root"}, "data": {}}),
	]);

	connection.process_events().unwrap();
	assert_eq!(connection.state(), ConnectionState::WantHostReady);
	assert!(log.lock().is_empty());
	assert_eq!(connection.pending.lock().len(), 1);
	assert!(matches!(connection.root(), Err(Error::ProtocolOrder(_))));
	assert!(!connection.is_closed());

	connection.set_host_ready().unwrap();
	assert_eq!(connection.state(), ConnectionState::Established);
	assert_eq!(log.lock()[0], "create:root");
	assert!(connection.root().is_ok());
}

#[test]
fn test_wait_steals_match_and_leaves_rest_pending() {
	let (connection, peer, log) = established();
	let _object = connection.ensure_object("x", &thing()).unwrap();
	peer.send_all([emit("x", "a"), emit("x", "b"), emit("x", "c")]);

	let message = connection
		.wait_for_message("c", |m| m.method() == Some("c"))
		.unwrap();

	assert_eq!(message.method(), Some("c"));
	assert_eq!(*log.lock(), vec!["create:x".to_string()]);
	assert_eq!(connection.pending.lock().len(), 2);

	connection.process_events().unwrap();
	assert_eq!(
		*log.lock(),
		vec!["create:x".to_string(), "x:a".to_string(), "x:b".to_string()]
	);
	assert!(connection.pending.lock().is_empty());
}

#[test]
fn test_synchronous_reset_runs_before_queued_messages() {
	let (connection, peer, log) = established();
	let _object = connection.ensure_object("x", &thing()).unwrap();
	peer.send_all([
		emit("x", "a"),
		emit("x", "b"),
		json!({"command": "OBJECT_RESET", "identifier": "x", "data": {"n": 1}}),
	]);

	connection.reset_object_data("x", true).unwrap();

	assert_eq!(
		*log.lock(),
		vec![
			"create:x".to_string(),
			r#"x:reset:{"n":1}"#.to_string(),
			"x:a".to_string(),
			"x:b".to_string(),
		]
	);
	assert!(connection.pending.lock().is_empty());
}

#[test]
fn test_wait_inside_handler() {
	let (connection, peer, log) = established();
	let _object = connection.ensure_object("x", &thing()).unwrap();
	peer.send_all([
		emit("x", "trigger"),
		emit("x", "other"),
		json!({"command": "OBJECT_RESET", "identifier": "x", "data": {"n": 1}}),
	]);

	connection.process_events().unwrap();

	assert_eq!(
		*log.lock(),
		vec![
			"create:x".to_string(),
			"x:trigger".to_string(),
			r#"x:reset:{"n":1}"#.to_string(),
			"x:other".to_string(),
		]
	);
	assert!(peer.sent_commands().contains(&"OBJECT_QUERY".to_string()));
}

#[test]
fn test_synchronous_reset_with_responder() {
	let (connection, peer, log) = established();
	let _object = connection.ensure_object("x", &thing()).unwrap();
	peer.respond_with(|frame| {
		if frame["command"] == "OBJECT_QUERY" {
			vec![json!({"command": "OBJECT_RESET", "identifier": frame["identifier"], "data": {"v": true}})]
		} else {
			vec![]
		}
	});

	connection.reset_object_data("x", true).unwrap();

	assert_eq!(log.lock().last().unwrap(), r#"x:reset:{"v":true}"#);
}

#[test]
fn test_timeout_is_fatal() {
	let (connection, _peer, _) = established();

	let err = connection
		.wait_for_message("never", |_| false)
		.unwrap_err();

	assert!(err.is_timeout(), "Expected timeout, got: {err:?}");
	assert!(connection.is_closed());
	match connection.process_events() {
		Err(Error::ConnectionClosed(reason)) => assert!(reason.contains("never")),
		other => panic!("Expected ConnectionClosed, got {other:?}"),
	}
}

#[test]
fn test_unknown_command_is_fatal() {
	let (connection, peer, _) = established();
	peer.send(json!({"command": "BOGUS"}));

	assert!(matches!(
		connection.process_events(),
		Err(Error::UnknownCommand(ref c)) if c == "BOGUS"
	));
	assert!(connection.is_closed());
}

#[test]
fn test_framing_error_is_fatal() {
	let (connection, peer, _) = create_test_connection(ConnectionOptions::default());
	peer.send_raw(b"x2 {}\n");

	assert!(matches!(connection.process_events(), Err(Error::Framing(_))));
	assert!(connection.is_closed());
}

#[test]
fn test_second_version_is_protocol_order_error() {
	let (connection, peer, _) = established();
	peer.send(version());

	assert!(matches!(
		connection.process_events(),
		Err(Error::ProtocolOrder(_))
	));
}

#[test]
fn test_ensure_object_is_deduplicated() {
	let (connection, peer, log) = established();

	let a = connection.ensure_object("x", &thing()).unwrap();
	let b = connection.ensure_object("x", &thing()).unwrap();

	assert!(Arc::ptr_eq(&a, &b));
	assert_eq!(log.lock().len(), 1);

	// A re-announcement under another type keeps the live proxy.
	let c = connection.ensure_object("x", &TypeDescriptor::named("Other")).unwrap();
	assert!(Arc::ptr_eq(&a, &c));
	assert_eq!(c.type_name(), "Thing");
	assert_eq!(
		peer.sent_commands()
			.iter()
			.filter(|c| *c == "OBJECT_REF")
			.count(),
		1
	);
}

#[test]
fn test_last_release_sends_deref() {
	let (connection, peer, _) = established();
	let object = connection.ensure_object("x", &thing()).unwrap();
	let clone = Arc::clone(&object);

	drop(object);
	assert!(connection.object("x").is_some());

	drop(clone);
	assert!(connection.object("x").is_none());
	assert_eq!(peer.sent().last().unwrap(), &json!({"command": "OBJECT_DEREF", "identifier": "x"}));
}

#[test]
fn test_stale_release_is_ignored() {
	let (connection, peer, _) = established();
	let y = connection.ensure_object("y", &thing()).unwrap();
	let z = connection.ensure_object("z", &thing()).unwrap();
	peer.take_sent();

	connection.remove_object("y", &*z).unwrap();
	connection.remove_object("unknown", &*z).unwrap();

	assert!(peer.sent().is_empty());
	assert!(Arc::ptr_eq(&connection.object("y").unwrap(), &y));
}

#[test]
fn test_writes_before_attach_are_buffered() {
	let connection = Connection::new(ConnectionOptions::default());
	connection.invoke_method("x", "ping", vec![json!(1)]).unwrap();
	connection
		.send(&Outbound::ObjectQuery {
			identifier: "x".into(),
		})
		.unwrap();

	let (transport, peer) = memory_transport();
	assert!(peer.sent().is_empty());
	connection.attach_transport(Box::new(transport)).unwrap();

	assert_eq!(peer.sent_commands(), vec!["INVOKE", "OBJECT_QUERY"]);

	let (second, _) = memory_transport();
	assert!(matches!(
		connection.attach_transport(Box::new(second)),
		Err(Error::Transport(_))
	));
}

#[test]
fn test_byte_at_a_time_delivery() {
	let (connection, peer, _) = create_test_connection(ConnectionOptions::default());
	peer.set_chunk_size(1);
	peer.send_all([version(), creatable_types()]);

	for _ in 0..1000 {
		if connection.state() == ConnectionState::Established {
			break;
		}
		connection.process_events().unwrap();
	}

	assert_eq!(connection.state(), ConnectionState::Established);
}

#[test]
fn test_instantiate_sends_create() {
	let (connection, peer, _) = established();
	peer.take_sent();

	let first = connection.instantiate("Note").unwrap();
	let second = connection.instantiate("Note").unwrap();

	assert_ne!(first.identifier(), second.identifier());
	let sent = peer.sent();
	assert_eq!(sent[0]["command"], "OBJECT_CREATE");
	assert_eq!(sent[0]["typeName"], "Note");
	assert_eq!(sent[0]["identifier"], first.identifier());
	assert!(!peer.sent_commands().contains(&"OBJECT_REF".to_string()));

	assert!(matches!(
		connection.instantiate("Missing"),
		Err(Error::UnknownType(_))
	));
}

#[test]
fn test_run_returns_when_peer_closes() {
	let (connection, peer, log) = established();
	let _object = connection.ensure_object("x", &thing()).unwrap();
	peer.send(emit("x", "last"));
	peer.close();

	connection.run().unwrap();

	assert_eq!(log.lock().last().unwrap(), "x:last");
	assert!(connection.is_closed());
}

#[test]
fn test_root_with_other_identifier_is_ignored() {
	let (connection, peer, log) = established();
	peer.send(json!({"command": "ROOT", "identifier": "elsewhere", "type": {"name": "Root"}, "data": {}}));

	connection.process_events().unwrap();

	assert!(log.lock().is_empty());
	assert!(!connection.is_closed());
}

#[test]
fn test_background_write_failure_is_fatal() {
	let (connection, peer, _) = established();
	peer.break_writes("broken pipe");

	// The write is accepted; the failure only shows up afterwards.
	connection.invoke_method("x", "ping", Vec::new()).unwrap();
	assert!(matches!(connection.poll(Duration::ZERO), Err(Error::Transport(_))));
	assert!(connection.is_closed());
	assert!(matches!(connection.close_reason(), Some(Error::Transport(_))));
}

#[test]
fn test_run_reports_write_failure() {
	let (connection, peer, _) = established();
	connection.invoke_method("x", "ping", Vec::new()).unwrap();
	peer.break_writes("broken pipe");

	assert!(matches!(connection.run(), Err(Error::Transport(_))));
}
