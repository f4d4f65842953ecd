#![forbid(unsafe_code)]

use bytes::Bytes;
use relay_client_core::{Session, SessionConfig, SessionHandler};
use relay_domain::{MessageId, extract_tags};
use relay_util::endpoint::TcpEndpoint;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::{info, warn};

const DEFAULT_SERVER_ENDPOINT: &str = "tcp://127.0.0.1:8888";

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: relay_client [--connect tcp://host:port] [--user name]\n\
\n\
Options:\n\
	--connect   Relay endpoint (default: tcp://127.0.0.1:8888)\n\
	            Format: tcp://host:port\n\
	--user      Display name (default: user-<pid>)\n\
	--help      Show this help\n\
\n\
Commands once connected:\n\
	<text>              Send a message\n\
	/reply <id> <text>  Reply to message <id>\n\
	/image <path>       Send a file as an image\n\
	/audio <path>       Send a file as audio\n\
	/quit               Exit\n"
	);
	std::process::exit(2)
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,relay_client_core=debug".to_string());
	tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn parse_args() -> (TcpEndpoint, String) {
	let mut endpoint = DEFAULT_SERVER_ENDPOINT.to_string();
	let mut username = format!("user-{}", std::process::id());

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--connect" | "--endpoint" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--connect must be non-empty (expected tcp://host:port)");
					usage_and_exit();
				}
				endpoint = v;
			}
			"--user" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--user must be non-empty");
					usage_and_exit();
				}
				username = v;
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	let endpoint = TcpEndpoint::parse(&endpoint).unwrap_or_else(|e| {
		eprintln!("Invalid --connect value: {e}");
		usage_and_exit();
	});

	(endpoint, username)
}

struct PrintHandler;

impl SessionHandler for PrintHandler {
	fn on_text(&mut self, id: MessageId, sender: &str, body: &str) {
		let tags = extract_tags(body);
		if tags.is_empty() {
			println!("[{id}] {sender}: {body}");
		} else {
			println!("[{id}] {sender}: {body}   (mentions: {})", tags.join(", "));
		}
	}

	fn on_reply(&mut self, id: MessageId, reply_to: MessageId, reply_preview: &str, body: &str) {
		println!("[{id}] reply to [{reply_to}] \"{reply_preview}\": {body}");
	}

	fn on_image(&mut self, bytes: &Bytes) {
		println!("[image] {} bytes received", bytes.len());
	}

	fn on_audio(&mut self, bytes: &Bytes) {
		println!("[audio] {} bytes received", bytes.len());
	}

	fn on_disconnected(&mut self) {
		println!("-- server closed the connection --");
	}
}

async fn send_file(session: &Session, path: &str, as_audio: bool) {
	let bytes = match tokio::fs::read(path).await {
		Ok(bytes) => Bytes::from(bytes),
		Err(e) => {
			warn!(path, error = %e, "failed to read file");
			return;
		}
	};

	let result = if as_audio {
		session.send_audio(bytes).await
	} else {
		session.send_image(bytes).await
	};
	if let Err(e) = result {
		warn!(path, error = %e, "failed to send file");
	}
}

async fn handle_line(session: &Session, line: &str) -> bool {
	let line = line.trim();
	if line.is_empty() {
		return true;
	}

	if line == "/quit" {
		return false;
	}

	if let Some(rest) = line.strip_prefix("/reply ") {
		let Some((id_s, text)) = rest.trim().split_once(' ') else {
			eprintln!("usage: /reply <id> <text>");
			return true;
		};
		let Ok(target) = id_s.parse::<MessageId>() else {
			eprintln!("invalid message id: {id_s}");
			return true;
		};

		session.begin_reply(target);
		if let Err(e) = session.send_reply(text.trim()).await {
			warn!(error = %e, "failed to send reply");
		}
		return true;
	}

	if let Some(path) = line.strip_prefix("/image ") {
		send_file(session, path.trim(), false).await;
		return true;
	}

	if let Some(path) = line.strip_prefix("/audio ") {
		send_file(session, path.trim(), true).await;
		return true;
	}

	if let Err(e) = session.send_text(line).await {
		warn!(error = %e, "failed to send message");
	}
	true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();
	let (endpoint, username) = parse_args();

	let cfg = SessionConfig {
		server_host: endpoint.host.trim_matches(['[', ']']).to_string(),
		server_port: endpoint.port,
		server_addr: endpoint.to_socket_addr_if_ip_literal().ok(),
		username,
		..SessionConfig::default()
	};

	info!(server = %endpoint.hostport(), user = %cfg.username, "connecting");
	let (session, events) = Session::connect(cfg).await?;
	println!("connected; type a message, or /quit to exit");

	let mut events_task = tokio::spawn(async move {
		let mut handler = PrintHandler;
		events.run(&mut handler).await
	});

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	loop {
		tokio::select! {
			line = lines.next_line() => {
				match line? {
					Some(line) => {
						if !handle_line(&session, &line).await {
							break;
						}
					}
					None => break,
				}
			}
			result = &mut events_task => {
				if let Ok(Err(e)) = result {
					warn!(error = %e, "session ended with error");
				}
				return Ok(());
			}
		}
	}

	events_task.abort();
	let _ = events_task.await;
	Ok(())
}
