//! chatstitch command-line client
//!
//! Sends one message to the configured chat endpoint and prints the reply as
//! it streams in.

use chatstitch::cancel::CancelGate;
use chatstitch::cli::{Cli, Command, generate_config_template};
use chatstitch::client::ChatClient;
use chatstitch::config::Config;
use chatstitch::conversation::{Conversation, ConversationMessage};
use chatstitch::error::AppError;
use chatstitch::metrics::Metrics;
use chatstitch::reconciler::Termination;
use chatstitch::request_id::RequestId;
use chatstitch::session::{ChatSession, SendOptions};
use chatstitch::telemetry;
use chatstitch::updater::{ConversationStore, JsonFileStore, MemoryStore, StreamObserver};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Prints newly published text to stdout
struct StdoutObserver {
    printed: String,
    publications: Arc<AtomicUsize>,
}

impl StreamObserver for StdoutObserver {
    fn on_publish(&mut self, conversation: &Conversation) {
        self.publications.fetch_add(1, Ordering::SeqCst);
        let Some(message) = conversation.last_message() else {
            return;
        };
        let content = message.content.as_str();
        let mut stdout = std::io::stdout().lock();
        let result = match content.strip_prefix(self.printed.as_str()) {
            Some(delta) => stdout.write_all(delta.as_bytes()),
            // Earlier text was rewritten; start a fresh line with the full reply.
            None => writeln!(stdout).and_then(|()| stdout.write_all(content.as_bytes())),
        };
        if let Err(e) = result.and_then(|()| stdout.flush()) {
            tracing::warn!(error = %e, "Failed to write to stdout");
        }
        self.printed = content.to_string();
    }

    fn on_status(&mut self, status: &serde_json::Value) {
        tracing::info!(status = %status, "Status update");
    }

    fn on_error(&mut self, error: &AppError) {
        if error.is_user_visible() {
            eprintln!("error: {}", error);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (message, conversation_id, abort_after, print_metrics, save_dir) = match cli.command {
        Command::Config { output } => {
            let template = generate_config_template();
            match output {
                Some(path) => {
                    std::fs::write(&path, template)?;
                    eprintln!("Wrote configuration template to {}", path);
                }
                None => print!("{}", template),
            }
            return Ok(());
        }
        Command::Kill { request_id } => {
            let config = Config::from_file(&cli.config)?;
            telemetry::init(&config.observability.log_level);
            let request_id: RequestId = request_id
                .parse()
                .map_err(|e| AppError::Validation(format!("invalid request id: {}", e)))?;
            ChatClient::new(&config.client)?
                .kill_request(request_id)
                .await?;
            eprintln!("Kill request for {} accepted", request_id);
            return Ok(());
        }
        Command::Send {
            message,
            conversation_id,
            abort_after,
            metrics,
            save_dir,
        } => (message, conversation_id, abort_after, metrics, save_dir),
    };

    let config = Config::from_file(&cli.config)?;
    telemetry::init(&config.observability.log_level);

    let metrics = Metrics::new()?;
    let client = ChatClient::new(&config.client)?.with_metrics(metrics.clone());
    let store: Box<dyn ConversationStore> = match save_dir {
        Some(dir) => Box::new(JsonFileStore::new(dir)),
        None => Box::new(MemoryStore::new()),
    };
    let session = ChatSession::new(client, config, store).with_metrics(metrics);

    let conversation_id = conversation_id.unwrap_or_else(|| RequestId::new().to_string());
    let conversation = Conversation::new(conversation_id).append(ConversationMessage::user(message));

    let publications = Arc::new(AtomicUsize::new(0));
    let gate = match abort_after {
        Some(limit) => {
            let seen = publications.clone();
            CancelGate::with_predicate(move || seen.load(Ordering::SeqCst) >= limit)
        }
        None => CancelGate::new(),
    };

    let interrupt = gate.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let request_id = RequestId::new();
    eprintln!("request id: {}", request_id);
    let options = SendOptions {
        request_id: Some(request_id),
        ..SendOptions::default()
    };

    let mut observer = StdoutObserver {
        printed: String::new(),
        publications,
    };
    let outcome = session
        .send_with(&conversation, options, gate, &mut observer)
        .await?;
    println!();

    match &outcome.termination {
        Termination::Completed { finish_reason } => {
            tracing::debug!(finish_reason = ?finish_reason, "Reply complete");
        }
        Termination::Aborted => eprintln!("(aborted; partial reply kept)"),
        Termination::Failed(e) => eprintln!("stream failed: {}", e),
    }

    if print_metrics && let Some(metrics) = session.metrics() {
        print!("{}", metrics.gather()?);
    }

    if let Termination::Failed(_) = outcome.termination {
        std::process::exit(1);
    }
    Ok(())
}
