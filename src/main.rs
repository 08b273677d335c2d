//! Maildrop - file-backed threaded messaging for agent coordination
//!
//! Main entry point for the maildrop CLI.

use clap::{Parser, Subcommand};
use maildrop::mail::{
    parse_actions, MessageKind, NotifyStatus, Postmaster, PullView, SendOutcome, SendRequest,
    ThreadEntry, ThreadMessage, ThreadStatus,
};
use maildrop::{MaildropConfig, MaildropError};
use chrono::SecondsFormat;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

/// Maildrop - threaded agent messaging over a shared filesystem
#[derive(Parser, Debug)]
#[command(name = "maildrop")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Messaging store root (holds agents/ and msg/)
    #[arg(long, env = "MAILDROP_ROOT", default_value = "messaging")]
    root: PathBuf,

    /// Notification allow-list document (default: <root>/allowlist.yaml)
    #[arg(long, env = "MAILDROP_ALLOWLIST")]
    allowlist: Option<PathBuf>,

    /// External notifier command; notifications are dropped without it
    #[arg(long, env = "MAILDROP_NOTIFY_CMD")]
    notify_cmd: Option<PathBuf>,

    /// Seconds to wait for one notifier invocation
    #[arg(long, env = "MAILDROP_NOTIFY_TIMEOUT", default_value = "5")]
    notify_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a message to one or more agents
    Send {
        /// Sender agent id
        #[arg(long, visible_alias = "agent")]
        from: String,

        /// Recipient agent id (repeat for multiple recipients)
        #[arg(long = "to", required = true)]
        to: Vec<String>,

        /// Subject line
        #[arg(long, default_value = "(no subject)")]
        subject: String,

        /// Inline message body
        #[arg(long, conflicts_with = "body_file")]
        body: Option<String>,

        /// Read the message body from a file
        #[arg(long)]
        body_file: Option<PathBuf>,

        /// Message kind (STATUS, RESULT, or caller-defined)
        #[arg(long = "type", default_value = "STATUS")]
        kind: String,

        /// Work status for STATUS messages (TODO, IN_PROGRESS, BLOCKED)
        #[arg(long)]
        status: Option<String>,

        /// Comma-separated actions expected from the recipient
        #[arg(long)]
        actions: Option<String>,

        /// Continue an existing thread instead of opening a new one
        #[arg(long)]
        thread: Option<String>,

        /// Reference to a related message
        #[arg(long)]
        relates_to: Option<String>,

        /// Skip the notification gate for this send
        #[arg(long)]
        no_notify: bool,

        /// Project id carried in notification metadata
        #[arg(long, env = "MAILDROP_PROJECT_ID", default_value = "default")]
        project: String,

        /// Provider carried in notification metadata
        #[arg(long, env = "MAILDROP_PROVIDER", default_value = "local")]
        provider: String,

        /// Session prefix carried in notification metadata
        #[arg(long, env = "MAILDROP_SESSION_PREFIX", default_value = "maildrop")]
        session_prefix: String,
    },

    /// List an agent's threads, or show one thread
    Pull {
        /// Agent whose mailbox to read
        #[arg(long)]
        agent: String,

        /// Show only this thread
        #[arg(long)]
        thread: Option<String>,

        /// Include message details
        #[arg(long)]
        show: bool,
    },
}

fn main() {
    if let Err(e) = maildrop::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("[maildrop] {}", e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> maildrop::Result<i32> {
    let mut config = MaildropConfig::new(&cli.root)
        .with_notify_timeout(Duration::from_secs(cli.notify_timeout));
    if let Some(allowlist) = &cli.allowlist {
        config = config.with_allowlist(allowlist);
    }
    if let Some(notify_cmd) = &cli.notify_cmd {
        config = config.with_notify_command(notify_cmd);
    }

    match cli.command {
        Commands::Send {
            from,
            to,
            subject,
            body,
            body_file,
            kind,
            status,
            actions,
            thread,
            relates_to,
            no_notify,
            project,
            provider,
            session_prefix,
        } => {
            let config = config
                .with_project(project)
                .with_provider(provider)
                .with_session_prefix(session_prefix);
            let body = resolve_body(body, body_file)?;

            let mut request = SendRequest::new(from, to, subject, body)
                .with_kind(MessageKind::parse(&kind));
            if let Some(status) = status {
                request = request.with_status(ThreadStatus::parse(&status));
            }
            if let Some(actions) = actions {
                request = request.with_actions(parse_actions(&actions));
            }
            if let Some(thread) = thread {
                request = request.with_thread(thread);
            }
            if let Some(relates_to) = relates_to {
                request = request.with_relates_to(relates_to);
            }
            if no_notify {
                request = request.without_notify();
            }

            let postmaster = Postmaster::new(config);
            let report = postmaster.send(&request)?;
            print_send_report(&report);
            Ok(if report.all_delivered() { 0 } else { 1 })
        }

        Commands::Pull {
            agent,
            thread,
            show,
        } => {
            let postmaster = Postmaster::new(config);
            let view = postmaster.pull(&agent, thread.as_deref(), show)?;
            print_pull_view(&agent, &view);
            Ok(0)
        }
    }
}

/// Resolve the message body from inline text or a referenced file
fn resolve_body(body: Option<String>, body_file: Option<PathBuf>) -> maildrop::Result<String> {
    match (body, body_file) {
        (Some(body), None) => Ok(body),
        (None, Some(path)) => std::fs::read_to_string(&path).map_err(|e| {
            MaildropError::Validation(format!("cannot read --body-file {}: {}", path.display(), e))
        }),
        // clap rejects --body together with --body-file
        _ => Err(MaildropError::Validation(
            "message body is empty (--body or --body-file)".to_string(),
        )),
    }
}

fn print_send_report(report: &maildrop::mail::SendReport) {
    for outcome in &report.outcomes {
        match outcome {
            SendOutcome::Delivered(delivery) => {
                println!(
                    "[maildrop] message {} stored ({})",
                    delivery.file, delivery.pointer
                );
                match &delivery.notify {
                    NotifyStatus::Sent => {
                        println!("[maildrop] notification queued for {}", delivery.recipient);
                    }
                    NotifyStatus::NotEligible => {
                        println!(
                            "[maildrop] auto-notification skipped for {} (not on the allow-list)",
                            delivery.recipient
                        );
                    }
                    NotifyStatus::AllowlistUnavailable => {
                        println!(
                            "[maildrop] auto-notification skipped for {} (allow-list unavailable)",
                            delivery.recipient
                        );
                    }
                    NotifyStatus::Failed(message) => {
                        println!(
                            "[maildrop] warning: notification for {} failed: {}",
                            delivery.recipient, message
                        );
                    }
                    NotifyStatus::Disabled => {}
                }
            }
            SendOutcome::Failed { recipient, error } => {
                println!("[maildrop] delivery to {} failed: {}", recipient, error);
            }
        }
    }
}

fn print_pull_view(agent: &str, view: &PullView) {
    match view {
        PullView::Overview(lines) => {
            if lines.is_empty() {
                println!("[maildrop] no threads for {}", agent);
                return;
            }
            for line in lines {
                println!("{}", format_thread_line(&line.entry));
                if let Some(last) = &line.last {
                    println!(
                        "  -> {} -> {} :: {}",
                        last.message.from, last.message.to, last.message.subject
                    );
                }
            }
        }
        PullView::Thread { entry, messages } => {
            println!("{}", format_thread_line(entry));
            for message in messages {
                print_message_detail(message);
            }
        }
    }
}

fn format_thread_line(entry: &ThreadEntry) -> String {
    format!(
        "{} [{}] {} ({})",
        entry.tid,
        entry.status,
        entry.summary.as_deref().unwrap_or(""),
        entry.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

fn print_message_detail(message: &ThreadMessage) {
    println!("---");
    let status = message
        .message
        .status
        .as_ref()
        .map(|s| format!(" ({})", s))
        .unwrap_or_default();
    println!("{}{} - {}", message.message.kind, status, message.file);
    println!("from {} -> {}", message.message.from, message.message.to);
    println!("subject: {}", message.message.subject);
    println!("{}", message.message.body);
    if let Some(actions) = &message.message.actions_expected {
        println!("actions_expected: {}", actions.join(", "));
    }
}
