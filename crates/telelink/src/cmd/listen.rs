use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use telelink_transport::{ChannelId, ConnectionFactory, Handlers, Identity, LinkEvent, Message};
use tracing::info;

use crate::cmd::{parse_duration, ListenArgs};
use crate::exit::{link_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_message, OutputFormat};

const POLL: Duration = Duration::from_millis(200);

enum Received {
    Message(Message, ChannelId),
    Failed(CliError),
}

pub fn run(args: ListenArgs, format: OutputFormat, identity: Identity) -> CliResult<i32> {
    let idle_timeout = args.idle_timeout.as_deref().map(parse_duration).transpose()?;
    let (tx, rx) = mpsc::channel();
    let messages = tx.clone();
    let handlers = Handlers::new()
        .on_message(move |message, channel| {
            let _ = messages.send(Received::Message(message.clone(), channel));
        })
        .on_event(move |event| match event {
            LinkEvent::Failed(err) => {
                let _ = tx.send(Received::Failed(transport_error("link failed", err)));
            }
            LinkEvent::PeerConnected { channel, addr } => info!(%channel, %addr, "peer connected"),
            LinkEvent::PeerDisconnected { channel, addr } => {
                info!(%channel, %addr, "peer disconnected")
            }
            LinkEvent::Decode { channel, error } => info!(%channel, %error, "bad frame"),
            LinkEvent::Closed => {}
        });

    let conn = ConnectionFactory::shared()
        .open_subscribed(&args.url, identity.system_id, identity.component_id, handlers)
        .map_err(|err| link_error("open failed", &err))?;
    info!(
        channel = %conn.channel(),
        transport = conn.transport_name(),
        local_addr = ?conn.local_addr(),
        "listening"
    );

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    let mut last_activity = Instant::now();

    while running.load(Ordering::SeqCst) {
        let (message, channel) = match rx.recv_timeout(POLL) {
            Ok(Received::Message(message, channel)) => (message, channel),
            Ok(Received::Failed(err)) => return Err(err),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if let Some(limit) = idle_timeout {
                    if last_activity.elapsed() >= limit {
                        return Err(CliError::new(
                            TIMEOUT,
                            format!("no messages for {}ms", limit.as_millis()),
                        ));
                    }
                }
                continue;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };
        last_activity = Instant::now();

        if let Some(ids) = &args.msg_ids {
            if !ids.contains(&message.msg_id) {
                continue;
            }
        }

        print_message(&message, channel, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                return Ok(SUCCESS);
            }
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
