//! Dial loop: opens a transport, starts a generation's loops, and backs off
//! between failed attempts until the attempt ceiling.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sio_core::error::SioError;

use crate::events::{ConnectionState, LifecycleEvent};
use crate::session::{Generation, LoopContext, Shared};
use crate::transport::TransportSession;
use crate::{reader, watchdog, writer};

/// Run the dial loop in the background.
pub(crate) fn spawn(shared: Arc<Shared>, run: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run_connector(shared, run))
}

async fn run_connector(shared: Arc<Shared>, run: CancellationToken) {
    let _dial = shared.dial_lock.lock().await;
    // Failed dials in this sequence; `attempts` starts above zero when the
    // watchdog begins it.
    let mut failed_dials = 0u32;

    loop {
        if run.is_cancelled() {
            debug!("[{}] dial cancelled", shared.name);
            return;
        }

        let attempt = shared.attempts().await;
        if attempt > 0 {
            shared.emit(LifecycleEvent::Reconnecting, Some(attempt.to_string()));
            shared.set_state(ConnectionState::Reconnecting).await;
        } else {
            shared.emit(LifecycleEvent::Connecting, None);
            shared.set_state(ConnectionState::Connecting).await;
        }

        shared.retire_generation().await;

        let cancel = run.child_token();
        info!("[{}] dialing {} (attempt {attempt})", shared.name, shared.target);
        let opened = tokio::select! {
            _ = run.cancelled() => {
                debug!("[{}] dial cancelled", shared.name);
                return;
            }
            opened = TransportSession::open(
                &shared.target,
                shared.options.connect_timeout,
                shared.options.max_message_size,
                cancel.child_token(),
            ) => opened,
        };

        let err = match opened {
            Ok(session) => {
                start_generation(&shared, session, cancel, run).await;
                return;
            }
            Err(err) => err,
        };
        if run.is_cancelled() {
            return;
        }

        let event = if attempt == 0 {
            LifecycleEvent::ConnectError
        } else {
            LifecycleEvent::ReconnectError
        };
        warn!("[{}] {event}: {err}", shared.name);
        shared.emit(event, Some(err.to_string()));
        shared.set_state(ConnectionState::Error).await;

        failed_dials += 1;
        if failed_dials >= shared.options.reconnect.max_attempts {
            let err = SioError::ReconnectExhausted { attempts: failed_dials };
            error!("[{}] {err}", shared.name);
            shared.emit(LifecycleEvent::ReconnectFailed, None);
            return;
        }

        let delay = shared.options.reconnect.retry_delay(attempt);
        shared.set_attempts(attempt + 1).await;
        debug!("[{}] retrying in {delay:?}", shared.name);
        tokio::select! {
            _ = run.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn start_generation(
    shared: &Arc<Shared>,
    session: TransportSession,
    cancel: CancellationToken,
    run: CancellationToken,
) {
    let TransportSession {
        reader: frames_in,
        writer: frames_out,
        handle,
    } = session;

    let id = shared.next_generation_id();
    shared.set_awaiting_pong(false);

    let ctx = LoopContext {
        shared: shared.clone(),
        generation: id,
        heartbeat: cancel.child_token(),
        cancel: cancel.clone(),
        run,
        transport: handle.clone(),
        ever_connected: Arc::new(AtomicBool::new(false)),
    };
    let tasks = vec![
        tokio::spawn(reader::run(ctx.clone(), frames_in)),
        tokio::spawn(writer::run(ctx.clone(), frames_out)),
        tokio::spawn(watchdog::run(ctx.clone())),
    ];
    debug!("[{}] generation {id} started", shared.name);

    shared
        .install_generation(Generation {
            id,
            cancel,
            heartbeat: ctx.heartbeat,
            transport: handle,
            tasks,
        })
        .await;
}
