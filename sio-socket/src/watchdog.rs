//! Heartbeat watchdog: pings the server on a jittered period and starts
//! recovery when a pong is late or the transport dies.

use std::time::Duration;

use tracing::{debug, info, trace};

use sio_core::constants::reasons;

use crate::connector;
use crate::events::{ConnectionState, LifecycleEvent};
use crate::packet::Packet;
use crate::session::LoopContext;

enum Beat {
    Pong,
    Timeout,
    TransportClosed,
}

pub(crate) async fn run(ctx: LoopContext) {
    debug!("[{}] watchdog started (generation {})", ctx.name(), ctx.generation);
    let heartbeat = ctx.shared.options.heartbeat.clone();
    let mut pong_rx = ctx.shared.pong_receiver();

    loop {
        let period = heartbeat.next_period();
        tokio::select! {
            biased;
            _ = ctx.heartbeat.cancelled() => return,
            _ = ctx.transport.closed() => {
                recover(&ctx, Beat::TransportClosed).await;
                return;
            }
            _ = tokio::time::sleep(period) => {}
        }

        ctx.shared.set_awaiting_pong(true);
        ctx.shared.send_packet(&Packet::ping());

        let beat = tokio::select! {
            biased;
            _ = ctx.heartbeat.cancelled() => return,
            _ = ctx.transport.closed() => Beat::TransportClosed,
            answered = tokio::time::timeout(
                heartbeat.ping_timeout,
                async { pong_rx.wait_for(|awaiting| !*awaiting).await.is_ok() },
            ) => match answered {
                Ok(true) => Beat::Pong,
                _ => Beat::Timeout,
            },
        };

        match beat {
            Beat::Pong => trace!("[{}] heartbeat ok", ctx.name()),
            beat => {
                recover(&ctx, beat).await;
                return;
            }
        }
    }
}

async fn recover(ctx: &LoopContext, beat: Beat) {
    if ctx.cancel.is_cancelled() {
        debug!("[{}] generation {} retired, no recovery", ctx.name(), ctx.generation);
        return;
    }
    let state = ctx.shared.state().await;
    if state == ConnectionState::Disconnected {
        // A requested close or a server disconnect is in progress.
        return;
    }
    ctx.shared.clear_socket_id().await;

    if ctx.transport.is_open() {
        if let Beat::Timeout = beat {
            info!("[{}] no pong within {:?}", ctx.name(), ctx.shared.options.heartbeat.ping_timeout);
        }
        ctx.shared.emit(
            LifecycleEvent::Disconnect,
            Some(reasons::PING_TIMEOUT.to_string()),
        );
    } else if state == ConnectionState::Connected {
        ctx.shared.emit(
            LifecycleEvent::Disconnect,
            Some(reasons::TRANSPORT_CLOSE.to_string()),
        );
    }

    let reconnect = &ctx.shared.options.reconnect;
    if !reconnect.enabled {
        info!("[{}] automatic reconnection is disabled", ctx.name());
        return;
    }

    ctx.shared.set_state(ConnectionState::Reconnecting).await;
    let attempt = ctx.shared.attempts().await;
    let delay: Duration = reconnect.recovery_delay(attempt);
    ctx.shared.set_attempts(attempt + 1).await;
    info!("[{}] reconnecting in {delay:?} (attempt {})", ctx.name(), attempt + 1);

    tokio::select! {
        _ = ctx.cancel.cancelled() => return,
        _ = tokio::time::sleep(delay) => {}
    }

    // The connector retires this generation, so it must not be awaited here.
    connector::spawn(ctx.shared.clone(), ctx.run.clone());
}
