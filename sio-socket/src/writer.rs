//! Writer loop: drains the outbound queue onto the transport.

use tracing::{debug, trace, warn};

use crate::events::{ConnectionState, LifecycleEvent};
use crate::session::LoopContext;
use crate::transport::FrameWriter;

pub(crate) async fn run(ctx: LoopContext, mut frames: FrameWriter) {
    debug!("[{}] writer started (generation {})", ctx.name(), ctx.generation);
    let stale_after = ctx.shared.options.stale_after;

    loop {
        let entry = tokio::select! {
            _ = ctx.transport.closed() => break,
            entry = ctx.shared.outbound.dequeue(&ctx.cancel) => match entry {
                Some(entry) => entry,
                None => break,
            },
        };

        if entry.is_stale(stale_after) {
            debug!(
                "[{}] dropped stale frame queued {:?} ago: {}",
                ctx.name(),
                entry.age(),
                entry.frame()
            );
            continue;
        }

        let sent = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            sent = frames.send_text(entry.frame()) => sent,
        };
        match sent {
            Ok(()) => {
                trace!("[{}] -> {}", ctx.name(), entry.frame());
                entry.mark_sent();
            }
            Err(err) => {
                if ctx.cancel.is_cancelled() {
                    break;
                }
                warn!("[{}] send failed: {err}", ctx.name());
                ctx.shared.emit(LifecycleEvent::Error, Some(err.to_string()));
                ctx.transport.abort();
                ctx.shared.set_state(ConnectionState::Error).await;
                break;
            }
        }
    }

    debug!("[{}] writer stopped (generation {})", ctx.name(), ctx.generation);
}
