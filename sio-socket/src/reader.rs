//! Reader loop: decodes inbound frames and turns them into state changes,
//! events and replies.

use std::ops::ControlFlow;

use tracing::{debug, info, trace, warn};

use sio_core::constants::reasons;
use sio_core::error::SioError;

use crate::events::{ConnectionState, LifecycleEvent, SocketEvent};
use crate::packet::{self, EnginePacketType, OpenHandshake, Packet, SocketPacketType};
use crate::session::LoopContext;
use crate::transport::{Frame, FrameReader};

pub(crate) async fn run(ctx: LoopContext, mut frames: FrameReader) {
    debug!("[{}] reader started (generation {})", ctx.name(), ctx.generation);

    loop {
        let frame = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            frame = frames.next_frame() => frame,
        };

        match frame {
            Ok(Frame::Text(text)) => {
                if handle_text(&ctx, &text).await.is_break() {
                    break;
                }
            }
            Ok(Frame::Binary(len)) => {
                warn!("[{}] dropped {len} byte binary frame, binary payloads are not supported", ctx.name());
            }
            Ok(Frame::Control) => {}
            Ok(Frame::Close(reason)) => {
                handle_close(&ctx, reason).await;
                break;
            }
            Err(err) => {
                if ctx.cancel.is_cancelled() {
                    break;
                }
                let reason = if err.is_transport_close() {
                    reasons::TRANSPORT_CLOSE
                } else {
                    reasons::TRANSPORT_ERROR
                };
                debug!("[{}] read failed: {err}", ctx.name());
                ctx.fail_transport(reason).await;
                break;
            }
        }
    }

    debug!("[{}] reader stopped (generation {})", ctx.name(), ctx.generation);
}

async fn handle_close(ctx: &LoopContext, reason: Option<String>) {
    debug!("[{}] server closed the websocket: {reason:?}", ctx.name());
    if ctx.shared.state().await == ConnectionState::Disconnected {
        // Close we asked for: end the generation quietly.
        info!("[{}] socket closed", ctx.name());
        ctx.shared.emit(LifecycleEvent::Close, None);
        ctx.transport.abort();
        ctx.cancel.cancel();
    } else {
        ctx.fail_transport(reasons::TRANSPORT_CLOSE).await;
    }
}

async fn handle_text(ctx: &LoopContext, text: &str) -> ControlFlow<()> {
    let packet = match Packet::decode(text) {
        Ok(packet) => packet,
        Err(err) => {
            warn!("[{}] dropped frame: {err}", ctx.name());
            return ControlFlow::Continue(());
        }
    };
    trace!("[{}] <- {text}", ctx.name());

    match packet.engine_type() {
        EnginePacketType::Open => handle_open(ctx, packet.payload()).await,
        EnginePacketType::Close => {
            info!("[{}] server closed the session", ctx.name());
            ctx.transport.abort();
            return ControlFlow::Break(());
        }
        EnginePacketType::Ping => {
            ctx.shared
                .send_packet(&Packet::engine(EnginePacketType::Pong, packet.payload()));
        }
        EnginePacketType::Pong => ctx.shared.set_awaiting_pong(false),
        EnginePacketType::Message if !ctx.was_connected() => {
            let err = SioError::ProtocolViolation("message before open handshake".into());
            warn!("[{}] dropped {text}: {err}", ctx.name());
        }
        EnginePacketType::Message => handle_message(ctx, &packet).await,
    }
    ControlFlow::Continue(())
}

async fn handle_open(ctx: &LoopContext, payload: &str) {
    let handshake = match OpenHandshake::parse(payload) {
        Ok(handshake) => handshake,
        Err(err) => {
            warn!("[{}] ignored open packet: {err}", ctx.name());
            return;
        }
    };
    debug!(
        "[{}] handshake: ping interval {}ms, ping timeout {}ms, upgrades {:?}",
        ctx.name(),
        handshake.ping_interval,
        handshake.ping_timeout,
        handshake.upgrades
    );

    ctx.shared.record_open(handshake.sid).await;
    ctx.shared.emit(LifecycleEvent::Open, None);
    ctx.shared.emit(LifecycleEvent::Connect, None);
    ctx.mark_connected();
}

async fn handle_message(ctx: &LoopContext, packet: &Packet) {
    if !packet.has_default_namespace() {
        let err = SioError::ProtocolViolation(format!(
            "packet for namespace {} on a default-namespace client",
            packet.namespace()
        ));
        warn!("[{}] {err}", ctx.name());
        return;
    }

    match packet.socket_type() {
        Some(SocketPacketType::Connect) => {
            debug!("[{}] namespace {} connected", ctx.name(), packet.namespace());
        }
        Some(SocketPacketType::Disconnect) => {
            info!("[{}] server disconnected the namespace", ctx.name());
            ctx.heartbeat.cancel();
            ctx.shared.set_state(ConnectionState::Disconnected).await;
            ctx.shared.emit(
                LifecycleEvent::Disconnect,
                Some(reasons::SERVER_DISCONNECT.to_string()),
            );
        }
        Some(SocketPacketType::Event) if packet.payload().is_empty() => {
            debug!("[{}] ignored empty event", ctx.name());
        }
        Some(SocketPacketType::Event) => match packet::parse_event(packet.payload()) {
            Ok((name, data)) => ctx.shared.dispatch(SocketEvent::new(name, data)),
            Err(err) => warn!("[{}] dropped event: {err}", ctx.name()),
        },
        Some(SocketPacketType::Ack) => {
            warn!(
                "[{}] ignored ack {:?}, acknowledgements are not supported",
                ctx.name(),
                packet.id()
            );
        }
        Some(SocketPacketType::Error) => {
            warn!("[{}] server error: {}", ctx.name(), packet.payload());
            let data = Some(packet.payload().to_string()).filter(|p| !p.is_empty());
            ctx.shared.emit(LifecycleEvent::Error, data);
        }
        None => {}
    }
}
