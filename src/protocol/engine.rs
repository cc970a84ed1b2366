//! The protocol engine: one connection's send/receive/process state machine.
//!
//! Exactly one message is in flight per connection; the owner serializes
//! calls through an async mutex around the engine. Responses are decoded
//! resumably: a restore point is taken before each message decode and the
//! engine replays after receiving more packets on `OutOfPackets`.

use crate::error::{Error, Result};
use crate::protocol::buffer::ReadBuffer;
use crate::protocol::capabilities::Capabilities;
use crate::protocol::constants::*;
use crate::protocol::message::Message;
use crate::protocol::messages::{
    CloseCursorsPiggyback, FlushOutBindsMessage, FreeTempLobsPiggyback, SessionReleaseMessage,
    SimpleFunctionMessage,
};
use crate::protocol::packet::Packet;
use crate::protocol::response::ResponseParser;
use crate::protocol::transport::Transport;
use bytes::Bytes;
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// How long the engine waits for the server's reset acknowledgement before
/// declaring the connection unrecoverable.
const RECOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Cross-task break request channel.
///
/// `request()` may be called from any task; the engine observes it at its
/// next suspension point, emits the BREAK marker on a dedicated write path
/// and funnels into the reset sequence. Guarded so repeated requests
/// collapse into one break.
#[derive(Debug, Default)]
pub struct BreakSignal {
    requested: AtomicBool,
    in_progress: AtomicBool,
    notify: Notify,
}

impl BreakSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Request a break. Idempotent while one is being delivered.
    pub fn request(&self) {
        if self.in_progress.swap(true, Ordering::AcqRel) {
            return;
        }
        self.requested.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn take(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }

    fn finish(&self) {
        self.requested.store(false, Ordering::Release);
        self.in_progress.store(false, Ordering::Release);
    }

    fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.notify.notified()
    }
}

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Ready,
    InCall,
    /// A local break went out; the reset echo is pending.
    BreakPending,
    Closing,
    Closed,
}

/// The per-connection protocol engine.
pub struct Engine {
    transport: Transport,
    pub caps: Capabilities,
    state: EngineState,
    read_buf: ReadBuffer,
    break_signal: Arc<BreakSignal>,
    /// Bound on one `process` call. None means wait forever.
    pub call_timeout: Option<Duration>,
    /// Cursor ids to close on the next round trip.
    pending_close_cursors: Vec<u32>,
    /// Temporary LOB locators to free on the next round trip.
    pending_free_lobs: Vec<Vec<u8>>,
    /// Whether the last call left a transaction open.
    pub txn_in_progress: bool,
    /// Whether the DRCP session has been released.
    pub session_released: bool,
}

impl Engine {
    /// Wrap an authenticated transport.
    pub fn new(transport: Transport, caps: Capabilities, break_signal: Arc<BreakSignal>) -> Self {
        Self {
            transport,
            caps,
            state: EngineState::Ready,
            read_buf: ReadBuffer::new(),
            break_signal,
            call_timeout: None,
            pending_close_cursors: Vec::new(),
            pending_free_lobs: Vec::new(),
            txn_in_progress: false,
            session_released: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Whether the engine can accept a message.
    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    /// Schedule a server-side cursor close on the next round trip.
    pub fn defer_close_cursor(&mut self, cursor_id: u32) {
        if cursor_id != 0 {
            self.pending_close_cursors.push(cursor_id);
        }
    }

    /// Schedule a temporary LOB release on the next round trip.
    pub fn defer_free_temp_lob(&mut self, locator: Vec<u8>) {
        self.pending_free_lobs.push(locator);
    }

    /// Process one message: serialize, send, decode the response into
    /// `parser`. Returns with the connection in READY, or in CLOSED after a
    /// fatal error; never in IN_CALL.
    pub async fn process(
        &mut self,
        msg: &dyn Message,
        parser: &mut ResponseParser,
    ) -> Result<()> {
        if self.state != EngineState::Ready {
            return Err(Error::ConnectionClosed);
        }
        self.state = EngineState::InCall;

        let result = self.process_inner(msg, parser).await;
        match &result {
            Ok(()) => {
                self.state = EngineState::Ready;
            }
            Err(e) if e.is_session_dead() => {
                self.force_close().await;
            }
            Err(Error::CallTimeout { .. }) | Err(Error::CallCancelled) => {
                // Recovery already ran; state set by the recovery path.
                if self.state == EngineState::InCall {
                    self.state = EngineState::Ready;
                }
            }
            Err(_) => {
                // The request hit the wire; break and drain so the
                // connection is reusable before the error surfaces.
                match self.break_and_recover(RECOVERY_TIMEOUT).await {
                    Ok(()) => self.state = EngineState::Ready,
                    Err(_) => self.force_close().await,
                }
            }
        }
        if let Some(info) = &parser.state.error_info {
            self.txn_in_progress = info.call_status & TNS_EOCS_FLAGS_TXN_IN_PROGRESS != 0;
        }
        if parser.state.session_released {
            self.session_released = true;
        }
        result
    }

    async fn process_inner(
        &mut self,
        msg: &dyn Message,
        parser: &mut ResponseParser,
    ) -> Result<()> {
        // Stale break requests from before this call are not cancellations.
        self.break_signal.finish();

        let deadline = self.call_timeout.map(|t| Instant::now() + t);

        let mut body = Vec::with_capacity(msg.wire_size() + 64);
        if !self.pending_close_cursors.is_empty() {
            let piggyback = CloseCursorsPiggyback {
                cursor_ids: &self.pending_close_cursors,
            };
            piggyback.write_to(&mut body)?;
        }
        if !self.pending_free_lobs.is_empty() {
            let piggyback = FreeTempLobsPiggyback {
                locators: &self.pending_free_lobs,
            };
            piggyback.write_to(&mut body)?;
        }
        msg.write_to(&mut body)?;

        let data_flags = if self.caps.supports_end_of_response {
            TNS_DATA_FLAGS_END_OF_REQUEST
        } else {
            0
        };
        self.transport.send_data(&body, data_flags).await?;
        self.pending_close_cursors.clear();
        self.pending_free_lobs.clear();

        self.read_buf.reset();
        self.drive_response(parser, deadline, Some((&body, data_flags))).await
    }

    /// Pump packets through the parser until the response completes.
    /// `request` is kept so a server RESEND can replay it unchanged.
    async fn drive_response(
        &mut self,
        parser: &mut ResponseParser,
        deadline: Option<Instant>,
        request: Option<(&[u8], u16)>,
    ) -> Result<()> {
        loop {
            let point = self.read_buf.save();
            match parser.parse_next(&mut self.read_buf) {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    if parser.state.flush_out_binds {
                        parser.state.flush_out_binds = false;
                        let mut flush = Vec::new();
                        FlushOutBindsMessage.write_to(&mut flush)?;
                        self.transport.send_data(&flush, 0).await?;
                        continue;
                    }
                    // Legacy end detection: without explicit end-of-response
                    // markers, the error block is the last message.
                    if !self.caps.supports_end_of_response
                        && parser.state.error_info.is_some()
                        && self.read_buf.remaining() == 0
                    {
                        return Ok(());
                    }
                    continue;
                }
                Err(e) if e.is_out_of_packets() => {
                    self.read_buf.restore(point);
                    let payload = self.receive_data_payload(deadline, request).await?;
                    self.read_buf.push_chunk(payload);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Receive the next DATA payload (data flags stripped), handling marker
    /// and control packets, server resend demands, the external break signal
    /// and the call timeout.
    async fn receive_data_payload(
        &mut self,
        deadline: Option<Instant>,
        request: Option<(&[u8], u16)>,
    ) -> Result<Bytes> {
        enum Wake {
            Packet(Result<Packet>),
            Break,
            Timeout,
        }

        loop {
            if self.break_signal.take() {
                return self.cancel_in_flight(Error::CallCancelled).await;
            }

            let wake = {
                let break_signal = self.break_signal.clone();
                let notified = break_signal.notified();
                tokio::pin!(notified);

                let read = self.transport.read_packet();
                tokio::pin!(read);

                match deadline {
                    Some(deadline) => {
                        tokio::select! {
                            res = &mut read => Wake::Packet(res),
                            _ = &mut notified => Wake::Break,
                            _ = tokio::time::sleep_until(deadline) => Wake::Timeout,
                        }
                    }
                    None => {
                        tokio::select! {
                            res = &mut read => Wake::Packet(res),
                            _ = &mut notified => Wake::Break,
                        }
                    }
                }
            };

            let packet = match wake {
                Wake::Packet(res) => res?,
                Wake::Break => {
                    self.break_signal.take();
                    return self.cancel_in_flight(Error::CallCancelled).await;
                }
                Wake::Timeout => {
                    let timeout_ms = self.call_timeout.unwrap_or_default().as_millis() as u64;
                    return self.cancel_in_flight(Error::CallTimeout { timeout_ms }).await;
                }
            };

            match packet.packet_type {
                TNS_PACKET_TYPE_DATA => {
                    if packet.payload.len() < 2 {
                        continue;
                    }
                    return Ok(packet.payload.slice(2..));
                }
                TNS_PACKET_TYPE_MARKER => {
                    // Server-initiated break: acknowledge and keep reading;
                    // the error data follows the reset echo.
                    debug!("server break marker received; resetting");
                    self.reset_exchange().await?;
                }
                TNS_PACKET_TYPE_RESEND => {
                    let Some((body, flags)) = request else {
                        return Err(Error::protocol("server demanded an impossible resend"));
                    };
                    debug!("server demanded a resend");
                    self.transport.send_data(body, flags).await?;
                }
                TNS_PACKET_TYPE_CONTROL => continue,
                other => {
                    return Err(Error::UnexpectedPacketType {
                        expected: TNS_PACKET_TYPE_DATA,
                        actual: other,
                    });
                }
            }
        }
    }

    /// Cancel the in-flight call: send BREAK, drain to the reset echo and the
    /// trailing error packet, and surface `cause`. A second timeout during
    /// recovery force-closes the connection.
    async fn cancel_in_flight(&mut self, cause: Error) -> Result<Bytes> {
        self.state = EngineState::BreakPending;
        let recovered = self.break_and_recover(RECOVERY_TIMEOUT).await;
        self.break_signal.finish();
        match recovered {
            Ok(()) => {
                self.state = EngineState::Ready;
                Err(cause)
            }
            Err(_) => {
                self.force_close().await;
                Err(cause)
            }
        }
    }

    async fn break_and_recover(&mut self, recovery_timeout: Duration) -> Result<()> {
        self.transport.send_marker(TNS_MARKER_TYPE_BREAK).await?;
        tokio::time::timeout(recovery_timeout, self.drain_to_reset())
            .await
            .map_err(|_| Error::ConnectionClosed)?
    }

    /// Send a RESET marker, then discard packets until the server's RESET
    /// echo and the error packet that follows it.
    async fn drain_to_reset(&mut self) -> Result<()> {
        self.transport.send_marker(TNS_MARKER_TYPE_RESET).await?;
        let mut reset_seen = false;
        // Bounded: stale response data may precede the echo, and some
        // servers emit several markers.
        for _ in 0..256 {
            let packet = self.transport.read_packet().await?;
            match packet.packet_type {
                TNS_PACKET_TYPE_MARKER => {
                    if packet.marker_type() == Some(TNS_MARKER_TYPE_RESET) {
                        reset_seen = true;
                    }
                }
                TNS_PACKET_TYPE_DATA if reset_seen => {
                    trace!("discarding post-reset error packet");
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(Error::protocol("reset acknowledgement never arrived"))
    }

    /// Wait for the server's RESET echo after a server-initiated break.
    async fn reset_exchange(&mut self) -> Result<()> {
        self.transport.send_marker(TNS_MARKER_TYPE_RESET).await?;
        for _ in 0..256 {
            let packet = self.transport.read_packet().await?;
            if packet.packet_type == TNS_PACKET_TYPE_MARKER
                && packet.marker_type() == Some(TNS_MARKER_TYPE_RESET)
            {
                return Ok(());
            }
        }
        Err(Error::protocol("reset acknowledgement never arrived"))
    }

    /// Execute several operations as one pipelined round trip. Results and
    /// errors are collected per operation index; an operation's failure does
    /// not abort the pipeline.
    pub async fn process_pipeline(
        &mut self,
        ops: &[&dyn Message],
        parsers: &mut [ResponseParser],
    ) -> Result<Vec<Option<Error>>> {
        if ops.len() != parsers.len() {
            return Err(Error::interface("one parser per pipeline operation"));
        }
        if self.state != EngineState::Ready {
            return Err(Error::ConnectionClosed);
        }
        if !self.caps.supports_end_of_response {
            return Err(Error::NotSupported {
                feature: "pipelining requires end-of-response support",
            });
        }
        self.state = EngineState::InCall;

        let result = self.process_pipeline_inner(ops, parsers).await;
        match &result {
            Ok(_) => self.state = EngineState::Ready,
            Err(e) if e.is_session_dead() => self.force_close().await,
            Err(_) => match self.break_and_recover(RECOVERY_TIMEOUT).await {
                Ok(()) => self.state = EngineState::Ready,
                Err(_) => self.force_close().await,
            },
        }
        result
    }

    async fn process_pipeline_inner(
        &mut self,
        ops: &[&dyn Message],
        parsers: &mut [ResponseParser],
    ) -> Result<Vec<Option<Error>>> {
        self.break_signal.finish();
        let deadline = self.call_timeout.map(|t| Instant::now() + t);

        let mut body = Vec::new();
        for op in ops {
            op.write_to(&mut body)?;
        }
        self.transport
            .send_data(
                &body,
                TNS_DATA_FLAGS_BEGIN_PIPELINE | TNS_DATA_FLAGS_END_OF_REQUEST,
            )
            .await?;

        self.read_buf.reset();
        let mut outcomes = Vec::with_capacity(ops.len());
        for parser in parsers.iter_mut() {
            self.drive_response(parser, deadline, None).await?;
            let error = parser
                .state
                .error_info
                .as_ref()
                .filter(|info| info.is_error())
                .map(|info| info.to_error());
            outcomes.push(error);
        }
        Ok(outcomes)
    }

    /// Release the DRCP session (oneway; no response expected).
    pub async fn release_session(&mut self, tag: Option<&str>, deauthenticate: bool) -> Result<()> {
        if self.state != EngineState::Ready || self.session_released {
            return Ok(());
        }
        let msg = SessionReleaseMessage {
            tag,
            release_mode: if deauthenticate {
                DRCP_DEAUTHENTICATE
            } else {
                DRCP_RELEASE_MODE_DEFAULT
            },
        };
        let mut body = Vec::with_capacity(msg.wire_size());
        msg.write_to(&mut body)?;
        self.transport.send_data(&body, 0).await?;
        self.session_released = true;
        Ok(())
    }

    /// Orderly close: logoff, final EOF packet, socket shutdown.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == EngineState::Closed {
            return Ok(());
        }
        if self.state == EngineState::Ready {
            self.state = EngineState::Closing;
            let logoff = SimpleFunctionMessage::logoff();
            let mut body = Vec::with_capacity(logoff.wire_size());
            logoff.write_to(&mut body)?;
            if let Err(e) = self.transport.send_data(&body, 0).await {
                warn!("logoff failed: {}", e);
            } else {
                // Best effort: wait for the logoff acknowledgement.
                let _ = tokio::time::timeout(RECOVERY_TIMEOUT, self.transport.read_packet()).await;
            }
            let _ = self
                .transport
                .send_data(&[], TNS_DATA_FLAGS_EOF)
                .await;
        }
        self.force_close().await;
        Ok(())
    }

    /// Drop the socket. The session is gone; every later call fails fast.
    pub async fn force_close(&mut self) {
        self.transport.disconnect().await;
        self.state = EngineState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_break_signal_idempotent() {
        let signal = BreakSignal::new();
        signal.request();
        signal.request();
        assert!(signal.take());
        // Second take sees nothing: the requests collapsed.
        assert!(!signal.take());
        signal.finish();
        signal.request();
        assert!(signal.take());
    }
}
