//! A client HTTP/2 connection shared by concurrent requests.
//!
//! A writer task owns the socket write half, the HPACK encoder and stream-id
//! allocation. Requests hand it header blocks and DATA frames over a channel,
//! so a request future dropped at any await point can neither truncate a
//! frame nor skip an encoder update. A reader task owns the HPACK decoder and
//! dispatches frames to streams; the frames it must send (ACKs,
//! WINDOW_UPDATE, RST_STREAM, GOAWAY) go through the same channel.

use super::error::{ErrorCode, H2Error};
use super::flowcontrol::{FlowControl, DEFAULT_WINDOW_SIZE};
use super::frame::{decode_frame, encode_header_block, Frame, PREFACE};
use super::hpack::{Decoder, Encoder, HeaderField};
use super::settings::H2Settings;
use super::stream::{H2Stream, Responder, StreamState};
use crate::base::context::net_error_from_io;
use crate::base::neterror::NetError;
use crate::http::headermap::HeaderMap;
use crate::http::request::Request;
use crate::http::response::{HttpVersion, Response, ResponseHead};
use bytes::{Buf, Bytes, BytesMut};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;

const MAX_STREAM_ID: u32 = 0x7fff_ffff;

/// Our encoder never uses a larger dynamic table than this.
const ENCODER_TABLE_LIMIT: u32 = 4096;

/// Header blocks spread over CONTINUATION frames are capped at this size.
const MAX_HEADER_BLOCK: usize = 256 * 1024;

/// Connection-specific headers that must not appear in HTTP/2.
const CONNECTION_HEADERS: &[&str] =
    &["connection", "host", "keep-alive", "proxy-connection", "transfer-encoding", "upgrade"];

type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

struct FrameWriter {
    io: BoxedWrite,
    encoder: Encoder,
    next_stream_id: u32,
    buf: BytesMut,
}

impl FrameWriter {
    async fn write_frames(&mut self, frames: &[Frame]) -> Result<(), NetError> {
        self.buf.clear();
        for frame in frames {
            frame.encode(&mut self.buf);
        }
        self.flush_buf().await
    }

    async fn flush_buf(&mut self) -> Result<(), NetError> {
        let result = match self.io.write_all(&self.buf).await {
            Ok(()) => self.io.flush().await,
            Err(e) => Err(e),
        };
        self.buf.clear();
        result.map_err(|e| net_error_from_io(&e))
    }
}

struct ConnState {
    streams: HashMap<u32, H2Stream>,
    peer: H2Settings,
    send_window: FlowControl,
    recv_window: FlowControl,
    /// Highest stream id opened so far.
    last_opened: u32,
    /// Streams handed to the writer task but not yet allocated an id.
    opening: usize,
    goaway: Option<u32>,
    closed: Option<NetError>,
}

impl ConnState {
    fn ensure_usable(&self) -> Result<(), NetError> {
        if let Some(err) = self.closed {
            return Err(err);
        }
        if self.goaway.is_some() {
            return Err(NetError::ConnectionClosed);
        }
        Ok(())
    }

    fn stream_limit(&self) -> usize {
        self.peer
            .max_concurrent_streams
            .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX))
    }

    /// Frames on a stream we never opened are a connection error.
    fn is_idle_stream(&self, stream_id: u32) -> bool {
        stream_id % 2 == 0 || stream_id > self.last_opened
    }

    /// Remove a stream whose peer sent END_STREAM and deliver its response.
    /// Returns a reset when our request body was still being sent.
    fn complete(&mut self, stream_id: u32) -> Option<Frame> {
        let mut stream = self.streams.remove(&stream_id)?;
        stream.state = stream.state.on_recv_end_stream();
        let unfinished = stream.state != StreamState::Closed;
        let result = match stream.head.take() {
            Some(head) => Response::from_parts(head, std::mem::take(&mut stream.body).freeze()),
            None => Err(NetError::Http2ProtocolError),
        };
        stream.finish(result);
        unfinished.then_some(Frame::RstStream { stream_id, error_code: ErrorCode::Cancel })
    }

    fn fail(&mut self, stream_id: u32, err: NetError) -> bool {
        match self.streams.remove(&stream_id) {
            Some(mut stream) => {
                stream.finish(Err(err));
                true
            }
            None => false,
        }
    }
}

/// A request waiting for the writer task to open its stream.
struct OpenStream {
    fields: Vec<HeaderField>,
    end_stream: bool,
    responder: Responder,
    opened: oneshot::Sender<Result<u32, NetError>>,
}

enum Control {
    Open(OpenStream),
    Frames(Vec<Frame>),
    SettingsAck { header_table_size: Option<u32> },
    GoAway(ErrorCode),
}

struct Shared {
    host: String,
    local: H2Settings,
    state: Mutex<ConnState>,
    /// Signalled when send windows, stream slots or the connection state change.
    changed: Notify,
    control: mpsc::UnboundedSender<Control>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn send_control(&self, frames: Vec<Frame>) {
        if !frames.is_empty() {
            let _ = self.control.send(Control::Frames(frames));
        }
    }

    /// Fail every stream and stop accepting new ones.
    fn teardown(&self, err: NetError, goaway: Option<ErrorCode>) {
        let streams = {
            let mut state = self.lock_state();
            if state.closed.is_some() {
                return;
            }
            state.closed = Some(err);
            std::mem::take(&mut state.streams)
        };
        tracing::debug!(host = %self.host, error = %err, streams = streams.len(), "closing http2 connection");
        for (_, mut stream) in streams {
            stream.finish(Err(err));
        }
        self.changed.notify_waiters();
        if let Some(code) = goaway {
            let _ = self.control.send(Control::GoAway(code));
        }
    }

    /// Drop a stream whose caller went away, resetting it if still open.
    fn cancel_stream(&self, stream_id: u32) {
        let removed = self.lock_state().streams.remove(&stream_id);
        if removed.is_some() {
            tracing::trace!(host = %self.host, stream_id, "cancelling http2 stream");
            self.send_control(vec![Frame::RstStream { stream_id, error_code: ErrorCode::Cancel }]);
            self.changed.notify_waiters();
        }
    }

    /// Have the writer task allocate a stream id and write the header block.
    /// Waits for a free slot when the peer limits concurrent streams.
    async fn open_stream(
        &self,
        fields: Vec<HeaderField>,
        end_stream: bool,
        responder: Responder,
    ) -> Result<u32, NetError> {
        loop {
            let notified = self.changed.notified();
            {
                let mut state = self.lock_state();
                state.ensure_usable()?;
                if state.streams.len() + state.opening < state.stream_limit() {
                    state.opening += 1;
                    break;
                }
            }
            notified.await;
        }

        let (opened, reply) = oneshot::channel();
        let open = OpenStream { fields, end_stream, responder, opened };
        if self.control.send(Control::Open(open)).is_err() {
            self.lock_state().opening -= 1;
            return Err(NetError::ConnectionClosed);
        }
        // Dropping `reply` from here on is seen by the writer task, which
        // then resets the stream itself.
        match reply.await {
            Ok(result) => result,
            Err(_) => Err(self.lock_state().closed.unwrap_or(NetError::ConnectionClosed)),
        }
    }

    /// Queue a request body within the connection and stream send windows.
    async fn send_body(&self, stream_id: u32, body: &Bytes) -> Result<(), NetError> {
        let mut offset = 0;
        while offset < body.len() {
            let notified = self.changed.notified();
            {
                let mut guard = self.lock_state();
                let state = &mut *guard;
                if let Some(err) = state.closed {
                    return Err(err);
                }
                let Some(stream) = state.streams.get_mut(&stream_id) else {
                    // Answered early or reset; the outcome is on the responder.
                    return Ok(());
                };
                if !stream.state.can_send() {
                    return Ok(());
                }
                let n = (body.len() - offset)
                    .min(state.send_window.available())
                    .min(stream.send_window.available())
                    .min(state.peer.max_frame_size as usize);
                if n > 0 {
                    let amount = n as u32;
                    stream.send_window.consume(amount)?;
                    state.send_window.consume(amount)?;
                    let end_stream = offset + n == body.len();
                    if end_stream {
                        stream.state = stream.state.on_send_end_stream();
                    }
                    let frame = Frame::Data {
                        stream_id,
                        payload: body.slice(offset..offset + n),
                        end_stream,
                        flow_len: amount,
                    };
                    // Queued under the state lock so it cannot land behind a
                    // reset the reader issues for this stream.
                    self.send_control(vec![frame]);
                    offset += n;
                    continue;
                }
            }
            notified.await;
        }
        Ok(())
    }
}

/// Resets the stream if the request future is dropped before completion.
struct StreamGuard<'a> {
    shared: &'a Shared,
    stream_id: u32,
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        self.shared.cancel_stream(self.stream_id);
    }
}

struct ConnectionHandle {
    shared: Arc<Shared>,
    tasks: [JoinHandle<()>; 2],
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// A multiplexed HTTP/2 client connection. Clones share the connection; the
/// socket closes when the last clone is dropped.
#[derive(Clone)]
pub struct Http2Connection {
    handle: Arc<ConnectionHandle>,
}

impl std::fmt::Debug for Http2Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Http2Connection")
            .field("host", &self.handle.shared.host)
            .field("active_streams", &self.active_streams())
            .field("usable", &self.is_usable())
            .finish()
    }
}

impl Http2Connection {
    /// Send the connection preface and our SETTINGS over `io`, then start
    /// reading frames. Requests may be issued immediately.
    pub async fn handshake<T>(io: T, host: &str, local: H2Settings) -> Result<Self, NetError>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let mut writer = FrameWriter {
            io: Box::new(write_half),
            encoder: Encoder::default(),
            next_stream_id: 1,
            buf: BytesMut::with_capacity(1024),
        };
        writer.buf.extend_from_slice(PREFACE);
        Frame::Settings { ack: false, params: local.to_params() }.encode(&mut writer.buf);
        writer.flush_buf().await?;

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            host: host.to_string(),
            local,
            state: Mutex::new(ConnState {
                streams: HashMap::new(),
                peer: H2Settings::protocol_default(),
                send_window: FlowControl::default(),
                recv_window: FlowControl::default(),
                last_opened: 0,
                opening: 0,
                goaway: None,
                closed: None,
            }),
            changed: Notify::new(),
            control: control_tx,
        });

        let decoder = Decoder::new(local.header_table_size as usize).with_max_header_list_size(
            local.max_header_list_size.map_or(usize::MAX, |n| n as usize),
        );
        let reader = FrameReader { shared: shared.clone(), decoder, continuation: None };
        let tasks = [
            tokio::spawn(reader.run(read_half)),
            tokio::spawn(write_loop(shared.clone(), writer, control_rx)),
        ];
        tracing::debug!(host = %host, "http2 connection established");
        Ok(Self { handle: Arc::new(ConnectionHandle { shared, tasks }) })
    }

    /// Send one request and wait for its complete response.
    ///
    /// If no response arrives within `timeout` the whole connection is
    /// closed, since a stalled peer stalls every stream on it.
    pub async fn send_request(&self, request: &Request, timeout: Duration) -> Result<Response, NetError> {
        let shared = &*self.handle.shared;
        let fields = request_fields(request);
        let end_stream = request.body.is_empty();
        let (tx, rx) = oneshot::channel();

        let stream_id = shared.open_stream(fields, end_stream, tx).await?;
        let _guard = StreamGuard { shared, stream_id };
        if !end_stream {
            shared.send_body(stream_id, &request.body).await?;
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(NetError::ConnectionClosed),
            Err(_) => {
                tracing::debug!(host = %shared.host, stream_id, "http2 response timed out");
                shared.teardown(NetError::TimedOut, Some(ErrorCode::NoError));
                Err(NetError::TimedOut)
            }
        }
    }

    /// Whether new streams can still be opened.
    pub fn is_usable(&self) -> bool {
        self.handle.shared.lock_state().ensure_usable().is_ok()
    }

    pub fn active_streams(&self) -> usize {
        self.handle.shared.lock_state().streams.len()
    }

    /// Send GOAWAY and fail every open stream with `reason`.
    pub fn close(&self, reason: NetError) {
        self.handle.shared.teardown(reason, Some(ErrorCode::NoError));
    }
}

fn request_fields(request: &Request) -> Vec<HeaderField> {
    let authority = request
        .headers
        .get("host")
        .map(str::to_string)
        .unwrap_or_else(|| request.authority());
    let mut fields = vec![
        HeaderField::new(":method", request.method.as_str()),
        HeaderField::new(":scheme", request.scheme.as_str()),
        HeaderField::new(":authority", authority),
        HeaderField::new(":path", request.target()),
    ];
    for (name, value) in request.headers.iter() {
        if CONNECTION_HEADERS.contains(&name) {
            continue;
        }
        if name == "te" && !value.eq_ignore_ascii_case("trailers") {
            continue;
        }
        fields.push(HeaderField::new(name, value));
    }
    if !request.body.is_empty() && !request.headers.has("content-length") {
        fields.push(HeaderField::new("content-length", request.body.len().to_string()));
    }
    fields
}

async fn write_loop(shared: Arc<Shared>, mut writer: FrameWriter, mut rx: mpsc::UnboundedReceiver<Control>) {
    while let Some(msg) = rx.recv().await {
        let result = match msg {
            Control::Open(open) => write_headers(&shared, &mut writer, open).await,
            Control::Frames(frames) => writer.write_frames(&frames).await,
            Control::SettingsAck { header_table_size } => {
                if let Some(size) = header_table_size {
                    writer.encoder.set_max_table_size(size.min(ENCODER_TABLE_LIMIT) as usize);
                }
                writer.write_frames(&[Frame::Settings { ack: true, params: Vec::new() }]).await
            }
            Control::GoAway(error_code) => {
                let goaway = Frame::GoAway { last_stream_id: 0, error_code, debug_data: Bytes::new() };
                let _ = writer.write_frames(&[goaway]).await;
                let _ = writer.io.shutdown().await;
                break;
            }
        };
        if let Err(e) = result {
            shared.teardown(e, None);
            break;
        }
    }
}

/// Allocate the next stream id, register the stream and write its HEADERS
/// and CONTINUATION frames.
async fn write_headers(shared: &Shared, writer: &mut FrameWriter, open: OpenStream) -> Result<(), NetError> {
    let OpenStream { fields, end_stream, responder, opened } = open;
    let allocated = {
        let mut state = shared.lock_state();
        state.opening = state.opening.saturating_sub(1);
        let stream_id = writer.next_stream_id;
        if opened.is_closed() {
            Err(NetError::Aborted)
        } else if let Err(e) = state.ensure_usable() {
            Err(e)
        } else if stream_id > MAX_STREAM_ID {
            let last_opened = state.last_opened;
            state.goaway.get_or_insert(last_opened);
            Err(NetError::ConnectionClosed)
        } else {
            let mut stream = H2Stream::new(
                i64::from(state.peer.initial_window_size),
                i64::from(shared.local.initial_window_size),
                responder,
            );
            stream.state = stream.state.on_send_headers(end_stream);
            state.streams.insert(stream_id, stream);
            state.last_opened = stream_id;
            Ok((stream_id, state.peer.max_frame_size as usize))
        }
    };
    let (stream_id, max_frame_size) = match allocated {
        Ok(allocated) => allocated,
        Err(e) => {
            shared.changed.notify_waiters();
            let _ = opened.send(Err(e));
            return Ok(());
        }
    };
    writer.next_stream_id += 2;

    let mut block = Vec::new();
    writer.encoder.encode(&fields, &mut block);
    writer.buf.clear();
    encode_header_block(&mut writer.buf, stream_id, &block, end_stream, max_frame_size);
    if let Err(e) = writer.flush_buf().await {
        shared.teardown(e, None);
        let _ = opened.send(Err(e));
        return Err(e);
    }
    tracing::trace!(host = %shared.host, stream_id, "opened http2 stream");
    if opened.send(Ok(stream_id)).is_err() {
        shared.cancel_stream(stream_id);
    }
    Ok(())
}

struct PendingBlock {
    stream_id: u32,
    block: BytesMut,
    end_stream: bool,
}

struct FrameReader {
    shared: Arc<Shared>,
    decoder: Decoder,
    /// Set while a header block awaits its CONTINUATION frames.
    continuation: Option<PendingBlock>,
}

impl FrameReader {
    async fn run<R>(mut self, mut io: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = BytesMut::with_capacity(16 * 1024);
        let (err, goaway) = loop {
            match decode_frame(&buf, self.shared.local.max_frame_size) {
                Ok(Some((frame, used))) => {
                    buf.advance(used);
                    if let Err(e) = self.handle_frame(frame) {
                        let code = e.code();
                        break (NetError::from(e), Some(code));
                    }
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    let code = e.code();
                    break (NetError::from(e), Some(code));
                }
            }
            match io.read_buf(&mut buf).await {
                Ok(0) => break (NetError::ConnectionClosed, None),
                Ok(_) => {}
                Err(e) => break (net_error_from_io(&e), None),
            }
        };
        if goaway.is_some() {
            tracing::warn!(host = %self.shared.host, error = %err, "http2 protocol error");
        }
        self.shared.teardown(err, goaway);
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<(), H2Error> {
        if let Some(pending) = &mut self.continuation {
            let Frame::Continuation { stream_id, fragment, end_headers } = frame else {
                return Err(H2Error::Protocol("expected CONTINUATION"));
            };
            if stream_id != pending.stream_id {
                return Err(H2Error::Protocol("CONTINUATION on wrong stream"));
            }
            pending.block.extend_from_slice(&fragment);
            if pending.block.len() > MAX_HEADER_BLOCK {
                return Err(H2Error::Protocol("header block too large"));
            }
            if end_headers {
                if let Some(done) = self.continuation.take() {
                    return self.on_header_block(done.stream_id, &done.block, done.end_stream);
                }
            }
            return Ok(());
        }

        match frame {
            Frame::Headers { stream_id, fragment, end_stream, end_headers } => {
                if end_headers {
                    self.on_header_block(stream_id, &fragment, end_stream)
                } else {
                    self.continuation =
                        Some(PendingBlock { stream_id, block: BytesMut::from(&fragment[..]), end_stream });
                    Ok(())
                }
            }
            Frame::Continuation { .. } => Err(H2Error::Protocol("unexpected CONTINUATION")),
            Frame::Data { stream_id, payload, end_stream, flow_len } => {
                self.on_data(stream_id, payload, end_stream, flow_len)
            }
            Frame::RstStream { stream_id, error_code } => {
                if self.shared.lock_state().fail(stream_id, error_code.to_net_error()) {
                    tracing::debug!(host = %self.shared.host, stream_id, ?error_code, "stream reset by peer");
                    self.shared.changed.notify_waiters();
                }
                Ok(())
            }
            Frame::Settings { ack: false, params } => self.on_settings(&params),
            Frame::Settings { ack: true, .. } => Ok(()),
            Frame::PushPromise { .. } => Err(H2Error::Protocol("PUSH_PROMISE with push disabled")),
            Frame::Ping { ack: false, opaque_data } => {
                self.shared.send_control(vec![Frame::Ping { ack: true, opaque_data }]);
                Ok(())
            }
            Frame::Ping { ack: true, .. } => Ok(()),
            Frame::GoAway { last_stream_id, error_code, .. } => {
                self.on_goaway(last_stream_id, error_code);
                Ok(())
            }
            Frame::WindowUpdate { stream_id, increment } => self.on_window_update(stream_id, increment),
            Frame::Priority { .. } | Frame::Unknown { .. } => Ok(()),
        }
    }

    fn on_header_block(&mut self, stream_id: u32, block: &[u8], end_stream: bool) -> Result<(), H2Error> {
        // Decode even for streams we no longer track; the table must advance.
        let fields = self.decoder.decode(block)?;
        let mut control = Vec::new();
        {
            let mut state = self.shared.lock_state();
            let Some(stream) = state.streams.get_mut(&stream_id) else {
                if state.is_idle_stream(stream_id) {
                    return Err(H2Error::Protocol("HEADERS on idle stream"));
                }
                return Ok(());
            };

            if !stream.state.can_recv() {
                state.fail(stream_id, NetError::Http2StreamClosed);
                control.push(Frame::RstStream { stream_id, error_code: ErrorCode::StreamClosed });
            } else if stream.head.is_none() {
                let (status, headers) = split_response_fields(fields);
                match status {
                    Some(100..=199) if !end_stream => return Ok(()),
                    Some(status @ 200..=999) => {
                        stream.head = Some(ResponseHead {
                            version: HttpVersion::Http2,
                            status,
                            status_text: reason_phrase(status),
                            headers,
                        });
                    }
                    _ => {
                        state.fail(stream_id, NetError::Http2ProtocolError);
                        control.push(Frame::RstStream { stream_id, error_code: ErrorCode::ProtocolError });
                    }
                }
            }
            // A second block is trailers, which are not surfaced.

            if control.is_empty() {
                if end_stream {
                    control.extend(state.complete(stream_id));
                } else if state.streams.get(&stream_id).is_some_and(H2Stream::is_abandoned) {
                    state.fail(stream_id, NetError::Aborted);
                    control.push(Frame::RstStream { stream_id, error_code: ErrorCode::Cancel });
                }
            }
        }
        self.finish_dispatch(control);
        Ok(())
    }

    fn on_data(&mut self, stream_id: u32, payload: Bytes, end_stream: bool, flow_len: u32) -> Result<(), H2Error> {
        let mut control = Vec::new();
        {
            let mut guard = self.shared.lock_state();
            let state = &mut *guard;
            state.recv_window.consume(flow_len)?;
            if let Some(increment) = state.recv_window.take_update(DEFAULT_WINDOW_SIZE) {
                control.push(Frame::WindowUpdate { stream_id: 0, increment });
            }

            match state.streams.get_mut(&stream_id) {
                None => {
                    if state.is_idle_stream(stream_id) {
                        return Err(H2Error::Protocol("DATA on idle stream"));
                    }
                }
                Some(stream) => {
                    stream.recv_window.consume(flow_len)?;
                    if !stream.state.can_recv() {
                        state.fail(stream_id, NetError::Http2StreamClosed);
                        control.push(Frame::RstStream { stream_id, error_code: ErrorCode::StreamClosed });
                    } else if stream.head.is_none() {
                        state.fail(stream_id, NetError::Http2ProtocolError);
                        control.push(Frame::RstStream { stream_id, error_code: ErrorCode::ProtocolError });
                    } else if stream.is_abandoned() {
                        state.fail(stream_id, NetError::Aborted);
                        control.push(Frame::RstStream { stream_id, error_code: ErrorCode::Cancel });
                    } else {
                        stream.body.extend_from_slice(&payload);
                        if end_stream {
                            control.extend(state.complete(stream_id));
                        } else if let Some(increment) =
                            stream.recv_window.take_update(i64::from(self.shared.local.initial_window_size))
                        {
                            control.push(Frame::WindowUpdate { stream_id, increment });
                        }
                    }
                }
            }
        }
        self.finish_dispatch(control);
        Ok(())
    }

    fn on_settings(&mut self, params: &[(u16, u32)]) -> Result<(), H2Error> {
        let header_table_size = {
            let mut state = self.shared.lock_state();
            let old = state.peer;
            state.peer.apply(params)?;
            let delta = i64::from(state.peer.initial_window_size) - i64::from(old.initial_window_size);
            if delta != 0 {
                for stream in state.streams.values_mut() {
                    stream.send_window.adjust(delta)?;
                }
            }
            (state.peer.header_table_size != old.header_table_size).then_some(state.peer.header_table_size)
        };
        let _ = self.shared.control.send(Control::SettingsAck { header_table_size });
        self.shared.changed.notify_waiters();
        Ok(())
    }

    fn on_goaway(&mut self, last_stream_id: u32, error_code: ErrorCode) {
        let refused: Vec<H2Stream> = {
            let mut state = self.shared.lock_state();
            state.goaway = Some(last_stream_id);
            let ids: Vec<u32> = state.streams.keys().copied().filter(|id| *id > last_stream_id).collect();
            ids.iter().filter_map(|id| state.streams.remove(id)).collect()
        };
        tracing::debug!(
            host = %self.shared.host,
            last_stream_id,
            ?error_code,
            refused = refused.len(),
            "received GOAWAY"
        );
        for mut stream in refused {
            // The peer never processed these; they are safe to retry.
            stream.finish(Err(NetError::ConnectionClosed));
        }
        self.shared.changed.notify_waiters();
    }

    fn on_window_update(&mut self, stream_id: u32, increment: u32) -> Result<(), H2Error> {
        let mut control = Vec::new();
        {
            let mut state = self.shared.lock_state();
            if stream_id == 0 {
                state.send_window.increase(increment)?;
            } else if let Some(stream) = state.streams.get_mut(&stream_id) {
                let error_code = if increment == 0 {
                    Some(ErrorCode::ProtocolError)
                } else {
                    stream.send_window.increase(increment).err().map(|e| e.code())
                };
                if let Some(error_code) = error_code {
                    state.fail(stream_id, error_code.to_net_error());
                    control.push(Frame::RstStream { stream_id, error_code });
                }
            }
        }
        self.finish_dispatch(control);
        Ok(())
    }

    fn finish_dispatch(&self, control: Vec<Frame>) {
        self.shared.send_control(control);
        self.shared.changed.notify_waiters();
    }
}

fn split_response_fields(fields: Vec<HeaderField>) -> (Option<u16>, HeaderMap) {
    let mut status = None;
    let mut headers = HeaderMap::new();
    for field in fields {
        if field.name.first() == Some(&b':') {
            if field.name == b":status" {
                status = std::str::from_utf8(&field.value).ok().and_then(|s| s.parse().ok());
            }
            continue;
        }
        headers.append(&String::from_utf8_lossy(&field.name), String::from_utf8_lossy(&field.value));
    }
    (status, headers)
}

fn reason_phrase(status: u16) -> String {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
        .to_string()
}
