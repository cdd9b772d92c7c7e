pub mod classifier;

/// Stream orchestrator: drives one customer exchange end to end.
///
/// The engine owns the read loop over the upstream turn, feeds every line
/// through the SSE parser and the tool-call accumulator, dispatches resolved
/// calls to a department mid-stream, and splices the result back into the
/// outgoing frame sequence. After a turn in which a dispatch happened it
/// loops back to the upstream for a summary turn on the same thread; the
/// exchange ends with the first turn that completes without a dispatch.
use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use smallvec::SmallVec;

use crate::departments::DepartmentKey;
use crate::error::EdgeError;
use crate::protocol::{decode_choice_deltas, ChatDelta, Envelope, StreamChunk};
use crate::state::AppState;
use crate::stream::splicer;
use crate::stream::sse::{data_payload, is_done_line, DONE_FRAME};
use crate::stream::{CompletedToolCall, LineParser, ToolCallAccumulator};

use classifier::{ResolvedTurn, Turn, TurnBody};

/// Build the outgoing SSE byte stream for one exchange.
///
/// The returned stream is forward-only: each poll either flushes an already
/// spliced frame or advances the engine by one upstream read. Dropping the
/// stream (client disconnect) drops the upstream body with it.
pub fn relay_stream(
    state: Arc<AppState>,
    first_turn: Turn,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let engine = StreamEngine::new(state, first_turn);
    futures_util::stream::unfold(engine, |mut engine| async move {
        engine.next_frame().await.map(|frame| (Ok(frame), engine))
    })
}

struct PendingFrames {
    chunks: SmallVec<[Bytes; 8]>,
    head: usize,
}

impl PendingFrames {
    fn new() -> Self {
        Self {
            chunks: SmallVec::new(),
            head: 0,
        }
    }

    fn push(&mut self, frame: String) {
        self.chunks.push(Bytes::from(frame));
    }

    fn push_static(&mut self, frame: &'static str) {
        self.chunks.push(Bytes::from_static(frame.as_bytes()));
    }

    fn pop_front(&mut self) -> Option<Bytes> {
        if self.head >= self.chunks.len() {
            return None;
        }
        let chunk = std::mem::take(&mut self.chunks[self.head]);
        self.head += 1;
        if self.head == self.chunks.len() {
            self.chunks.clear();
            self.head = 0;
        }
        Some(chunk)
    }
}

enum ActiveTurn {
    Streamed(BoxStream<'static, reqwest::Result<Bytes>>),
    Resolved(ResolvedTurn),
}

impl ActiveTurn {
    fn from_turn_body(body: TurnBody) -> Self {
        match body {
            TurnBody::Streamed(response) => ActiveTurn::Streamed(response.bytes_stream().boxed()),
            TurnBody::Resolved(resolved) => ActiveTurn::Resolved(resolved),
        }
    }
}

struct StreamEngine {
    state: Arc<AppState>,
    thread_id: Option<String>,
    turn: Option<ActiveTurn>,
    parser: LineParser,
    accumulator: ToolCallAccumulator,
    pending: PendingFrames,
    lines: Vec<String>,
    deltas: Vec<ChatDelta>,
    turn_dispatched: bool,
    finished: bool,
}

impl StreamEngine {
    fn new(state: Arc<AppState>, first_turn: Turn) -> Self {
        let Turn { body, thread_id } = first_turn;
        Self {
            state,
            thread_id,
            turn: Some(ActiveTurn::from_turn_body(body)),
            parser: LineParser::new(),
            accumulator: ToolCallAccumulator::new(),
            pending: PendingFrames::new(),
            lines: Vec::new(),
            deltas: Vec::new(),
            turn_dispatched: false,
            finished: false,
        }
    }

    async fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(frame);
            }
            if self.finished {
                return None;
            }

            match self.turn.take() {
                Some(ActiveTurn::Resolved(resolved)) => {
                    self.consume_resolved(resolved).await;
                    self.end_of_turn().await;
                }
                Some(ActiveTurn::Streamed(mut body)) => match body.next().await {
                    Some(Ok(bytes)) => {
                        if self.consume_bytes(&bytes).await {
                            self.end_of_turn().await;
                        } else {
                            self.turn = Some(ActiveTurn::Streamed(body));
                        }
                    }
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "upstream body read failed, ending turn");
                        self.end_of_turn().await;
                    }
                    None => self.end_of_turn().await,
                },
                None => return None,
            }
        }
    }

    /// Feed one upstream chunk through the parser. Returns true when the
    /// `[DONE]` sentinel terminated this turn's logical stream.
    async fn consume_bytes(&mut self, bytes: &[u8]) -> bool {
        let mut lines = std::mem::take(&mut self.lines);
        lines.clear();
        self.parser.feed_into(bytes, &mut lines);

        let mut ended = false;
        for line in &lines {
            if is_done_line(line) {
                ended = true;
                break;
            }
            self.consume_line(line).await;
        }

        self.lines = lines;
        ended
    }

    async fn consume_line(&mut self, line: &str) {
        let Some(payload) = data_payload(line) else {
            return;
        };
        let chunk: StreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(err) => {
                tracing::debug!(error = %err, "dropping malformed SSE line");
                return;
            }
        };

        let envelope = Envelope::of_chunk(&chunk);
        for choice in &chunk.choices {
            if let Some(role) = &choice.delta.role {
                self.pending
                    .push(splicer::role_frame(&envelope, choice.index, role));
            }

            let mut deltas = std::mem::take(&mut self.deltas);
            deltas.clear();
            decode_choice_deltas(choice, &mut deltas);
            for delta in &deltas {
                match delta {
                    ChatDelta::Content(text) => {
                        if self.accumulator.is_accumulating() {
                            // Content emission is suspended while a call is in flight.
                            tracing::debug!("holding back content delta during tool-call accumulation");
                        } else {
                            self.pending
                                .push(splicer::content_frame(&envelope, choice.index, text));
                        }
                    }
                    ChatDelta::ToolCall { name, arguments, .. } => {
                        if let Some(completed) = self.accumulator.feed(name.as_deref(), arguments) {
                            self.resolve_call(completed, &envelope, choice.index).await;
                        }
                    }
                }
            }
            self.deltas = deltas;

            if let Some(reason) = &choice.finish_reason {
                // Tool-call turns end internally; the client only ever sees
                // content, so that finish reason is not forwarded.
                if reason != "tool_calls" {
                    self.pending
                        .push(splicer::finish_frame(&envelope, choice.index, reason));
                }
            }
        }
    }

    async fn consume_resolved(&mut self, resolved: ResolvedTurn) {
        if let Some(content) = &resolved.content {
            self.pending
                .push(splicer::content_frame(&resolved.envelope, 0, content));
        }
        if let Some(call) = resolved.tool_call {
            let envelope = resolved.envelope.clone();
            self.resolve_call(call, &envelope, 0).await;
        }
    }

    /// One resolved tool call: map it to a department, dispatch, and splice
    /// the outcome under the triggering event's envelope.
    async fn resolve_call(&mut self, call: CompletedToolCall, envelope: &Envelope, index: u32) {
        let Some(department) = DepartmentKey::from_function_name(&call.name) else {
            tracing::debug!(function = %call.name, "ignoring tool call for unknown function");
            return;
        };

        self.turn_dispatched = true;
        tracing::info!(department = department.as_str(), "dispatching customer query");
        let text = match self
            .state
            .dispatcher
            .dispatch(
                &self.state.transport,
                department,
                call.customer_query(),
                self.thread_id.as_deref(),
            )
            .await
        {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(
                    department = department.as_str(),
                    error = %err,
                    "department call failed, splicing apology"
                );
                apology_text(department, &err)
            }
        };

        self.pending.push(splicer::content_frame(envelope, index, &text));
    }

    async fn end_of_turn(&mut self) {
        // A call still accumulating when its turn ends is abandoned silently.
        self.accumulator.reset();
        self.parser = LineParser::new();

        if !self.turn_dispatched {
            self.pending.push_static(DONE_FRAME);
            self.finished = true;
            self.turn = None;
            return;
        }

        self.turn_dispatched = false;
        match self
            .state
            .classifier
            .summary_turn(&self.state.transport, self.thread_id.as_deref())
            .await
        {
            Ok(turn) => {
                if turn.thread_id.is_some() {
                    self.thread_id = turn.thread_id;
                }
                self.turn = Some(ActiveTurn::from_turn_body(turn.body));
            }
            Err(err) => {
                // The stream is already committed; close it cleanly instead
                // of surfacing an HTTP error that can no longer be sent.
                tracing::error!(error = %err, "summary turn failed, terminating stream");
                self.pending.push_static(DONE_FRAME);
                self.finished = true;
                self.turn = None;
            }
        }
    }
}

fn apology_text(department: DepartmentKey, err: &EdgeError) -> String {
    match err {
        EdgeError::DepartmentUnavailable {
            status,
            status_text,
        } if *status != 0 => format!(
            "Sorry, our {} department is unavailable right now (status {status} {status_text}). Please try again shortly.",
            department.as_str()
        ),
        _ => format!(
            "Sorry, our {} department is unavailable right now. Please try again shortly.",
            department.as_str()
        ),
    }
}
