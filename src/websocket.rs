//! # Conversational WebSocket Handler
//!
//! One persistent duplex channel per client at `/ws/{client_id}`. Each
//! connection is an independent actor that registers itself with the
//! session registry, feeds inbound messages to the pipeline orchestrator,
//! and writes the orchestrator's frames back to the socket.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: client connects with its id in the path
//! 2. **Text turns**: JSON frames `{"text": "...", "language": "kn"?}`
//! 3. **Audio turns**: binary frames of WAV or raw PCM bytes, optionally
//!    preceded by a `{"language": "kn"}` tag frame
//! 4. **Responses**: per-stage status frames, then one terminal frame
//!
//! ## Single-Flight Per Session:
//! Messages from one client are processed strictly sequentially. While a
//! pipeline run is in flight the actor buffers further inbound messages
//! and only starts the next one after the terminal frame went out, so
//! frames of consecutive messages can never interleave. Different clients
//! run fully in parallel.

use crate::pipeline::events::{ServerEvent, TextFrame};
use crate::pipeline::orchestrator::{PipelineOrchestrator, TurnInput};
use crate::session::registry::{OutboundFrame, Session, SessionRegistry};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the server pings idle connections.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long a client may stay silent before the connection is dropped.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Internal actor message: the in-flight pipeline run emitted its
/// terminal frame.
#[derive(Message)]
#[rtype(result = "()")]
struct TurnFinished;

/// WebSocket actor for one client connection.
pub struct ChatSocket {
    client_id: String,
    state: web::Data<AppState>,
    registry: Arc<SessionRegistry>,
    orchestrator: Arc<PipelineOrchestrator>,

    /// Registry entry for this connection; set in `started`
    session: Option<Arc<Session>>,

    /// Language tag announced for the next binary frame
    pending_language: Option<String>,

    /// Whether a pipeline run is currently executing
    in_flight: bool,

    /// Messages received while a run was in flight, in arrival order
    queued: VecDeque<TurnInput>,

    last_heartbeat: Instant,
}

impl ChatSocket {
    pub fn new(
        client_id: String,
        state: web::Data<AppState>,
        registry: Arc<SessionRegistry>,
        orchestrator: Arc<PipelineOrchestrator>,
    ) -> Self {
        Self {
            client_id,
            state,
            registry,
            orchestrator,
            session: None,
            pending_language: None,
            in_flight: false,
            queued: VecDeque::new(),
            last_heartbeat: Instant::now(),
        }
    }

    /// Queue or start processing one inbound message.
    fn submit(&mut self, input: TurnInput, ctx: &mut ws::WebsocketContext<Self>) {
        if self.in_flight {
            debug!(
                client_id = %self.client_id,
                queued = self.queued.len() + 1,
                "Turn in flight, queueing message"
            );
            self.queued.push_back(input);
        } else {
            self.start_run(input, ctx);
        }
    }

    /// Spawn the pipeline run for one message.
    ///
    /// The run owns the session Arc for its duration; the terminal frame
    /// is emitted inside `run_turn`, and `TurnFinished` lands in this
    /// actor's mailbox strictly after it.
    fn start_run(&mut self, input: TurnInput, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(session) = self.session.clone() else {
            warn!(client_id = %self.client_id, "Dropping message before session registration");
            return;
        };

        self.in_flight = true;
        let orchestrator = self.orchestrator.clone();
        let state = self.state.clone();
        let addr = ctx.address();

        tokio::spawn(async move {
            let ok = orchestrator.run_turn(session, input).await;
            state.record_turn(ok);
            addr.do_send(TurnFinished);
        });
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, message: &str) {
        let frame = ServerEvent::Error {
            message: message.to_string(),
        };
        if let Ok(json) = serde_json::to_string(&frame) {
            ctx.text(json);
        }
        warn!(client_id = %self.client_id, message, "WebSocket protocol error frame sent");
    }
}

impl Actor for ChatSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Register the connection and start the heartbeat.
    fn started(&mut self, ctx: &mut Self::Context) {
        let session = self
            .registry
            .connect(&self.client_id, ctx.address().recipient());
        session.send(ServerEvent::Connected {
            message: "Connected. Ready to chat.".to_string(),
        });
        self.session = Some(session);
        self.state.increment_active_sessions();

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(client_id = %act.client_id, "WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    /// Deregister the connection.
    ///
    /// An in-flight run keeps its own Arc to the session; its remaining
    /// frames land in this actor's dead letter box and are dropped, and
    /// its history writes complete in the background.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(session) = &self.session {
            self.registry.disconnect(&self.client_id, session.generation);
        }
        self.state.decrement_active_sessions();
        info!(client_id = %self.client_id, "WebSocket connection stopped");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChatSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<TextFrame>(&text) {
                Ok(frame) => match frame.into_inbound() {
                    Ok(crate::pipeline::events::Inbound::Utterance { text, language }) => {
                        self.submit(TurnInput::Text { text, language }, ctx);
                    }
                    Ok(crate::pipeline::events::Inbound::LanguageHint(language)) => {
                        debug!(client_id = %self.client_id, language = %language, "Language tag for next audio frame");
                        self.pending_language = Some(language);
                    }
                    Err(reason) => {
                        self.send_error(ctx, &format!("Invalid message: {}", reason));
                    }
                },
                Err(err) => {
                    self.send_error(ctx, &format!("Invalid JSON: {}", err));
                }
            },
            Ok(ws::Message::Binary(data)) => {
                let language = self.pending_language.take();
                self.submit(
                    TurnInput::Audio {
                        bytes: data.to_vec(),
                        language,
                    },
                    ctx,
                );
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(client_id = %self.client_id, ?reason, "WebSocket closed by client");
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(client_id = %self.client_id, "Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                warn!(client_id = %self.client_id, error = %err, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Write one outbound frame to the socket.
impl Handler<OutboundFrame> for ChatSocket {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        match serde_json::to_string(&msg.0) {
            Ok(json) => ctx.text(json),
            Err(err) => warn!(client_id = %self.client_id, error = %err, "Failed to serialize frame"),
        }
    }
}

/// Start the next queued message, if any.
impl Handler<TurnFinished> for ChatSocket {
    type Result = ();

    fn handle(&mut self, _msg: TurnFinished, ctx: &mut Self::Context) {
        self.in_flight = false;
        if let Some(next) = self.queued.pop_front() {
            self.start_run(next, ctx);
        }
    }
}

/// WebSocket endpoint handler: upgrades `/ws/{client_id}`.
///
/// Reconnecting clients replace their previous session; genuinely new
/// clients are rejected once the session limit is reached.
pub async fn chat_websocket(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    app_state: web::Data<AppState>,
    registry: web::Data<Arc<SessionRegistry>>,
    orchestrator: web::Data<Arc<PipelineOrchestrator>>,
) -> ActixResult<HttpResponse> {
    let client_id = path.into_inner();
    info!(
        client_id = %client_id,
        peer = ?req.connection_info().peer_addr(),
        "New WebSocket connection request"
    );

    if client_id.trim().is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "client id must not be empty"
        })));
    }

    let config = app_state.get_config();
    let is_reconnect = registry.get(&client_id).is_ok();
    if !is_reconnect && registry.active_count() >= config.performance.max_concurrent_sessions {
        warn!(client_id = %client_id, "Rejecting connection: session limit reached");
        return Ok(HttpResponse::ServiceUnavailable().json(json!({
            "error": format!(
                "Maximum concurrent sessions ({}) reached",
                config.performance.max_concurrent_sessions
            )
        })));
    }

    let socket = ChatSocket::new(
        client_id,
        app_state,
        registry.get_ref().clone(),
        orchestrator.get_ref().clone(),
    );

    ws::start(socket, &req, stream)
}
