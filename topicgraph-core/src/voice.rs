//! Real-time voice session state machine.
//!
//! A session negotiates a bidirectional media + event exchange about one
//! topic and accumulates a transcript from side-channel events. The state
//! machine depends only on the [`SignalingTransport`] capability, not on a
//! concrete media stack, so tests substitute a scripted transport.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Side-channel event type carrying a transcript increment.
const TRANSCRIPT_DELTA_EVENT: &str = "response.audio_transcript.delta";

/// Identifier for one ephemeral voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceSessionId(pub Uuid);

impl VoiceSessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VoiceSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VoiceSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Ended,
    Error,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ended | SessionState::Error)
    }
}

/// Errors from voice-session negotiation and media handling.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Credential issuance failed: {0}")]
    Token(#[source] topicgraph_api::Error),

    #[error("Media capture failed: {0}")]
    Media(String),

    #[error("Signaling failed: {0}")]
    Signaling(String),

    #[error("Side channel failed: {0}")]
    Channel(String),

    #[error("Session was already started")]
    AlreadyStarted,
}

/// Events surfaced by a signaling transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A remote media frame arrived. The first one completes connection.
    RemoteTrack,

    /// A raw JSON message from the side channel.
    Message(String),

    /// The remote side closed the transport.
    Closed,
}

/// The media/signaling capability a session drives.
///
/// Implementations own the peer connection, local capture, and the side
/// channel; the session only sequences them.
#[async_trait]
pub trait SignalingTransport: Send {
    /// Start local media capture.
    async fn capture_local_media(&mut self) -> Result<(), SessionError>;

    /// Create the local offer and return its SDP.
    async fn create_offer(&mut self) -> Result<String, SessionError>;

    /// Apply the remote answer SDP.
    async fn set_remote_answer(&mut self, answer: &str) -> Result<(), SessionError>;

    /// Wait for the next transport event.
    async fn next_event(&mut self) -> Result<TransportEvent, SessionError>;

    /// Tear the transport down. Must be safe to call more than once.
    async fn close(&mut self);
}

/// Issues short-lived credentials scoped to a topic.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self, topic: &str) -> Result<String, topicgraph_api::Error>;
}

#[async_trait]
impl TokenIssuer for topicgraph_api::Client {
    async fn issue(&self, topic: &str) -> Result<String, topicgraph_api::Error> {
        self.create_voice_session(topic).await
    }
}

/// Exchanges a local SDP offer for the remote answer, authorized by an
/// ephemeral credential.
#[async_trait]
pub trait SdpExchange: Send + Sync {
    async fn exchange(
        &self,
        offer_sdp: &str,
        credential: &str,
    ) -> Result<String, topicgraph_api::Error>;
}

#[async_trait]
impl SdpExchange for topicgraph_api::Client {
    async fn exchange(
        &self,
        offer_sdp: &str,
        credential: &str,
    ) -> Result<String, topicgraph_api::Error> {
        self.exchange_sdp(offer_sdp, credential).await
    }
}

/// One real-time voice conversation about a topic.
///
/// States: `Idle -> Connecting -> Connected -> {Ended | Error}`. Whatever
/// transcript accumulated is retained through errors and handed back by
/// [`VoiceSession::end`], even if partial or empty. Only one session should
/// be active at a time; that exclusion belongs to the caller.
pub struct VoiceSession {
    id: VoiceSessionId,
    topic: String,
    state: SessionState,
    transcript: String,
    error: Option<String>,
    transport: Box<dyn SignalingTransport>,
    torn_down: bool,
}

impl VoiceSession {
    pub fn new(topic: impl Into<String>, transport: Box<dyn SignalingTransport>) -> Self {
        Self {
            id: VoiceSessionId::new(),
            topic: topic.into(),
            state: SessionState::Idle,
            transcript: String::new(),
            error: None,
            transport,
            torn_down: false,
        }
    }

    /// Negotiate the session up to `Connected`.
    ///
    /// Requests a topic-scoped credential, captures local media, runs the
    /// offer/answer exchange, and waits for the first remote media frame.
    /// Any failure moves the session to `Error` with a human-readable
    /// message; the transcript (possibly empty) is retained.
    pub async fn connect(
        &mut self,
        issuer: &dyn TokenIssuer,
        signaling: &dyn SdpExchange,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::AlreadyStarted);
        }
        self.state = SessionState::Connecting;
        debug!(session = %self.id, topic = %self.topic, "starting voice session");

        let credential = match issuer.issue(&self.topic).await {
            Ok(credential) => credential,
            Err(error) => return Err(self.fail(SessionError::Token(error))),
        };

        if let Err(error) = self.transport.capture_local_media().await {
            return Err(self.fail(error));
        }

        let offer = match self.transport.create_offer().await {
            Ok(offer) => offer,
            Err(error) => return Err(self.fail(error)),
        };

        let answer = match signaling.exchange(&offer, &credential).await {
            Ok(answer) => answer,
            Err(error) => {
                return Err(self.fail(SessionError::Signaling(error.to_string())));
            }
        };

        if let Err(error) = self.transport.set_remote_answer(&answer).await {
            return Err(self.fail(error));
        }

        // Connected only once the first remote frame arrives. Channel
        // messages may legitimately land first; apply them as usual.
        loop {
            match self.transport.next_event().await {
                Ok(TransportEvent::RemoteTrack) => {
                    self.state = SessionState::Connected;
                    debug!(session = %self.id, "voice session connected");
                    return Ok(());
                }
                Ok(TransportEvent::Message(raw)) => self.apply_channel_message(&raw),
                Ok(TransportEvent::Closed) => {
                    return Err(self.fail(SessionError::Channel(
                        "transport closed before the first remote frame".to_string(),
                    )));
                }
                Err(error) => return Err(self.fail(error)),
            }
        }
    }

    /// Consume transport events until the remote side closes or an error
    /// occurs, appending transcript deltas in arrival order.
    ///
    /// Returns when the side channel closes normally. Cancel-safe: callers
    /// typically race this against a user stop signal and then call
    /// [`VoiceSession::end`].
    pub async fn run(&mut self) -> Result<(), SessionError> {
        while self.state == SessionState::Connected {
            match self.transport.next_event().await {
                Ok(TransportEvent::Message(raw)) => self.apply_channel_message(&raw),
                Ok(TransportEvent::RemoteTrack) => {}
                Ok(TransportEvent::Closed) => break,
                Err(error) => return Err(self.fail(error)),
            }
        }
        Ok(())
    }

    /// Terminate the session and yield the accumulated transcript.
    ///
    /// Valid from any state: non-terminal states move to `Ended`, an
    /// errored session stays in `Error`. Teardown happens exactly once no
    /// matter how often this is called.
    pub async fn end(&mut self) -> String {
        if !self.torn_down {
            self.torn_down = true;
            self.transport.close().await;
            debug!(session = %self.id, "voice session torn down");
        }
        if !self.state.is_terminal() {
            self.state = SessionState::Ended;
        }
        self.transcript.clone()
    }

    fn apply_channel_message(&mut self, raw: &str) {
        match serde_json::from_str::<ChannelEvent>(raw) {
            Ok(event) if event.kind == TRANSCRIPT_DELTA_EVENT => {
                if let Some(delta) = event.delta {
                    self.transcript.push_str(&delta);
                }
            }
            // Every other event type is expected traffic, not an error.
            Ok(event) => debug!(session = %self.id, kind = %event.kind, "ignoring channel event"),
            Err(error) => {
                warn!(session = %self.id, %error, "ignoring unparseable channel message");
            }
        }
    }

    fn fail(&mut self, error: SessionError) -> SessionError {
        warn!(session = %self.id, %error, "voice session failed");
        self.state = SessionState::Error;
        self.error = Some(error.to_string());
        error
    }

    pub fn id(&self) -> VoiceSessionId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The transcript accumulated so far, in side-channel arrival order.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Human-readable failure message once the session is in `Error`.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// The subset of side-channel JSON the session understands.
#[derive(Debug, Deserialize)]
struct ChannelEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{delta_message, EchoSignaling, ScriptedTransport, StaticTokenIssuer};

    fn connected_script(events: Vec<TransportEvent>) -> ScriptedTransport {
        let mut script = vec![TransportEvent::RemoteTrack];
        script.extend(events);
        ScriptedTransport::with_events(script)
    }

    #[tokio::test]
    async fn test_session_happy_path() {
        let transport = connected_script(vec![
            TransportEvent::Message(delta_message("Hello")),
            TransportEvent::Message(delta_message(" world")),
            TransportEvent::Closed,
        ]);
        let closes = transport.close_count();
        let mut session = VoiceSession::new("Astronomy", Box::new(transport));
        assert_eq!(session.state(), SessionState::Idle);

        session
            .connect(&StaticTokenIssuer::new("ek-1"), &EchoSignaling::new())
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Connected);

        session.run().await.unwrap();
        let transcript = session.end().await;

        assert_eq!(transcript, "Hello world");
        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deltas_concatenate_in_arrival_order() {
        let transport = connected_script(vec![
            TransportEvent::Message(delta_message("b")),
            TransportEvent::Message(delta_message("a")),
            TransportEvent::Message(delta_message("c")),
            TransportEvent::Closed,
        ]);
        let mut session = VoiceSession::new("Astronomy", Box::new(transport));
        session
            .connect(&StaticTokenIssuer::new("ek-1"), &EchoSignaling::new())
            .await
            .unwrap();
        session.run().await.unwrap();

        // No reordering, no deduplication: channel order is authoritative.
        assert_eq!(session.end().await, "bac");
    }

    #[tokio::test]
    async fn test_unknown_events_and_bad_json_are_ignored() {
        let transport = connected_script(vec![
            TransportEvent::Message(r#"{"type": "response.done"}"#.to_string()),
            TransportEvent::Message("not json at all".to_string()),
            TransportEvent::Message(delta_message("ok")),
            TransportEvent::Closed,
        ]);
        let mut session = VoiceSession::new("Astronomy", Box::new(transport));
        session
            .connect(&StaticTokenIssuer::new("ek-1"), &EchoSignaling::new())
            .await
            .unwrap();
        session.run().await.unwrap();

        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.end().await, "ok");
    }

    #[tokio::test]
    async fn test_token_failure_moves_to_error() {
        let transport = ScriptedTransport::with_events(vec![]);
        let mut session = VoiceSession::new("Astronomy", Box::new(transport));

        let err = session
            .connect(&StaticTokenIssuer::failing("backend down"), &EchoSignaling::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Token(_)));
        assert_eq!(session.state(), SessionState::Error);
        assert!(session.error_message().unwrap().contains("backend down"));

        // Ending an errored session still yields the (empty) transcript.
        assert_eq!(session.end().await, "");
        assert_eq!(session.state(), SessionState::Error);
    }

    #[tokio::test]
    async fn test_error_before_any_delta_yields_empty_transcript() {
        let mut transport = ScriptedTransport::with_events(vec![]);
        transport.fail_offer("no media devices");
        let mut session = VoiceSession::new("Astronomy", Box::new(transport));

        let err = session
            .connect(&StaticTokenIssuer::new("ek-1"), &EchoSignaling::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Signaling(_) | SessionError::Media(_)));
        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(session.end().await, "");
    }

    #[tokio::test]
    async fn test_close_before_first_frame_is_an_error() {
        let transport = ScriptedTransport::with_events(vec![TransportEvent::Closed]);
        let mut session = VoiceSession::new("Astronomy", Box::new(transport));

        let err = session
            .connect(&StaticTokenIssuer::new("ek-1"), &EchoSignaling::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Channel(_)));
        assert_eq!(session.state(), SessionState::Error);
    }

    #[tokio::test]
    async fn test_deltas_before_first_frame_are_kept() {
        let transport = ScriptedTransport::with_events(vec![
            TransportEvent::Message(delta_message("early ")),
            TransportEvent::RemoteTrack,
            TransportEvent::Message(delta_message("late")),
            TransportEvent::Closed,
        ]);
        let mut session = VoiceSession::new("Astronomy", Box::new(transport));
        session
            .connect(&StaticTokenIssuer::new("ek-1"), &EchoSignaling::new())
            .await
            .unwrap();
        session.run().await.unwrap();

        assert_eq!(session.end().await, "early late");
    }

    #[tokio::test]
    async fn test_end_is_idempotent() {
        let transport = connected_script(vec![
            TransportEvent::Message(delta_message("once")),
            TransportEvent::Closed,
        ]);
        let closes = transport.close_count();
        let mut session = VoiceSession::new("Astronomy", Box::new(transport));
        session
            .connect(&StaticTokenIssuer::new("ek-1"), &EchoSignaling::new())
            .await
            .unwrap();
        session.run().await.unwrap();

        assert_eq!(session.end().await, "once");
        assert_eq!(session.end().await, "once");
        assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let transport = connected_script(vec![TransportEvent::Closed]);
        let mut session = VoiceSession::new("Astronomy", Box::new(transport));
        session
            .connect(&StaticTokenIssuer::new("ek-1"), &EchoSignaling::new())
            .await
            .unwrap();

        let err = session
            .connect(&StaticTokenIssuer::new("ek-1"), &EchoSignaling::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AlreadyStarted));
    }

    #[tokio::test]
    async fn test_signaling_sees_offer_and_credential() {
        let transport = connected_script(vec![TransportEvent::Closed]);
        let signaling = EchoSignaling::new();
        let mut session = VoiceSession::new("Astronomy", Box::new(transport));
        session
            .connect(&StaticTokenIssuer::new("ek-42"), &signaling)
            .await
            .unwrap();

        let (offer, credential) = signaling.last_exchange().expect("exchange happened");
        assert!(offer.starts_with("v=0"));
        assert_eq!(credential, "ek-42");
    }
}
