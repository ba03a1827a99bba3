//! Session lifecycle: mode selection, match setup and teardown.
//!
//! The controller is the only place that installs or removes listener sets.
//! Every mode switch removes the previous set before the next one goes in, so a
//! channel never carries more than one subscription per purpose. Per-match
//! state lives in [`MatchState`] and is dropped as a whole when the match ends.

use arcade_shared::{
    tri_center, ClientMessage, GameFamily, Identity, Point, ServerMessage, Snapshot, PONG_HEIGHT,
    PONG_WIDTH, TOWER_HEIGHT, TOWER_WIDTH,
};
use log::{debug, error, info, warn};
use std::time::Instant;
use tokio::task::JoinHandle;

use crate::config::{ClientConfig, Timing};
use crate::connection::{ChannelEvent, ConnectionManager};
use crate::effects::EffectMachine;
use crate::error::ProtocolError;
use crate::input::{KeyState, Relay};
use crate::listeners::{Purpose, SubscriptionHandle};
use crate::matchmaking::{MatchmakingClient, RoomHandle};
use crate::network::Connector;
use crate::receiver::{Accepted, SnapshotReceiver};
use crate::render::screens::{self, Screen};
use crate::render::{DrawOp, FrameSignal, Outcome, Palette, RenderLoop};
use crate::services::MatchResult;

/// Built once at startup and owned by the controller for the whole session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub identity: Identity,
    pub skin: String,
    pub config: ClientConfig,
}

impl SessionContext {
    pub fn new(identity: Identity, skin: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            identity,
            skin: skin.into(),
            config,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    PongQueue,
    PongSolo,
    TriQueue,
    TowerQueue,
    TowerSolo,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::PongQueue,
        Mode::PongSolo,
        Mode::TriQueue,
        Mode::TowerQueue,
        Mode::TowerSolo,
    ];

    pub fn family(&self) -> GameFamily {
        match self {
            Mode::PongQueue | Mode::PongSolo => GameFamily::Pong,
            Mode::TriQueue => GameFamily::Tri,
            Mode::TowerQueue | Mode::TowerSolo => GameFamily::Tower,
        }
    }

    pub fn is_solo(&self) -> bool {
        matches!(self, Mode::PongSolo | Mode::TowerSolo)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::PongQueue => "Pong: find opponent",
            Mode::PongSolo => "Pong: local two player",
            Mode::TriQueue => "Tri Pong: three player",
            Mode::TowerQueue => "Towers: find opponent",
            Mode::TowerSolo => "Towers: solo",
        }
    }

    /// Menu digits start at 1.
    pub fn from_digit(digit: u8) -> Option<Mode> {
        Mode::ALL
            .get((digit as usize).checked_sub(1)?)
            .copied()
    }

    fn intent(&self, matchmaking: &mut MatchmakingClient, identity: &Identity) -> ClientMessage {
        match self {
            Mode::PongQueue | Mode::TowerQueue => matchmaking.join_queue(self.family(), identity),
            Mode::TriQueue => matchmaking.join_tri_queue(identity),
            Mode::PongSolo | Mode::TowerSolo => matchmaking.start_solo(self.family(), identity),
        }
    }
}

fn arena_center(family: GameFamily) -> Point {
    match family {
        GameFamily::Pong => Point::new(PONG_WIDTH / 2.0, PONG_HEIGHT / 2.0),
        GameFamily::Tri => tri_center(),
        GameFamily::Tower => Point::new(TOWER_WIDTH / 2.0, TOWER_HEIGHT / 2.0),
    }
}

/// Everything that exists only while a room is bound.
pub struct MatchState {
    pub room: RoomHandle,
    pub receiver: SnapshotReceiver,
    pub effects: EffectMachine,
    pub render_loop: RenderLoop,
    pub relay: Relay,
    snapshots: SubscriptionHandle,
    observed: Option<Snapshot>,
}

impl MatchState {
    fn new(room: RoomHandle, snapshots: SubscriptionHandle, timing: Timing, palette: Palette) -> Self {
        let family = room.family;
        Self {
            receiver: SnapshotReceiver::new(family, timing),
            effects: EffectMachine::new(family),
            render_loop: RenderLoop::new(
                family,
                palette,
                Self::seat_of(&room),
                timing.end_sequence_frames,
            ),
            relay: Relay::for_room(&room),
            room,
            snapshots,
            observed: None,
        }
    }

    /// The seat drawn as "yours". Local solo games control every seat, so none is singled out.
    fn seat_of(room: &RoomHandle) -> Option<usize> {
        if room.solo {
            None
        } else {
            Some(room.seat.index())
        }
    }

    pub fn local_seat(&self) -> Option<usize> {
        Self::seat_of(&self.room)
    }

    pub fn snapshots(&self) -> SubscriptionHandle {
        self.snapshots
    }

    /// Stores the tick and derives effects against the previous one. Returns true on a terminal tick.
    ///
    /// While the frozen first tick is on screen, later ticks only move the baseline forward:
    /// effects start with the first step that is actually drawn.
    fn accept(&mut self, snapshot: Snapshot, now: Instant) -> Result<bool, ProtocolError> {
        if self.receiver.accept(snapshot, now)? == Accepted::Ignored {
            return Ok(false);
        }
        let Some(current) = self.receiver.latest().cloned() else {
            return Ok(false);
        };

        let terminal = current.game_over();
        match &self.observed {
            Some(previous) if self.receiver.is_ready() || terminal => {
                self.effects.observe(previous, &current, now);
            }
            _ => {
                debug!("tick {} held behind the countdown", current.tick());
                self.effects.prime(&current);
            }
        }

        if terminal {
            self.receiver.stop();
        }
        self.observed = Some(current);
        Ok(terminal)
    }

    fn advance(&mut self, now: Instant) {
        let center = arena_center(self.room.family);
        for digit in self.receiver.advance(now) {
            self.effects.countdown(digit, center, now);
        }
    }

    /// Only seat 0 reports, so a two-sided match is persisted once.
    fn result(&self, identity: &Identity) -> Option<MatchResult> {
        let snapshot = self.receiver.latest()?;
        if !snapshot.game_over() || self.room.seat.index() != 0 {
            return None;
        }

        let (score_a, score_b) = snapshot.scores();
        let winner_id = match snapshot.winner() {
            Some(winner) if self.room.solo || winner == self.room.seat.index() => identity.user_id,
            _ => None,
        };
        Some(MatchResult {
            winner_id,
            score_a,
            score_b,
        })
    }
}

pub struct SessionController<C: Connector> {
    ctx: SessionContext,
    palette: Palette,
    connections: ConnectionManager<C>,
    matchmaking: MatchmakingClient,
    screen: Screen,
    mode: Option<Mode>,
    pending: Option<ClientMessage>,
    listeners: Vec<SubscriptionHandle>,
    current: Option<MatchState>,
    notice: Option<String>,
    results: Vec<MatchResult>,
}

impl<C: Connector> SessionController<C> {
    pub fn new(ctx: SessionContext, connector: C) -> Self {
        let palette = Palette::lookup(&ctx.skin);
        let connections = ConnectionManager::new(connector, ctx.config.retry);
        Self {
            ctx,
            palette,
            connections,
            matchmaking: MatchmakingClient::new(),
            screen: Screen::ModeSelect,
            mode: None,
            pending: None,
            listeners: Vec::new(),
            current: None,
            notice: None,
            results: Vec::new(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn connections(&self) -> &ConnectionManager<C> {
        &self.connections
    }

    pub fn matchmaking(&self) -> &MatchmakingClient {
        &self.matchmaking
    }

    pub fn current_match(&self) -> Option<&MatchState> {
        self.current.as_ref()
    }

    /// Live listener subscriptions across every channel.
    pub fn listener_count(&self) -> usize {
        self.connections.listener_count()
    }

    /// Results waiting to be reported.
    pub fn take_results(&mut self) -> Vec<MatchResult> {
        std::mem::take(&mut self.results)
    }

    /// Tears down whatever is running, then queues (or starts) `mode`.
    pub fn select_mode(&mut self, mode: Mode, now: Instant) {
        let family = mode.family();
        info!("Selected mode: {}", mode.label());

        self.leave_current();
        for other in self.connections.open_families() {
            if other != family {
                self.connections.close(other);
                self.matchmaking.forget(other);
            }
        }

        self.mode = Some(mode);
        self.notice = None;
        self.pending = Some(mode.intent(&mut self.matchmaking, &self.ctx.identity));
        self.screen = Screen::Queued {
            mode,
            connecting: true,
        };

        let events = self.connections.open(family, now);
        self.handle_events(events, now);

        if self.connections.is_open(family) {
            self.on_opened(family);
        }
    }

    /// Leaves the queue and returns to mode select.
    pub fn cancel(&mut self) {
        if let Some(message) = self.matchmaking.cancel() {
            self.send(message);
        }
        self.pending = None;
        self.remove_listeners();
        self.screen = Screen::ModeSelect;
    }

    /// Explicit quit: tells the authority, then tears down to mode select.
    pub fn quit_match(&mut self) {
        let Some(mut current) = self.teardown_match() else {
            return;
        };
        for message in current.relay.release_all() {
            self.send(message);
        }
        info!("Quitting room {}", current.room.room_id);
        self.send(ClientMessage::QuitMatch {
            room_id: current.room.room_id.clone(),
            username: self.ctx.identity.username.clone(),
        });
        self.remove_listeners();
        self.screen = Screen::ModeSelect;
    }

    /// Single exit path for game over, opponent loss and in-match errors.
    pub fn finish_match(&mut self, outcome: Outcome) {
        let Some(current) = self.teardown_match() else {
            return;
        };
        info!(
            "Room {} finished after {} ticks: {:?}",
            current.room.room_id,
            current.receiver.received(),
            outcome
        );

        if let Some(result) = current.result(&self.ctx.identity) {
            self.results.push(result);
        }
        self.remove_listeners();
        self.screen = Screen::EndScreen { outcome };
    }

    /// Pumps every channel and advances the startup countdown.
    pub fn update(&mut self, now: Instant) {
        let events = self.connections.poll(now);
        self.handle_events(events, now);

        if let Some(current) = self.current.as_mut() {
            current.advance(now);
        }
    }

    pub fn handle_keys(&mut self, keys: &KeyState, now: Instant) {
        match self.screen {
            Screen::ModeSelect => {
                if let Some(mode) = keys.digit.and_then(Mode::from_digit) {
                    self.select_mode(mode, now);
                }
            }
            Screen::Queued { .. } => {
                if keys.escape {
                    self.cancel();
                }
            }
            Screen::InMatch => {
                if keys.escape {
                    self.quit_match();
                    return;
                }
                let intents = match self.current.as_mut() {
                    Some(current) => current.relay.relay(keys),
                    None => Vec::new(),
                };
                for intent in intents {
                    self.send(intent);
                }
            }
            Screen::EndScreen { .. } => {
                if keys.enter || keys.escape {
                    self.notice = None;
                    self.screen = Screen::ModeSelect;
                }
            }
        }
    }

    /// Draw ops for the screen that owns the surface this frame.
    pub fn frame(&mut self) -> Vec<DrawOp> {
        if let Some(current) = self.current.as_mut() {
            let (ops, signal) = current
                .render_loop
                .frame(current.receiver.view(), &current.effects);
            current.effects.advance_frame();

            if let FrameSignal::Teardown(outcome) = signal {
                self.finish_match(outcome);
            }
            return ops;
        }

        screens::paint(
            &self.screen,
            &self.palette,
            &self.ctx.identity.username,
            self.notice.as_deref(),
        )
    }

    /// Leaves any match or queue and closes every channel. The returned tasks
    /// finish once the goodbyes queued here are on the wire.
    pub fn shutdown(&mut self) -> Vec<JoinHandle<()>> {
        self.leave_current();
        for family in self.connections.open_families() {
            self.matchmaking.forget(family);
        }
        self.screen = Screen::ModeSelect;
        self.connections.close_all()
    }

    fn handle_events(&mut self, events: Vec<ChannelEvent>, now: Instant) {
        for event in events {
            let family = match &event {
                ChannelEvent::Opened { family, .. }
                | ChannelEvent::Delivered { family, .. }
                | ChannelEvent::Retrying { family, .. }
                | ChannelEvent::Lost { family, .. }
                | ChannelEvent::GaveUp { family, .. } => *family,
            };
            if self.mode.map(|m| m.family()) != Some(family) {
                debug!("Ignoring {:?} for inactive {} channel", event, family);
                continue;
            }

            match event {
                ChannelEvent::Opened { client_id, .. } => {
                    debug!("{} channel open as client {}", family, client_id);
                    self.on_opened(family);
                }
                ChannelEvent::Delivered { delivery, .. } => self.on_message(delivery.message, now),
                ChannelEvent::Retrying { attempt, .. } => {
                    if self.matchmaking.is_waiting() {
                        self.notice = Some(format!(
                            "Reconnecting (attempt {}/{})",
                            attempt,
                            self.connections.policy().max_attempts
                        ));
                    }
                }
                ChannelEvent::Lost { reason, .. } => {
                    self.on_transport_loss(family, format!("Connection lost: {}", reason));
                }
                ChannelEvent::GaveUp { attempts, .. } => {
                    self.on_transport_loss(family, format!(
                        "Could not reach the {} server after {} attempts",
                        family, attempts
                    ));
                }
            }
        }
    }

    fn on_opened(&mut self, family: GameFamily) {
        let Some(intent) = self.pending.take() else {
            return;
        };

        self.install_listeners(family);
        debug!("Flushing {:?} on {}", intent, family);
        self.send(intent);
        if let Screen::Queued { mode, .. } = self.screen {
            self.screen = Screen::Queued {
                mode,
                connecting: false,
            };
        }
        self.notice = None;
    }

    fn on_message(&mut self, message: ServerMessage, now: Instant) {
        match message {
            ServerMessage::Queued { room_id } => {
                if let Err(e) = self.matchmaking.on_queued(room_id) {
                    warn!("Ignoring queue ack: {}", e);
                }
            }
            ServerMessage::MatchFound {
                room_id,
                seat,
                opponent,
            } => match self.matchmaking.on_match_found(room_id, seat, opponent) {
                Ok(room) => self.begin_match(room),
                Err(e) => warn!("Discarding assignment: {}", e),
            },
            ServerMessage::StateUpdate { snapshot } => {
                let Some(current) = self.current.as_mut() else {
                    debug!("Tick {} without a bound room", snapshot.tick());
                    return;
                };
                if let Err(e) = current.accept(snapshot, now) {
                    warn!("Discarding tick for room {}: {}", current.room.room_id, e);
                }
            }
            ServerMessage::BallExplode { x, y } => {
                if let Some(current) = self.current.as_mut() {
                    current.effects.authority_explosion(Point::new(x, y), now);
                }
            }
            ServerMessage::Error { message } => self.on_authority_error(message),
            ServerMessage::OpponentLeft => {
                if self.current.is_some() {
                    self.notice = Some("Opponent left the match".to_string());
                    self.finish_match(Outcome::Aborted);
                }
            }
            other @ (ServerMessage::Connected { .. } | ServerMessage::Disconnected { .. }) => {
                warn!("{}", ProtocolError::Unexpected(other.kind()));
            }
        }
    }

    fn on_authority_error(&mut self, message: String) {
        warn!("Authority error: {}", message);
        if self.current.is_some() {
            self.notice = Some(message);
            self.finish_match(Outcome::Aborted);
        } else if self.matchmaking.is_waiting() {
            self.matchmaking.leave();
            self.pending = None;
            self.remove_listeners();
            self.notice = Some(message);
            self.screen = Screen::ModeSelect;
        }
    }

    fn on_transport_loss(&mut self, family: GameFamily, notice: String) {
        warn!("{}", notice);
        if let Some(current) = self.teardown_match() {
            info!("Dropped room {}", current.room.room_id);
        }
        self.matchmaking.leave();
        self.matchmaking.forget(family);
        self.pending = None;
        self.remove_listeners();
        self.notice = Some(notice);
        self.screen = Screen::ModeSelect;
    }

    fn begin_match(&mut self, room: RoomHandle) {
        let family = room.family;
        let snapshots = match self.connections.subscribe(family, Purpose::Snapshots) {
            Ok(handle) => handle,
            Err(e) => {
                error!("Cannot follow room {}: {}", room.room_id, e);
                self.matchmaking.leave();
                self.remove_listeners();
                self.screen = Screen::ModeSelect;
                return;
            }
        };

        self.send(ClientMessage::Ready {
            room_id: room.room_id.clone(),
        });
        info!(
            "Entering room {} as {:?} against {}",
            room.room_id,
            room.seat,
            room.opponent.as_deref().unwrap_or("nobody")
        );
        self.current = Some(MatchState::new(
            room,
            snapshots,
            self.ctx.config.timing,
            self.palette.clone(),
        ));
        self.screen = Screen::InMatch;
    }

    fn teardown_match(&mut self) -> Option<MatchState> {
        let current = self.current.take()?;
        if let Err(e) = self.connections.unsubscribe(current.snapshots) {
            debug!("Snapshot listener already gone: {}", e);
        }
        self.matchmaking.leave();
        Some(current)
    }

    fn leave_current(&mut self) {
        if self.current.is_some() {
            self.quit_match();
        } else if let Some(message) = self.matchmaking.cancel() {
            self.send(message);
        }
        self.pending = None;
        self.remove_listeners();
    }

    fn install_listeners(&mut self, family: GameFamily) {
        self.remove_listeners();
        for purpose in [Purpose::Matchmaking, Purpose::Lifecycle] {
            match self.connections.subscribe(family, purpose) {
                Ok(handle) => self.listeners.push(handle),
                Err(e) => error!("Failed to subscribe {:?} on {}: {}", purpose, family, e),
            }
        }
    }

    fn remove_listeners(&mut self) {
        for handle in self.listeners.drain(..) {
            if let Err(e) = self.connections.unsubscribe(handle) {
                debug!("{:?} listener already gone: {}", handle.purpose(), e);
            }
        }
    }

    fn send(&mut self, message: ClientMessage) {
        let Some(family) = self.mode.map(|m| m.family()) else {
            return;
        };
        if let Err(e) = self.connections.send(family, message) {
            warn!("Dropping intent: {}", e);
        }
    }
}
