//! # Arcade Client Library
//!
//! This library provides the client-side synchronization layer for a family of
//! server-authoritative arcade games: a two-player paddle game, a three-player
//! circular variant of it, and a lane-based tower-defense battler. The remote
//! authority owns the simulation; the client consumes its ticks, draws them at
//! display rate and forwards player intents.
//!
//! ## Architecture Overview
//!
//! The client core is synchronous and single-threaded. It is driven from the
//! display-frame loop and receives the current time as an argument, which
//! keeps every state transition testable without a window or a socket.
//!
//! ### Transport
//! Each game family gets exactly one channel. A channel wraps a link: a pair
//! of queues fed by tokio tasks doing UDP I/O. The frame loop drains the
//! incoming queue once per frame and pushes outgoing intents without waiting
//! for acknowledgement.
//!
//! ### Listener Ownership
//! Messages are routed to subscriptions held per channel and purpose. A
//! subscription is a handle that its owner gives back to remove it, and a
//! channel accepts one live subscription per purpose. Only the session
//! controller creates or removes them.
//!
//! ### Startup Gate
//! The first tick of a match is held briefly, then shown frozen under a
//! 3-2-1 countdown. Ticks keep arriving meanwhile; only the latest survives.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! - One channel per game family with handshake, retry and backoff
//! - Silence detection and drop handling
//! - Listener teardown before any reconnect
//!
//! ### Matchmaking Module (`matchmaking`)
//! - Queue, tri-queue, solo and cancel intents
//! - Stale assignment guard keyed by room id
//!
//! ### Receiver Module (`receiver`)
//! - Last-write-wins tick storage
//! - Startup hold, countdown and ready flag
//!
//! ### Effects Module (`effects`)
//! - Life loss, death, explosion and countdown events derived from tick deltas
//! - Frame-budgeted expiry and atomic reset
//!
//! ### Render Module (`render`)
//! - Draw operations built in fixed layer order
//! - Per-family painters, palettes and the end sequence
//! - The macroquad canvas and out-of-match screens
//!
//! ### Input Module (`input`)
//! - Keyboard sampling with edge detection
//! - Transition-only paddle intents and troop spawn commands
//!
//! ### Session Module (`session`)
//! - Mode selection and per-match state
//! - The single teardown path for game over, quits and errors
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use arcade_client::config::ClientConfig;
//! use arcade_client::network::MemoryConnector;
//! use arcade_client::session::{Mode, SessionContext, SessionController};
//! use arcade_shared::Identity;
//! use std::time::Instant;
//!
//! let config = ClientConfig::resolve("127.0.0.1", 8080).unwrap();
//! let ctx = SessionContext::new(Identity::guest("ada"), "classic", config);
//! let mut session = SessionController::new(ctx, MemoryConnector::new());
//!
//! session.select_mode(Mode::PongQueue, Instant::now());
//! loop {
//!     session.update(Instant::now());
//!     let ops = session.frame();
//!     // hand `ops` to a canvas
//! #   break;
//! }
//! ```

pub mod app;
pub mod config;
pub mod connection;
pub mod effects;
pub mod error;
pub mod input;
pub mod listeners;
pub mod matchmaking;
pub mod network;
pub mod receiver;
pub mod render;
pub mod services;
pub mod session;

pub use config::{ClientConfig, RetryPolicy, Timing};
pub use error::{ClientError, LifecycleError, ProtocolError, TransportError};
pub use session::{Mode, SessionContext, SessionController};
