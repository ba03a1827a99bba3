//! The macroquad frame loop.
//!
//! Each display frame samples the keyboard, pumps the session, draws, and
//! hands finished results to the reporter. Network and HTTP work runs on the
//! tokio runtime; this loop only drains queues and never awaits on I/O.

use log::{debug, info, warn};
use macroquad::prelude::*;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

use arcade_shared::{PONG_HEIGHT, TOWER_WIDTH};

use crate::input::InputManager;
use crate::network::UdpConnector;
use crate::render::canvas::MacroquadCanvas;
use crate::services::ResultReporter;
use crate::session::{SessionContext, SessionController};

/// How long a closing window waits for quit and goodbye datagrams.
const SHUTDOWN_FLUSH: Duration = Duration::from_millis(500);

pub struct App {
    runtime: Runtime,
    session: SessionController<UdpConnector>,
    input: InputManager,
    canvas: MacroquadCanvas,
    reporter: Option<ResultReporter>,
}

impl App {
    pub fn new(ctx: SessionContext, runtime: Runtime) -> Self {
        let connector = UdpConnector::new(runtime.handle().clone(), ctx.config.server_addr);
        let reporter = ctx.config.results_url.as_deref().map(ResultReporter::new);
        Self {
            session: SessionController::new(ctx, connector),
            runtime,
            input: InputManager::new(),
            canvas: MacroquadCanvas::new(TOWER_WIDTH, PONG_HEIGHT),
            reporter,
        }
    }

    /// One display frame.
    pub fn tick(&mut self) {
        let now = Instant::now();
        let keys = self.input.sample();

        self.session.handle_keys(&keys, now);
        self.session.update(now);

        let ops = self.session.frame();
        self.canvas.execute(&ops);

        for result in self.session.take_results() {
            match &self.reporter {
                Some(reporter) => {
                    reporter.spawn_report(self.runtime.handle(), result);
                }
                None => debug!("No results endpoint, dropping {:?}", result),
            }
        }
    }

    pub async fn run(mut self) {
        prevent_quit();

        let draining = loop {
            if is_quit_requested() {
                info!("Window closed, shutting down");
                break self.session.shutdown();
            }

            self.tick();
            next_frame().await;
        };

        self.runtime.block_on(async {
            let deadline = tokio::time::Instant::now() + SHUTDOWN_FLUSH;
            for task in draining {
                if tokio::time::timeout_at(deadline, task).await.is_err() {
                    warn!("Gave up flushing outgoing messages after {:?}", SHUTDOWN_FLUSH);
                    break;
                }
            }
        });
        self.runtime.shutdown_background();
    }
}
