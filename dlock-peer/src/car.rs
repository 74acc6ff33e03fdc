//! A car lapping the track, claiming the bridge through its node.

use std::sync::Arc;
use std::time::Duration;

use dlock_core::Algorithm;
use tracing::{info, instrument, warn};

use crate::display::{DisplayReporter, PositionReport};
use crate::track::{Direction, Track};

/// Every this many steps the car reports its position and pauses.
pub const REPORT_EVERY: usize = 5;

pub struct Car<A: Algorithm> {
    node: Arc<A>,
    track: Arc<Track>,
    direction: Direction,
    display: Option<DisplayReporter>,
    step_delay: Duration,
}

impl<A: Algorithm> Car<A> {
    pub fn new(node: Arc<A>, track: Arc<Track>, display: Option<DisplayReporter>) -> Self {
        let direction = Direction::initial(node.id());
        Self {
            node,
            track,
            direction,
            display,
            step_delay: Duration::from_millis(200),
        }
    }

    #[must_use]
    pub fn with_step_delay(mut self, step_delay: Duration) -> Self {
        self.step_delay = step_delay;
        self
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Drives from `start` to the end of the lap.
    #[instrument(skip(self), fields(node = %self.node.id()))]
    pub async fn lap(&mut self, start: usize) {
        for step in start..self.track.len() {
            if step == self.track.bridge_entry(self.direction) {
                self.cross().await;
            } else if step == self.track.bridge_exit(self.direction) {
                info!(direction = ?self.direction, "leaving bridge");
                self.node.leave_section().await;
                self.direction = self.direction.flip();
            }

            if step % REPORT_EVERY == 0 {
                self.report(step).await;
                tokio::time::sleep(self.step_delay).await;
            }
        }
    }

    async fn cross(&self) {
        info!(direction = ?self.direction, "waiting for bridge");
        self.node.request_entry(self.direction.group()).await;
        self.node.await_entry().await;
        self.node.enter_section().await;
        info!(direction = ?self.direction, "on bridge");
    }

    async fn report(&self, step: usize) {
        let Some(display) = &self.display else {
            return;
        };
        let report = PositionReport {
            sender: self.node.id(),
            position: self.track.position(step),
            angle: self.track.angle(step),
        };
        if let Err(error) = display.report(&report).await {
            warn!(?error, "position report failed");
        }
    }
}
