//! Projector screen travel.
//!
//! The screen reports nothing back, so arrival is inferred from a travel
//! timer. At most one timer is live; every new move supersedes the last.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::coordinator::Coordinator;
use super::error::Result;
use super::state::ScreenPosition;
use crate::config::ScreenTarget;

/// Sent by the timer task when the configured travel time has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct ScreenArrival {
    pub generation: u64,
    pub position: ScreenPosition,
}

/// Single-slot cancellable travel timer.
#[derive(Debug)]
pub(super) struct ScreenTimer {
    tx: mpsc::Sender<ScreenArrival>,
    pending: Option<(u64, JoinHandle<()>)>,
    generation: u64,
}

impl ScreenTimer {
    pub fn new(tx: mpsc::Sender<ScreenArrival>) -> Self {
        Self {
            tx,
            pending: None,
            generation: 0,
        }
    }

    /// Replace any pending timer with one reporting `position` after `delay`.
    pub fn schedule(&mut self, delay: std::time::Duration, position: ScreenPosition) {
        self.cancel();
        self.generation += 1;

        let generation = self.generation;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let arrival = ScreenArrival {
                generation,
                position,
            };
            // The coordinator is gone if this fails; nobody to tell.
            let _ = tx.send(arrival).await;
        });
        self.pending = Some((generation, handle));
    }

    /// Idempotent.
    pub fn cancel(&mut self) {
        if let Some((generation, handle)) = self.pending.take() {
            debug!("Cancelling screen timer #{}", generation);
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Claim the slot for `arrival`.
    ///
    /// An arrival may already be queued when its timer is cancelled, so it
    /// only counts if it belongs to the live timer. The slot is emptied before
    /// the caller touches any state.
    pub fn complete(&mut self, arrival: &ScreenArrival) -> bool {
        match self.pending {
            Some((generation, _)) if generation == arrival.generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for ScreenTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Coordinator {
    pub(super) async fn screen_up(&mut self) -> Result<()> {
        self.move_screen(ScreenTarget::Up).await
    }

    pub(super) async fn screen_down(&mut self) -> Result<()> {
        self.move_screen(ScreenTarget::Down).await
    }

    pub(super) async fn move_screen(&mut self, target: ScreenTarget) -> Result<()> {
        let destination = ScreenPosition::from(target);
        if self.state.screen_position == destination {
            debug!("Screen already {}", destination);
            return Ok(());
        }

        let config = self.config.load_full();
        let screen = &config.screen;
        let (command, travelling) = match target {
            ScreenTarget::Up => (&screen.up, ScreenPosition::Opening),
            ScreenTarget::Down => (&screen.down, ScreenPosition::Closing),
        };

        self.screen_timer.cancel();
        self.dispatcher.send(&screen.device_id, command).await?;

        self.state.screen_position = travelling;
        self.notify();
        self.screen_timer.schedule(screen.travel_time(), destination);
        Ok(())
    }

    /// Halt the screen wherever it is. The tracked position stays as it was,
    /// since the real resting place is unknown.
    pub(super) async fn screen_stop(&mut self) -> Result<()> {
        let config = self.config.load_full();
        let Some(stop) = config.screen.stop_command() else {
            debug!("No screen stop command configured");
            return Ok(());
        };

        if self.screen_timer.is_pending() {
            debug!("Stopping screen before its travel timer expired");
        }
        self.screen_timer.cancel();
        self.dispatcher.send(&config.screen.device_id, stop).await?;
        if self.state.screen_position.is_moving() {
            warn!(
                "Screen stopped while {}; actual position unknown",
                self.state.screen_position
            );
        }
        self.notify();
        Ok(())
    }

    pub(super) fn screen_arrived(&mut self, arrival: ScreenArrival) {
        if !self.screen_timer.complete(&arrival) {
            debug!("Ignoring stale screen timer #{}", arrival.generation);
            return;
        }

        info!("Screen reached {}", arrival.position);
        self.state.screen_position = arrival.position;
        self.notify();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::super::coordinator::testing::theater_config;
    use super::super::coordinator::testing::TestTheater;
    use super::*;

    const TRAVEL: Duration = Duration::from_secs(15);

    #[tokio::test(start_paused = true)]
    async fn test_screen_down_then_arrives() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;

        h.screen_down().await.unwrap();
        assert_eq!(h.screen_position(), ScreenPosition::Closing);
        assert_eq!(theater.sink.commands(), vec!["screen_down"]);

        tokio::time::sleep(TRAVEL - Duration::from_secs(1)).await;
        assert_eq!(h.screen_position(), ScreenPosition::Closing);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.screen_position(), ScreenPosition::Down);

        // Already down.
        h.screen_down().await.unwrap();
        assert_eq!(theater.sink.commands(), vec!["screen_down"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_move_supersedes_timer() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;

        h.screen_down().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        h.screen_up().await.unwrap();
        assert_eq!(h.screen_position(), ScreenPosition::Opening);

        // The superseded "down" timer would have fired here.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(h.screen_position(), ScreenPosition::Opening);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.screen_position(), ScreenPosition::Up);
        assert_eq!(theater.sink.commands(), vec!["screen_down", "screen_up"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_leaves_position_and_cancels_timer() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;

        h.screen_down().await.unwrap();
        h.screen_stop().await.unwrap();
        assert_eq!(h.screen_position(), ScreenPosition::Closing);

        tokio::time::sleep(TRAVEL * 2).await;
        assert_eq!(h.screen_position(), ScreenPosition::Closing);
        assert_eq!(theater.sink.commands(), vec!["screen_down", "screen_stop"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_on_settled_screen_still_sends() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;

        h.screen_stop().await.unwrap();
        assert_eq!(h.screen_position(), ScreenPosition::Up);
        assert_eq!(theater.sink.commands(), vec!["screen_stop"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_command_is_noop() {
        let mut config = theater_config();
        config.screen.stop = None;
        let theater = TestTheater::start_with(config, None).await;
        let h = &theater.handle;

        h.screen_down().await.unwrap();
        h.screen_stop().await.unwrap();
        assert_eq!(theater.sink.commands(), vec!["screen_down"]);

        // Timer untouched.
        tokio::time::sleep(TRAVEL + Duration::from_secs(1)).await;
        assert_eq!(h.screen_position(), ScreenPosition::Down);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arrival_lands_during_volume_ramp() {
        let mut config = theater_config();
        config.screen.travel_time_secs = 2.0;
        let theater = TestTheater::start_with(config, None).await;
        let h = theater.handle.clone();

        h.screen_down().await.unwrap();
        // 0.3 -> 1.0 is 35 presses, over 5 seconds of ramping.
        let ramp = {
            let h = h.clone();
            tokio::spawn(async move { h.set_volume_level(1.0).await })
        };

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!ramp.is_finished());
        assert_eq!(h.screen_position(), ScreenPosition::Down);

        ramp.await.unwrap().unwrap();
        assert_eq!(h.volume(), 1.0);
        assert_eq!(h.screen_position(), ScreenPosition::Down);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arrival_lands_during_scene_settle() {
        let mut config = theater_config();
        config.screen.travel_time_secs = 0.5;
        let theater = TestTheater::start_with(config, None).await;
        let h = &theater.handle;

        let positions = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sub = {
            let positions = positions.clone();
            h.register_listener(move |state| {
                positions.lock().unwrap().push(state.screen_position);
            })
        };

        // The screen lands while the scene waits for the amplifier.
        h.screen_down().await.unwrap();
        h.activate_scene("Movie Night").await.unwrap();
        sub.unregister();

        let positions = positions.lock().unwrap();
        assert_eq!(positions[0], ScreenPosition::Closing);
        assert_eq!(positions[2], ScreenPosition::Down);
        assert_eq!(h.screen_position(), ScreenPosition::Down);
        assert_eq!(theater.sink.commands().iter().filter(|c| *c == "screen_down").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_move_keeps_position() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;
        theater.sink.fail_on("screen_down");

        assert!(h.screen_down().await.is_err());
        assert_eq!(h.screen_position(), ScreenPosition::Up);

        tokio::time::sleep(TRAVEL * 2).await;
        assert_eq!(h.screen_position(), ScreenPosition::Up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_slot() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timer = ScreenTimer::new(tx);

        timer.cancel();
        assert!(!timer.is_pending());

        timer.schedule(Duration::from_secs(1), ScreenPosition::Down);
        timer.schedule(Duration::from_secs(2), ScreenPosition::Up);
        assert!(timer.is_pending());

        let arrival = rx.recv().await.unwrap();
        assert_eq!(arrival.position, ScreenPosition::Up);
        assert!(timer.complete(&arrival));
        assert!(!timer.is_pending());
        assert!(!timer.complete(&arrival));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_arrival_rejected() {
        let (tx, _rx) = mpsc::channel(4);
        let mut timer = ScreenTimer::new(tx);

        timer.schedule(Duration::from_secs(1), ScreenPosition::Down);
        let stale = ScreenArrival {
            generation: 1,
            position: ScreenPosition::Down,
        };
        timer.schedule(Duration::from_secs(1), ScreenPosition::Up);
        assert!(!timer.complete(&stale));
        assert!(timer.is_pending());
    }
}
