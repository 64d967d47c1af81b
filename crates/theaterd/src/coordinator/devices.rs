//! Amplifier and HDMI switch operations.

use std::time::Duration;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::coordinator::Coordinator;
use super::error::Result;
use super::state::clamp_volume;
use super::state::step_down;
use super::state::step_up;
use super::state::VolumeRamp;

/// Pause after each press of a volume ramp. The amplifier drops IR repeats
/// that arrive faster than this.
pub(super) const VOLUME_STEP_DELAY: Duration = Duration::from_millis(150);

impl Coordinator {
    pub(super) async fn power_on(&mut self) -> Result<()> {
        if self.state.amp_power {
            debug!("Amplifier already on");
            return Ok(());
        }

        let amp = self.config.load_full().amplifier.clone();
        self.dispatcher.send(&amp.device_id, &amp.power_on).await?;
        self.state.amp_power = true;
        self.notify();
        Ok(())
    }

    pub(super) async fn power_off(&mut self) -> Result<()> {
        if !self.state.amp_power {
            debug!("Amplifier already off");
            return Ok(());
        }

        let amp = self.config.load_full().amplifier.clone();
        self.dispatcher.send(&amp.device_id, &amp.power_off).await?;
        self.state.amp_power = false;
        self.clear_scene_unless_active();
        self.notify();
        Ok(())
    }

    /// Always sends the press, even at full scale: the amplifier's own range
    /// may extend past what we track.
    pub(super) async fn volume_up(&mut self) -> Result<()> {
        let config = self.config.load_full();
        let amp = &config.amplifier;
        self.dispatcher.send(&amp.device_id, &amp.volume_up).await?;
        self.state.volume = step_up(self.state.volume, amp.volume_step());
        self.clear_scene_unless_active();
        self.notify();
        Ok(())
    }

    pub(super) async fn volume_down(&mut self) -> Result<()> {
        let config = self.config.load_full();
        let amp = &config.amplifier;
        self.dispatcher.send(&amp.device_id, &amp.volume_down).await?;
        self.state.volume = step_down(self.state.volume, amp.volume_step());
        self.clear_scene_unless_active();
        self.notify();
        Ok(())
    }

    pub(super) async fn mute_toggle(&mut self) -> Result<()> {
        let amp = self.config.load_full().amplifier.clone();
        self.dispatcher.send(&amp.device_id, &amp.mute).await?;
        self.state.muted = !self.state.muted;
        self.notify();
        Ok(())
    }

    /// Mute is a toggle on the wire, so only press it when the tracked flag
    /// disagrees with the request.
    pub(super) async fn set_muted(&mut self, muted: bool) -> Result<()> {
        if self.state.muted == muted {
            return Ok(());
        }
        self.mute_toggle().await
    }

    /// Ramp to `level` one press at a time, then snap to the exact target.
    pub(super) async fn set_volume_level(&mut self, level: f64) -> Result<()> {
        let step = self.config.load().amplifier.volume_step();
        let VolumeRamp {
            target,
            presses,
            up,
        } = VolumeRamp::plan(self.state.volume, level, step);

        info!(
            "Ramping volume {} -> {} ({} {} presses)",
            self.state.volume,
            target,
            presses,
            if up { "up" } else { "down" }
        );

        for _ in 0..presses {
            if up {
                self.volume_up().await?;
            } else {
                self.volume_down().await?;
            }
            self.pause(VOLUME_STEP_DELAY).await;
        }

        if self.state.volume != target {
            debug!("Snapping tracked volume {} -> {}", self.state.volume, target);
            self.state.volume = target;
            self.notify();
        }
        Ok(())
    }

    /// Correct drift between the tracked and real volume. Nothing is sent.
    pub(super) fn sync_volume(&mut self, level: f64) {
        self.state.volume = clamp_volume(level);
        self.notify();
    }

    pub(super) async fn select_source(&mut self, source: &str) -> Result<()> {
        let config = self.config.load_full();
        let Some(command) = config.hdmi.sources.get(source) else {
            warn!("Unknown source '{}', ignoring", source);
            return Ok(());
        };

        self.dispatcher.send(&config.hdmi.device_id, command).await?;
        self.state.source = Some(source.to_string());
        self.clear_scene_unless_active();
        self.notify();
        Ok(())
    }

    fn clear_scene_unless_active(&mut self) {
        if !self.scene.is_active() {
            self.state.active_scene = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::coordinator::testing::TestTheater;
    use super::super::error::Error;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_power_is_idempotent() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;

        h.power_on().await.unwrap();
        h.power_on().await.unwrap();
        assert!(h.amp_power());
        assert_eq!(theater.sink.commands(), vec!["amp_on"]);

        h.power_off().await.unwrap();
        h.power_off().await.unwrap();
        assert!(!h.amp_power());
        assert_eq!(theater.sink.commands(), vec!["amp_on", "amp_off"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_steps_clamp_but_still_send() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;

        h.sync_volume(0.99).await.unwrap();
        h.volume_up().await.unwrap();
        assert_eq!(h.volume(), 1.0);
        h.volume_up().await.unwrap();
        assert_eq!(h.volume(), 1.0);
        assert_eq!(theater.sink.commands(), vec!["vol_up", "vol_up"]);

        h.sync_volume(0.01).await.unwrap();
        h.volume_down().await.unwrap();
        h.volume_down().await.unwrap();
        assert_eq!(h.volume(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_up_pacing() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;
        assert_eq!(h.volume(), 0.3);

        let start = tokio::time::Instant::now();
        h.set_volume_level(0.5).await.unwrap();

        assert_eq!(h.volume(), 0.5);
        let presses = theater.sink.times_of("vol_up");
        assert_eq!(presses.len(), 10);
        assert_eq!(theater.sink.commands().len(), 10);
        for pair in presses.windows(2) {
            assert!(pair[1] - pair[0] >= VOLUME_STEP_DELAY);
        }
        assert!(start.elapsed() >= VOLUME_STEP_DELAY * 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_down_snaps_to_target() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;

        // 0.3 -> 0.25 is 2.5 steps: two presses, then a snap.
        h.set_volume_level(0.25).await.unwrap();
        assert_eq!(theater.sink.commands(), vec!["vol_down", "vol_down"]);
        assert_eq!(h.volume(), 0.25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_clamps_target() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;

        h.sync_volume(0.9).await.unwrap();
        h.set_volume_level(7.0).await.unwrap();
        assert_eq!(h.volume(), 1.0);
        assert_eq!(theater.sink.times_of("vol_up").len(), 5);

        theater.sink.clear();
        h.set_volume_level(1.0).await.unwrap();
        assert!(theater.sink.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_failure_keeps_partial_progress() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;

        h.volume_up().await.unwrap();
        theater.sink.fail_on("vol_up");
        let err = h.set_volume_level(0.8).await.unwrap_err();
        assert!(matches!(err, Error::Dispatch { .. }));
        assert_eq!(h.volume(), 0.32);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mute_toggle_and_set_muted() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;

        h.mute_toggle().await.unwrap();
        assert!(h.muted());

        h.set_muted(true).await.unwrap();
        assert_eq!(theater.sink.commands(), vec!["mute"]);

        h.set_muted(false).await.unwrap();
        assert!(!h.muted());
        assert_eq!(theater.sink.commands(), vec!["mute", "mute"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_volume_sends_nothing() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;

        h.sync_volume(0.123456).await.unwrap();
        assert_eq!(h.volume(), 0.1235);
        h.sync_volume(-1.0).await.unwrap();
        assert_eq!(h.volume(), 0.0);
        assert!(theater.sink.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_source() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;

        h.select_source("Chromecast").await.unwrap();
        assert_eq!(h.source().as_deref(), Some("Chromecast"));
        assert_eq!(theater.sink.commands(), vec!["hdmi_2"]);

        h.select_source("Laserdisc").await.unwrap();
        assert_eq!(h.source().as_deref(), Some("Chromecast"));
        assert_eq!(theater.sink.commands(), vec!["hdmi_2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_failure_leaves_state() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;
        theater.sink.fail_on("amp_on");
        theater.sink.fail_on("hdmi_1");
        theater.sink.fail_on("vol_down");

        assert!(h.power_on().await.is_err());
        assert!(!h.amp_power());

        assert!(h.select_source("BluRay").await.is_err());
        assert_eq!(h.source(), None);

        assert!(h.volume_down().await.is_err());
        assert_eq!(h.volume(), 0.3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_changes_clear_scene() {
        let theater = TestTheater::start().await;
        let h = &theater.handle;

        h.activate_scene("Movie Night").await.unwrap();
        assert_eq!(h.active_scene().as_deref(), Some("Movie Night"));

        h.mute_toggle().await.unwrap();
        h.sync_volume(0.4).await.unwrap();
        h.power_on().await.unwrap();
        assert_eq!(h.active_scene().as_deref(), Some("Movie Night"));

        h.volume_up().await.unwrap();
        assert_eq!(h.active_scene(), None);

        h.activate_scene("Movie Night").await.unwrap();
        h.select_source("Chromecast").await.unwrap();
        assert_eq!(h.active_scene(), None);

        h.activate_scene("Movie Night").await.unwrap();
        h.power_off().await.unwrap();
        assert_eq!(h.active_scene(), None);
    }
}
