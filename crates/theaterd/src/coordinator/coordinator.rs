use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;

use super::dispatch::CommandSink;
use super::dispatch::Dispatcher;
use super::dispatch::EntitySink;
use super::error::Error;
use super::error::Result;
use super::listeners::Listeners;
use super::listeners::Subscription;
use super::message::Command;
use super::message::Request;
use super::scene::SceneFlag;
use super::screen::ScreenArrival;
use super::screen::ScreenTimer;
use super::state::ScreenPosition;
use super::state::TheaterState;
use super::store::Snapshot;
use super::store::StateStore;
use crate::config::TheaterConfig;

/// Capacity of the handle→coordinator request channel
const REQUEST_CHANNEL_SIZE: usize = 64;

/// Capacity of the screen timer→coordinator channel. Only one timer is ever
/// live, so this never fills.
const ARRIVAL_CHANNEL_SIZE: usize = 16;

/// Theater coordinator
///
/// Owns the only writable copy of `TheaterState`. Requests from handles and
/// screen timer arrivals are processed strictly one at a time, so a scene's
/// steps can never interleave with another command.
pub struct Coordinator {
    /// Active device and scene configuration, replaceable between commands
    pub(super) config: Arc<ArcSwap<TheaterConfig>>,

    /// Authoritative state; mutated only by this task
    pub(super) state: TheaterState,

    /// Copy of `state` published after every change, for lock-free readers
    published: Arc<ArcSwap<TheaterState>>,

    store: StateStore,

    pub(super) dispatcher: Dispatcher,

    pub(super) entities: Arc<dyn EntitySink>,

    listeners: Listeners,

    pub(super) screen_timer: ScreenTimer,

    /// Set while a scene is being applied
    pub(super) scene: SceneFlag,

    requests: mpsc::Receiver<Request>,

    arrivals: mpsc::Receiver<ScreenArrival>,
}

impl Coordinator {
    /// Load persisted state and spawn the coordinator task.
    ///
    /// Returns a handle for callers and the task's join handle.
    pub async fn start(
        config: TheaterConfig,
        store: StateStore,
        commands: Arc<dyn CommandSink>,
        entities: Arc<dyn EntitySink>,
    ) -> (CoordinatorHandle, JoinHandle<()>) {
        let state = store.load().await;

        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);
        let (arrival_tx, arrival_rx) = mpsc::channel(ARRIVAL_CHANNEL_SIZE);

        let config = Arc::new(ArcSwap::from_pointee(config));
        let published = Arc::new(ArcSwap::from_pointee(state.clone()));
        let listeners = Listeners::default();

        let coordinator = Coordinator {
            config: config.clone(),
            state,
            published: published.clone(),
            store,
            dispatcher: Dispatcher::new(commands),
            entities,
            listeners: listeners.clone(),
            screen_timer: ScreenTimer::new(arrival_tx),
            scene: SceneFlag::default(),
            requests: request_rx,
            arrivals: arrival_rx,
        };

        let task = tokio::spawn(coordinator.run());

        let handle = CoordinatorHandle {
            requests: request_tx,
            state: published,
            config,
            listeners,
        };

        (handle, task)
    }

    /// Run until shut down or until every handle is dropped.
    async fn run(mut self) {
        info!("Theater coordinator running");

        loop {
            tokio::select! {
                Some(arrival) = self.arrivals.recv() => {
                    self.screen_arrived(arrival);
                }
                request = self.requests.recv() => {
                    let Some(Request { command, reply }) = request else {
                        debug!("All coordinator handles dropped");
                        break;
                    };

                    if let Command::Shutdown = command {
                        self.shutdown().await;
                        let _ = reply.send(Ok(()));
                        return;
                    }

                    let result = self.handle_command(command).await;
                    // The caller may have gone away; the command still ran.
                    let _ = reply.send(result);
                }
            }
        }

        self.shutdown().await;
    }

    async fn handle_command(&mut self, command: Command) -> Result<()> {
        debug!("Handling {:?}", command);
        match command {
            Command::PowerOn => self.power_on().await,
            Command::PowerOff => self.power_off().await,
            Command::VolumeUp => self.volume_up().await,
            Command::VolumeDown => self.volume_down().await,
            Command::MuteToggle => self.mute_toggle().await,
            Command::SetMuted(muted) => self.set_muted(muted).await,
            Command::SetVolumeLevel(level) => self.set_volume_level(level).await,
            Command::SyncVolume(level) => {
                self.sync_volume(level);
                Ok(())
            }
            Command::SelectSource(source) => self.select_source(&source).await,
            Command::ScreenUp => self.screen_up().await,
            Command::ScreenDown => self.screen_down().await,
            Command::ScreenStop => self.screen_stop().await,
            Command::ActivateScene(name) => self.activate_scene(&name).await,
            Command::UpdateConfig(config) => {
                info!(
                    "Theater configuration updated ({} sources, {} scenes)",
                    config.hdmi.sources.len(),
                    config.scenes.len()
                );
                self.config.store(Arc::from(config));
                self.notify();
                Ok(())
            }
            Command::Shutdown => Ok(()),
        }
    }

    /// Sleep for `duration` in the middle of a command.
    ///
    /// Screen arrivals are still applied while waiting, so a travel timer that
    /// expires during a volume ramp or a scene lands on time.
    pub(super) async fn pause(&mut self, duration: Duration) {
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return,
                Some(arrival) = self.arrivals.recv() => {
                    self.screen_arrived(arrival);
                }
            }
        }
    }

    /// Publish the current state, schedule a save and tell every listener.
    pub(super) fn notify(&mut self) {
        let state = Arc::new(self.state.clone());
        self.published.store(state.clone());
        self.store.schedule_save(Snapshot::from(&*state));
        self.listeners.broadcast(&state);
    }

    async fn shutdown(&mut self) {
        info!("Theater coordinator shutting down");
        self.screen_timer.cancel();
        self.store.flush().await;
    }
}

/// Cloneable handle to a running coordinator.
///
/// Mutating calls are queued and resolve once the coordinator has applied
/// them. Reads come from the last published state and never wait.
#[derive(Clone)]
pub struct CoordinatorHandle {
    requests: mpsc::Sender<Request>,
    state: Arc<ArcSwap<TheaterState>>,
    config: Arc<ArcSwap<TheaterConfig>>,
    listeners: Listeners,
}

impl std::fmt::Debug for CoordinatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorHandle")
            .field("state", &self.state.load())
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl CoordinatorHandle {
    /// Queue a command and wait for its outcome.
    pub async fn call(&self, command: Command) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request { command, reply })
            .await
            .map_err(|_| Error::Stopped)?;
        response.await.map_err(|_| Error::Stopped)?
    }

    pub async fn power_on(&self) -> Result<()> {
        self.call(Command::PowerOn).await
    }

    pub async fn power_off(&self) -> Result<()> {
        self.call(Command::PowerOff).await
    }

    pub async fn volume_up(&self) -> Result<()> {
        self.call(Command::VolumeUp).await
    }

    pub async fn volume_down(&self) -> Result<()> {
        self.call(Command::VolumeDown).await
    }

    pub async fn mute_toggle(&self) -> Result<()> {
        self.call(Command::MuteToggle).await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<()> {
        self.call(Command::SetMuted(muted)).await
    }

    pub async fn set_volume_level(&self, level: f64) -> Result<()> {
        self.call(Command::SetVolumeLevel(level)).await
    }

    pub async fn sync_volume(&self, level: f64) -> Result<()> {
        self.call(Command::SyncVolume(level)).await
    }

    pub async fn select_source(&self, source: impl Into<String>) -> Result<()> {
        self.call(Command::SelectSource(source.into())).await
    }

    pub async fn screen_up(&self) -> Result<()> {
        self.call(Command::ScreenUp).await
    }

    pub async fn screen_down(&self) -> Result<()> {
        self.call(Command::ScreenDown).await
    }

    pub async fn screen_stop(&self) -> Result<()> {
        self.call(Command::ScreenStop).await
    }

    pub async fn activate_scene(&self, name: impl Into<String>) -> Result<()> {
        self.call(Command::ActivateScene(name.into())).await
    }

    pub async fn update_config(&self, config: TheaterConfig) -> Result<()> {
        self.call(Command::UpdateConfig(Box::new(config))).await
    }

    /// Cancel the screen timer, write pending state and stop the coordinator.
    pub async fn shutdown(&self) -> Result<()> {
        self.call(Command::Shutdown).await
    }

    /// Register a change listener, called after every state mutation.
    pub fn register_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TheaterState) + Send + Sync + 'static,
    {
        self.listeners.register(listener)
    }

    pub fn state(&self) -> Arc<TheaterState> {
        self.state.load_full()
    }

    pub fn amp_power(&self) -> bool {
        self.state.load().amp_power
    }

    pub fn volume(&self) -> f64 {
        self.state.load().volume
    }

    pub fn muted(&self) -> bool {
        self.state.load().muted
    }

    pub fn source(&self) -> Option<String> {
        self.state.load().source.clone()
    }

    pub fn screen_position(&self) -> ScreenPosition {
        self.state.load().screen_position
    }

    pub fn active_scene(&self) -> Option<String> {
        self.state.load().active_scene.clone()
    }

    pub fn source_list(&self) -> Vec<String> {
        self.config.load().source_list()
    }

    pub fn scene_names(&self) -> Vec<String> {
        self.config.load().scene_names()
    }

    pub fn light_entities(&self) -> Vec<String> {
        self.config.load().lights.entities.clone()
    }

    pub fn has_screen_stop(&self) -> bool {
        self.config.load().screen.stop_command().is_some()
    }
}
