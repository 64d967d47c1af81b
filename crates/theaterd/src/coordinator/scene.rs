//! Scene activation.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::coordinator::Coordinator;
use super::error::Error;
use super::error::Result;
use crate::config::LightPower;
use crate::config::Scene;
use crate::config::SceneLight;

/// Wait after powering the amplifier on before sending it anything else.
pub(super) const AMP_POWER_ON_DELAY: Duration = Duration::from_secs(1);

/// Marks that a scene is being applied.
///
/// Only the coordinator task touches the flag. It is shared through an `Arc`
/// so that the guard holds its own reference instead of borrowing the
/// coordinator for the length of the scene.
#[derive(Debug, Clone, Default)]
pub(super) struct SceneFlag(Arc<AtomicBool>);

impl SceneFlag {
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Raise the flag until the returned guard is dropped.
    pub fn enter(&self) -> SceneGuard {
        self.0.store(true, Ordering::Relaxed);
        SceneGuard(self.0.clone())
    }
}

/// Lowers the scene flag on drop, whichever way the scene ends.
#[must_use]
pub(super) struct SceneGuard(Arc<AtomicBool>);

impl Drop for SceneGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Scale a 0-100 percentage to a light's native 0-255 brightness.
pub fn brightness_to_native(percent: u8) -> u8 {
    let native = u16::from(percent.min(100)) * 255 / 100;
    native as u8
}

impl Coordinator {
    pub(super) async fn activate_scene(&mut self, name: &str) -> Result<()> {
        let config = self.config.load_full();
        let Some(scene) = config.scene(name) else {
            warn!("Unknown scene '{}', ignoring", name);
            return Ok(());
        };

        info!("Activating scene '{}'", name);
        let _guard = self.scene.enter();

        if let Err(e) = self.apply_scene(scene).await {
            warn!(
                "Scene '{}' stopped part way, keeping what was applied: {}",
                name, e
            );
            return Err(e);
        }

        self.state.active_scene = Some(scene.name.clone());
        self.notify();
        info!("Scene '{}' active", name);
        Ok(())
    }

    async fn apply_scene(&mut self, scene: &Scene) -> Result<()> {
        match scene.amp_power {
            Some(true) => {
                self.power_on().await?;
                self.pause(AMP_POWER_ON_DELAY).await;
            }
            Some(false) => self.power_off().await?,
            None => {}
        }

        if let Some(source) = scene.source.as_deref().filter(|s| !s.is_empty()) {
            self.select_source(source).await?;
        }

        if let Some(volume) = scene.volume {
            self.set_volume_level(volume).await?;
        }

        if let Some(target) = scene.screen {
            self.move_screen(target).await?;
        }

        for light in &scene.lights {
            self.apply_light(light).await?;
        }

        Ok(())
    }

    async fn apply_light(&self, light: &SceneLight) -> Result<()> {
        let entity_id = light.entity_id.as_str();
        let domain = entity_id.split('.').next().unwrap_or_default();
        if domain != "light" && domain != "switch" {
            warn!("Skipping {}: unsupported domain '{}'", entity_id, domain);
            return Ok(());
        }

        let result = match light.state {
            LightPower::On => {
                let brightness = light
                    .brightness
                    .filter(|_| domain == "light")
                    .map(brightness_to_native);
                debug!("Turning on {} (brightness {:?})", entity_id, brightness);
                self.entities.turn_on(entity_id, brightness).await
            }
            LightPower::Off => {
                debug!("Turning off {}", entity_id);
                self.entities.turn_off(entity_id).await
            }
        };

        result.map_err(|source| {
            warn!("Failed to switch {}: {}", entity_id, source);
            Error::Entity {
                entity_id: entity_id.to_string(),
                source,
            }
        })
    }
}
