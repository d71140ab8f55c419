//! Boundary to the rendering layer.
//!
//! The slideshow core only decides *what* to show; the presentation decides
//! how. Calls are made from the controller task and must not block.

use crate::error::Result;
use crate::model::AssetRef;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Crossfade,
    KenBurns { pan_speed: f32 },
}

impl Transition {
    pub fn for_pan_speed(pan_speed: f32) -> Self {
        if pan_speed > 0.0 {
            Transition::KenBurns { pan_speed }
        } else {
            Transition::Crossfade
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transition::Crossfade => "crossfade",
            Transition::KenBurns { .. } => "ken-burns",
        }
    }
}

pub trait Presentation: Send {
    fn show_image(&mut self, asset: &AssetRef, url: Option<&str>, transition: Transition) -> Result<()>;

    /// Nothing matched the current filter, or the last fetch failed.
    fn show_empty(&mut self);

    fn start_slideshow(&mut self);

    fn exit_slideshow(&mut self);

    fn brightness(&self) -> u8;

    fn set_brightness(&mut self, level: u8);
}

/// Headless presentation that only records what would be on screen.
#[derive(Debug)]
pub struct LogPresentation {
    brightness: u8,
    visible: bool,
}

impl Default for LogPresentation {
    fn default() -> Self {
        Self {
            brightness: 100,
            visible: true,
        }
    }
}

impl Presentation for LogPresentation {
    fn show_image(&mut self, asset: &AssetRef, url: Option<&str>, transition: Transition) -> Result<()> {
        if !self.visible {
            tracing::debug!("Slideshow hidden, not showing {}", asset.id);
            return Ok(());
        }
        tracing::info!(
            "Showing {} ({}) with {} transition{}",
            asset.id,
            asset.original_file_name.as_deref().unwrap_or(&asset.original_path),
            transition.name(),
            url.map(|u| format!(" from {}", u)).unwrap_or_default()
        );
        Ok(())
    }

    fn show_empty(&mut self) {
        tracing::warn!("No images available for the current profile");
    }

    fn start_slideshow(&mut self) {
        self.visible = true;
        tracing::info!("Slideshow started");
    }

    fn exit_slideshow(&mut self) {
        self.visible = false;
        tracing::info!("Slideshow exited");
    }

    fn brightness(&self) -> u8 {
        self.brightness
    }

    fn set_brightness(&mut self, level: u8) {
        self.brightness = level.min(100);
        tracing::info!("Brightness set to {}", self.brightness);
    }
}
