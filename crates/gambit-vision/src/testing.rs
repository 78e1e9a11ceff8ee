//! Scripted collaborator implementations for tests and dry runs.
//!
//! `ScriptedWorld` plays back a fixed sequence of scenes: capture returns a
//! fresh frame, recognition queries answer from the current scene, and
//! clicks are recorded (optionally advancing to the next scene). One world
//! value is cloned into all three collaborator slots.

use crate::{
    AreaSpec, Frame, GameVision, InputDriver, InputError, Point, Region, ScreenCapturer, TextLine,
    VisionError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// What the game window shows at one point in the script.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// Screen name reported by `identify_screen`; `None` means the screen
    /// is not recognizable.
    #[serde(default)]
    pub screen: Option<String>,
    /// Names of configured areas currently visible.
    #[serde(default)]
    pub visible_areas: Vec<String>,
    /// Text lines currently readable.
    #[serde(default)]
    pub texts: Vec<TextLine>,
}

impl Scene {
    pub fn on_screen(screen: impl Into<String>) -> Self {
        Self {
            screen: Some(screen.into()),
            ..Self::default()
        }
    }

    pub fn with_area(mut self, area: impl Into<String>) -> Self {
        self.visible_areas.push(area.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>, region: Region) -> Self {
        self.texts.push(TextLine::new(text, region));
        self
    }
}

#[derive(Debug, Default)]
struct WorldState {
    areas: BTreeMap<String, AreaSpec>,
    scenes: Vec<Scene>,
    scene_index: usize,
    advance_on_click: bool,
    reject_clicks: bool,
    clicks: Vec<Point>,
    frame_counter: u64,
}

impl WorldState {
    fn current_scene(&self) -> Option<&Scene> {
        self.scenes.get(self.scene_index)
    }
}

/// Shared scripted backend for all three collaborator traits.
#[derive(Clone, Default)]
pub struct ScriptedWorld {
    inner: Arc<Mutex<WorldState>>,
}

impl ScriptedWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_area(&self, spec: AreaSpec) -> &Self {
        let mut state = self.inner.lock().expect("world mutex should lock");
        state.areas.insert(spec.name.clone(), spec);
        self
    }

    pub fn push_scene(&self, scene: Scene) -> &Self {
        self.inner
            .lock()
            .expect("world mutex should lock")
            .scenes
            .push(scene);
        self
    }

    /// Advance to the next scene after every accepted click.
    pub fn advance_on_click(&self, advance: bool) -> &Self {
        self.inner
            .lock()
            .expect("world mutex should lock")
            .advance_on_click = advance;
        self
    }

    /// Make subsequent clicks report `false` (attempted but not accepted).
    pub fn reject_clicks(&self, reject: bool) -> &Self {
        self.inner
            .lock()
            .expect("world mutex should lock")
            .reject_clicks = reject;
        self
    }

    /// Move to the next scene, saturating at the last one.
    pub fn advance_scene(&self) {
        let mut state = self.inner.lock().expect("world mutex should lock");
        if state.scene_index + 1 < state.scenes.len() {
            state.scene_index += 1;
        }
    }

    pub fn clicks(&self) -> Vec<Point> {
        self.inner
            .lock()
            .expect("world mutex should lock")
            .clicks
            .clone()
    }

    pub fn scene_index(&self) -> usize {
        self.inner
            .lock()
            .expect("world mutex should lock")
            .scene_index
    }
}

#[async_trait]
impl ScreenCapturer for ScriptedWorld {
    async fn capture(&self) -> Result<Frame, VisionError> {
        let mut state = self.inner.lock().expect("world mutex should lock");
        state.frame_counter += 1;
        Ok(Frame::new(state.frame_counter, Vec::new()))
    }
}

#[async_trait]
impl GameVision for ScriptedWorld {
    fn area_config(&self, name: &str) -> Option<AreaSpec> {
        self.inner
            .lock()
            .expect("world mutex should lock")
            .areas
            .get(name)
            .cloned()
    }

    async fn locate_area(
        &self,
        _frame: &Frame,
        spec: &AreaSpec,
    ) -> Result<Option<Point>, VisionError> {
        let state = self.inner.lock().expect("world mutex should lock");
        let visible = state
            .current_scene()
            .is_some_and(|scene| scene.visible_areas.iter().any(|name| *name == spec.name));
        Ok(visible.then(|| spec.region.center()))
    }

    async fn read_text(
        &self,
        _frame: &Frame,
        region: Option<Region>,
    ) -> Result<Vec<TextLine>, VisionError> {
        let state = self.inner.lock().expect("world mutex should lock");
        let Some(scene) = state.current_scene() else {
            return Ok(Vec::new());
        };
        Ok(scene
            .texts
            .iter()
            .filter(|line| region.is_none_or(|crop| crop.contains(line.region.center())))
            .cloned()
            .collect())
    }

    async fn identify_screen(&self, _frame: &Frame) -> Result<Option<String>, VisionError> {
        let state = self.inner.lock().expect("world mutex should lock");
        Ok(state.current_scene().and_then(|scene| scene.screen.clone()))
    }
}

#[async_trait]
impl InputDriver for ScriptedWorld {
    async fn click(&self, point: Point) -> Result<bool, InputError> {
        let mut state = self.inner.lock().expect("world mutex should lock");
        state.clicks.push(point);
        if state.reject_clicks {
            return Ok(false);
        }
        if state.advance_on_click && state.scene_index + 1 < state.scenes.len() {
            state.scene_index += 1;
        }
        Ok(true)
    }
}
