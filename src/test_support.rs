//! In-memory fakes shared by unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

use crate::asset_source::{AssetSource, Page};
use crate::error::{Error, Result};
use crate::model::{AssetRef, AssetType, DisplayMode, SearchFilter};
use crate::presentation::{Presentation, Transition};

pub fn asset(id: &str) -> AssetRef {
    AssetRef {
        id: id.to_string(),
        original_path: format!("/library/{}.jpg", id),
        original_file_name: Some(format!("{}.jpg", id)),
        created_at: None,
        asset_type: AssetType::Image,
    }
}

pub fn dated_asset(id: &str, created_at: DateTime<Utc>) -> AssetRef {
    AssetRef {
        created_at: Some(created_at),
        ..asset(id)
    }
}

/// `prefix0`, `prefix1`, ... each created a day apart, oldest first.
pub fn assets(prefix: &str, count: usize) -> Vec<AssetRef> {
    let base = Utc::now() - Duration::days(1000);
    (0..count)
        .map(|i| dated_asset(&format!("{}{}", prefix, i), base + Duration::days(i as i64)))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchCall {
    pub filter: SearchFilter,
    pub mode: DisplayMode,
    pub page: u32,
    pub page_size: usize,
}

type Responder = dyn Fn(&FetchCall) -> Page + Send + Sync;

/// Asset source answering from a closure and recording every call.
pub struct ScriptedSource {
    respond: Box<Responder>,
    calls: Mutex<Vec<FetchCall>>,
    delay: Option<std::time::Duration>,
}

impl ScriptedSource {
    pub fn new(respond: impl Fn(&FetchCall) -> Page + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Every call returns the same batch.
    pub fn fixed(items: Vec<AssetRef>) -> Self {
        Self::new(move |_| Page {
            items: items.clone(),
            has_more: false,
        })
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AssetSource for ScriptedSource {
    async fn fetch_page(
        &self,
        filter: &SearchFilter,
        mode: DisplayMode,
        page: u32,
        page_size: usize,
    ) -> Page {
        let call = FetchCall {
            filter: filter.clone(),
            mode,
            page,
            page_size,
        };
        self.calls.lock().unwrap().push(call.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(&call)
    }

    fn asset_url(&self, asset: &AssetRef) -> Option<String> {
        Some(format!("http://photos.test/{}", asset.id))
    }
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub shown: Vec<(String, Transition)>,
    pub empty_shown: usize,
    pub visible: bool,
    pub brightness: u8,
}

/// Presentation that records calls into shared state the test can inspect.
#[derive(Clone, Default)]
pub struct RecordingPresentation {
    state: Arc<Mutex<Recorded>>,
    fail_ids: Arc<Mutex<Vec<String>>>,
}

impl RecordingPresentation {
    pub fn shown_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .shown
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn last_transition(&self) -> Option<Transition> {
        self.state.lock().unwrap().shown.last().map(|(_, t)| *t)
    }

    pub fn empty_shown(&self) -> usize {
        self.state.lock().unwrap().empty_shown
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().unwrap().visible
    }

    pub fn fail_on(&self, id: &str) {
        self.fail_ids.lock().unwrap().push(id.to_string());
    }
}

impl Presentation for RecordingPresentation {
    fn show_image(&mut self, asset: &AssetRef, _url: Option<&str>, transition: Transition) -> Result<()> {
        if self.fail_ids.lock().unwrap().contains(&asset.id) {
            return Err(Error::Presentation(format!("cannot decode {}", asset.id)));
        }
        self.state
            .lock()
            .unwrap()
            .shown
            .push((asset.id.clone(), transition));
        Ok(())
    }

    fn show_empty(&mut self) {
        self.state.lock().unwrap().empty_shown += 1;
    }

    fn start_slideshow(&mut self) {
        self.state.lock().unwrap().visible = true;
    }

    fn exit_slideshow(&mut self) {
        self.state.lock().unwrap().visible = false;
    }

    fn brightness(&self) -> u8 {
        self.state.lock().unwrap().brightness
    }

    fn set_brightness(&mut self, level: u8) {
        self.state.lock().unwrap().brightness = level;
    }
}
