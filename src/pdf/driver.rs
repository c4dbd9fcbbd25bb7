//! Render driver - turns a locator into an ordered list of page rasters
//!
//! Each call to [`RenderDriver::render`] starts a new cycle on its own worker
//! thread and cancels the previous one. A cycle walks the document strictly
//! in page order, one raster in flight at a time, and reports progress as a
//! stream of [`RenderState`] transitions.
//!
//! Every mutation a cycle makes (state change, surface append) happens under
//! the cycle's slot lock after checking its [`CancelToken`]. `cancel()`
//! flips the token under the same lock, so nothing lands after it returns.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use flume::{Receiver, Sender};
use log::{debug, error, info};

use super::cycle::{CancelToken, Cancelled, CycleId};
use super::error::RenderError;
use super::locator::DocumentLocator;
use super::provider::{DocumentHandle, DocumentProvider, PageHandle, Rasterizer};
use super::state::RenderState;
use super::types::{RENDER_SCALE, RasterSurface, RenderSurface, Viewport};

/// Mutable state owned by one cycle
struct CycleSlot {
    state: RenderState,
    surface: RenderSurface,
    events: Option<Sender<RenderState>>,
}

impl CycleSlot {
    fn new(events: Sender<RenderState>) -> Self {
        Self {
            state: RenderState::Loading,
            surface: Vec::new(),
            events: Some(events),
        }
    }

    /// Record and publish a transition unless the cycle was cancelled
    fn transition(&mut self, token: &CancelToken, next: RenderState) -> bool {
        if token.is_cancelled() {
            return false;
        }

        if let Some(events) = &self.events {
            let _ = events.send(next.clone());
        }
        if next.is_terminal() {
            self.events = None;
        }
        self.state = next;
        true
    }

    fn append(&mut self, token: &CancelToken, raster: RasterSurface) -> bool {
        if token.is_cancelled() {
            return false;
        }

        debug_assert_eq!(raster.page, self.surface.len() + 1, "pages out of order");
        self.surface.push(Arc::new(raster));
        true
    }
}

fn lock(slot: &Mutex<CycleSlot>) -> MutexGuard<'_, CycleSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ActiveCycle {
    id: CycleId,
    token: CancelToken,
    slot: Arc<Mutex<CycleSlot>>,
}

/// Caller's view of one render cycle
#[derive(Debug)]
pub struct RenderCycle {
    id: CycleId,
    events: Receiver<RenderState>,
}

impl RenderCycle {
    #[must_use]
    pub fn id(&self) -> CycleId {
        self.id
    }

    /// Transitions in emission order. The channel disconnects after the
    /// terminal state or when the cycle is cancelled.
    #[must_use]
    pub fn events(&self) -> &Receiver<RenderState> {
        &self.events
    }

    /// Block until the cycle ends.
    ///
    /// Returns `None` if the cycle was cancelled before reaching `Ready` or
    /// `Failed`.
    pub fn wait(&self) -> Option<RenderState> {
        self.events.iter().find(RenderState::is_terminal)
    }
}

/// Drives one document at a time from locator to rendered pages
pub struct RenderDriver<P, R> {
    provider: Arc<P>,
    rasterizer: Arc<R>,
    active: Option<ActiveCycle>,
    next_cycle_id: u64,
}

impl<P, R> RenderDriver<P, R>
where
    P: DocumentProvider + 'static,
    R: Rasterizer<<P::Document as DocumentHandle>::Page> + 'static,
{
    #[must_use]
    pub fn new(provider: P, rasterizer: R) -> Self {
        Self::from_shared(Arc::new(provider), Arc::new(rasterizer))
    }

    #[must_use]
    pub fn from_shared(provider: Arc<P>, rasterizer: Arc<R>) -> Self {
        Self {
            provider,
            rasterizer,
            active: None,
            next_cycle_id: 1,
        }
    }

    /// Start rendering `locator`, cancelling any cycle still in flight.
    ///
    /// The render surface is replaced with an empty one and the state moves
    /// to `Loading` before this returns.
    pub fn render(&mut self, locator: DocumentLocator) -> RenderCycle {
        self.cancel();

        let id = self.next_id();
        let token = CancelToken::new();
        let (events_tx, events_rx) = flume::unbounded();
        let slot = Arc::new(Mutex::new(CycleSlot::new(events_tx)));
        lock(&slot).transition(&token, RenderState::Loading);

        info!("Render cycle {id} started for {locator}");

        let worker = {
            let provider = Arc::clone(&self.provider);
            let rasterizer = Arc::clone(&self.rasterizer);
            let token = token.clone();
            let slot = Arc::clone(&slot);
            thread::Builder::new()
                .name(format!("pdfpane-render-{}", id.0))
                .spawn(move || {
                    run_cycle(
                        provider.as_ref(),
                        rasterizer.as_ref(),
                        &locator,
                        id,
                        &token,
                        &slot,
                    );
                })
        };

        if let Err(e) = worker {
            error!("Render cycle {id} could not start a worker thread: {e}");
            lock(&slot).transition(&token, RenderState::failed());
        }

        self.active = Some(ActiveCycle { id, token, slot });
        RenderCycle {
            id,
            events: events_rx,
        }
    }

    fn next_id(&mut self) -> CycleId {
        let id = CycleId::new(self.next_cycle_id);
        self.next_cycle_id += 1;
        id
    }
}

impl<P, R> RenderDriver<P, R> {
    /// Stop the in-flight cycle. Idempotent.
    ///
    /// Work already handed to the provider or rasterizer runs to completion
    /// but its result is dropped.
    pub fn cancel(&self) {
        let Some(active) = &self.active else {
            return;
        };

        let mut slot = lock(&active.slot);
        if active.token.is_cancelled() {
            return;
        }
        active.token.cancel();
        slot.events = None;
        if !slot.state.is_terminal() {
            debug!("Render cycle {} cancelled", active.id);
        }
    }

    /// State of the most recent cycle; `Loading` before the first one.
    ///
    /// Cancelling freezes this at whatever the cycle last reached, usually
    /// `Loading`, until the next [`render`](Self::render) replaces it.
    #[must_use]
    pub fn state(&self) -> RenderState {
        self.active
            .as_ref()
            .map(|active| lock(&active.slot).state.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the rasters produced so far by the current cycle
    #[must_use]
    pub fn surface(&self) -> RenderSurface {
        self.active
            .as_ref()
            .map(|active| lock(&active.slot).surface.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn current_cycle(&self) -> Option<CycleId> {
        self.active.as_ref().map(|active| active.id)
    }
}

impl<P, R> Drop for RenderDriver<P, R> {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Why a cycle stopped before finishing every page
enum CycleAbort {
    Cancelled,
    Failed(RenderError),
}

impl From<Cancelled> for CycleAbort {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<RenderError> for CycleAbort {
    fn from(e: RenderError) -> Self {
        Self::Failed(e)
    }
}

/// Body of a cycle's worker thread
fn run_cycle<P, R>(
    provider: &P,
    rasterizer: &R,
    locator: &DocumentLocator,
    id: CycleId,
    token: &CancelToken,
    slot: &Mutex<CycleSlot>,
) where
    P: DocumentProvider,
    R: Rasterizer<<P::Document as DocumentHandle>::Page>,
{
    let next = match render_pages(provider, rasterizer, locator, token, slot) {
        Ok(pages) => {
            info!("Render cycle {id} rendered {pages} page(s)");
            RenderState::Ready
        }
        Err(CycleAbort::Cancelled) => {
            debug!("Render cycle {id} stopped after cancellation");
            return;
        }
        Err(CycleAbort::Failed(e)) => {
            error!("Render cycle {id} failed for {locator}: {e}");
            RenderState::failed()
        }
    };

    if !lock(slot).transition(token, next) {
        debug!("Render cycle {id} result discarded after cancellation");
    }
}

fn render_pages<P, R>(
    provider: &P,
    rasterizer: &R,
    locator: &DocumentLocator,
    token: &CancelToken,
    slot: &Mutex<CycleSlot>,
) -> Result<usize, CycleAbort>
where
    P: DocumentProvider,
    R: Rasterizer<<P::Document as DocumentHandle>::Page>,
{
    let document = provider.open(locator)?;
    token.check()?;

    let page_count = document.page_count()?;
    debug!("{locator} has {page_count} page(s)");

    for number in 1..=page_count {
        token.check()?;

        let page = document.page(number)?;
        let size = page.intrinsic_size()?;
        let viewport = Viewport::at_scale(size, RENDER_SCALE).ok_or_else(|| {
            RenderError::page(
                number,
                format!("unusable page size {}x{}", size.width, size.height),
            )
        })?;

        let mut raster = RasterSurface::allocate(number, &viewport);
        rasterizer.rasterize(&page, &viewport, &mut raster)?;

        if !lock(slot).append(token, raster) {
            return Err(CycleAbort::Cancelled);
        }
    }

    Ok(page_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::types::PageSize;
    use crate::test_utils::fakes::{FakeRasterizer, PageScript, ScriptedDocument, ScriptedProvider};

    fn locator(s: &str) -> DocumentLocator {
        DocumentLocator::new(s).unwrap()
    }

    #[test]
    fn state_is_loading_before_first_render() {
        let driver = RenderDriver::new(ScriptedProvider::new(), FakeRasterizer::new());
        assert_eq!(driver.state(), RenderState::Loading);
        assert!(driver.surface().is_empty());
        assert_eq!(driver.current_cycle(), None);
    }

    #[test]
    fn cycle_ids_increase() {
        let provider = ScriptedProvider::new().with("a.pdf", ScriptedDocument::uniform(1, 1));
        let mut driver = RenderDriver::new(provider, FakeRasterizer::new());

        let first = driver.render(locator("a.pdf"));
        first.wait();
        let second = driver.render(locator("a.pdf"));
        second.wait();

        assert_eq!(first.id(), CycleId::new(1));
        assert_eq!(second.id(), CycleId::new(2));
        assert_eq!(driver.current_cycle(), Some(CycleId::new(2)));
    }

    #[test]
    fn zero_page_document_is_ready_and_empty() {
        let provider = ScriptedProvider::new().with("empty.pdf", ScriptedDocument::uniform(0, 1));
        let mut driver = RenderDriver::new(provider, FakeRasterizer::new());

        let cycle = driver.render(locator("empty.pdf"));
        assert_eq!(cycle.wait(), Some(RenderState::Ready));
        assert!(driver.surface().is_empty());
    }

    #[test]
    fn rasters_use_render_scale() {
        let provider = ScriptedProvider::new().with(
            "letter.pdf",
            ScriptedDocument::new(1, vec![PageScript::Ok(PageSize::new(612.0, 792.0))]),
        );
        let mut driver = RenderDriver::new(provider, FakeRasterizer::new());

        driver.render(locator("letter.pdf")).wait();
        let surface = driver.surface();
        assert_eq!(surface.len(), 1);
        assert_eq!((surface[0].width, surface[0].height), (918, 1188));
    }

    #[test]
    fn unusable_page_size_fails_cycle() {
        let provider = ScriptedProvider::new().with(
            "bad.pdf",
            ScriptedDocument::new(
                1,
                vec![
                    PageScript::Ok(PageSize::new(10.0, 10.0)),
                    PageScript::Ok(PageSize::new(0.0, 10.0)),
                ],
            ),
        );
        let mut driver = RenderDriver::new(provider, FakeRasterizer::new());

        let cycle = driver.render(locator("bad.pdf"));
        assert_eq!(cycle.wait(), Some(RenderState::failed()));
        assert_eq!(driver.surface().len(), 1);
    }

    #[test]
    fn cancel_without_cycle_is_noop() {
        let driver = RenderDriver::new(ScriptedProvider::new(), FakeRasterizer::new());
        driver.cancel();
        driver.cancel();
        assert_eq!(driver.state(), RenderState::Loading);
    }
}
