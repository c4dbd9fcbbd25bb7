pub mod fakes {
    //! Scripted providers and rasterizers for exercising the render driver
    //! without a PDF engine.

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    use flume::{Receiver, Sender};

    use crate::pdf::{
        DocumentHandle, DocumentLocator, DocumentProvider, PageHandle, PageSize, RasterSurface,
        Rasterizer, RenderError, Viewport,
    };

    const GATE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Blocks a fake at a chosen point until the test releases it
    #[derive(Clone)]
    pub struct Gate {
        entered: Sender<usize>,
        release: Receiver<()>,
    }

    /// Test-side handle of a [`Gate`]
    pub struct GateControl {
        entered: Receiver<usize>,
        release: Sender<()>,
    }

    #[must_use]
    pub fn gate() -> (Gate, GateControl) {
        let (entered_tx, entered_rx) = flume::unbounded();
        let (release_tx, release_rx) = flume::unbounded();
        (
            Gate {
                entered: entered_tx,
                release: release_rx,
            },
            GateControl {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }

    impl Gate {
        fn pass(&self, key: usize) {
            let _ = self.entered.send(key);
            // A dropped control releases everything
            let _ = self.release.recv();
        }
    }

    impl GateControl {
        /// Wait for a fake to reach the gate; returns the page (or 0 for open)
        pub fn wait_entered(&self) -> usize {
            self.entered
                .recv_timeout(GATE_TIMEOUT)
                .expect("fake never reached the gate")
        }

        pub fn release(&self) {
            let _ = self.release.send(());
        }
    }

    /// Outcome of one scripted page
    #[derive(Clone, Debug)]
    pub enum PageScript {
        Ok(PageSize),
        LoadFails,
        RasterFails,
    }

    /// A fake document: its pages, an identifying tag written into every
    /// raster, and optional gates
    #[derive(Clone)]
    pub struct ScriptedDocument {
        tag: u8,
        pages: Vec<PageScript>,
        open_gate: Option<Gate>,
        page_gate: Option<(usize, Gate)>,
        page_count_fails: bool,
    }

    impl ScriptedDocument {
        #[must_use]
        pub fn new(tag: u8, pages: Vec<PageScript>) -> Self {
            Self {
                tag,
                pages,
                open_gate: None,
                page_gate: None,
                page_count_fails: false,
            }
        }

        /// `count` small pages that all succeed
        #[must_use]
        pub fn uniform(count: usize, tag: u8) -> Self {
            Self::new(tag, vec![PageScript::Ok(PageSize::new(8.0, 6.0)); count])
        }

        /// Replace the script of one page (1-indexed)
        #[must_use]
        pub fn with_page(mut self, number: usize, script: PageScript) -> Self {
            self.pages[number - 1] = script;
            self
        }

        #[must_use]
        pub fn gated_open(mut self, gate: Gate) -> Self {
            self.open_gate = Some(gate);
            self
        }

        /// Block when page `number` is requested
        #[must_use]
        pub fn gated_page(mut self, number: usize, gate: Gate) -> Self {
            self.page_gate = Some((number, gate));
            self
        }

        #[must_use]
        pub fn failing_page_count(mut self) -> Self {
            self.page_count_fails = true;
            self
        }
    }

    #[derive(Default)]
    struct ProviderLog {
        opened: Vec<String>,
        closed: usize,
    }

    /// Provider serving [`ScriptedDocument`]s by locator; anything else
    /// fails to open
    #[derive(Clone, Default)]
    pub struct ScriptedProvider {
        documents: Arc<HashMap<String, ScriptedDocument>>,
        log: Arc<Mutex<ProviderLog>>,
        closed_tx: Option<Sender<String>>,
        closed_rx: Option<Receiver<String>>,
    }

    impl ScriptedProvider {
        #[must_use]
        pub fn new() -> Self {
            let (closed_tx, closed_rx) = flume::unbounded();
            Self {
                documents: Arc::default(),
                log: Arc::default(),
                closed_tx: Some(closed_tx),
                closed_rx: Some(closed_rx),
            }
        }

        #[must_use]
        pub fn with(mut self, locator: &str, document: ScriptedDocument) -> Self {
            Arc::make_mut(&mut self.documents).insert(locator.to_string(), document);
            self
        }

        /// Locators passed to `open`, in call order
        #[must_use]
        pub fn opened(&self) -> Vec<String> {
            self.lock_log().opened.clone()
        }

        #[must_use]
        pub fn closed_count(&self) -> usize {
            self.lock_log().closed
        }

        /// Wait until a document opened for `locator` has been dropped,
        /// meaning its cycle has finished touching the surface
        pub fn wait_closed(&self, locator: &str) {
            let rx = self.closed_rx.as_ref().expect("provider built without new()");
            loop {
                let closed = rx
                    .recv_timeout(GATE_TIMEOUT)
                    .expect("document was never released");
                if closed == locator {
                    return;
                }
            }
        }

        fn lock_log(&self) -> std::sync::MutexGuard<'_, ProviderLog> {
            self.log.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl DocumentProvider for ScriptedProvider {
        type Document = FakeDocument;

        fn open(&self, locator: &DocumentLocator) -> Result<FakeDocument, RenderError> {
            self.lock_log().opened.push(locator.to_string());

            let Some(script) = self.documents.get(locator.as_str()) else {
                return Err(RenderError::fetch(locator, "not found"));
            };
            if let Some(gate) = &script.open_gate {
                gate.pass(0);
            }

            Ok(FakeDocument {
                locator: locator.to_string(),
                script: script.clone(),
                log: Arc::clone(&self.log),
                closed: self.closed_tx.clone(),
            })
        }
    }

    pub struct FakeDocument {
        locator: String,
        script: ScriptedDocument,
        log: Arc<Mutex<ProviderLog>>,
        closed: Option<Sender<String>>,
    }

    impl DocumentHandle for FakeDocument {
        type Page = FakePage;

        fn page_count(&self) -> Result<usize, RenderError> {
            if self.script.page_count_fails {
                return Err(RenderError::fetch(&self.locator, "unreadable page tree"));
            }
            Ok(self.script.pages.len())
        }

        fn page(&self, number: usize) -> Result<FakePage, RenderError> {
            if let Some((gated, gate)) = &self.script.page_gate {
                if *gated == number {
                    gate.pass(number);
                }
            }

            match self.script.pages.get(number.wrapping_sub(1)) {
                Some(PageScript::LoadFails) => Err(RenderError::page(number, "scripted load failure")),
                Some(script) => Ok(FakePage {
                    number,
                    tag: self.script.tag,
                    script: script.clone(),
                }),
                None => Err(RenderError::page(number, "no such page")),
            }
        }
    }

    impl Drop for FakeDocument {
        fn drop(&mut self) {
            self.log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .closed += 1;
            if let Some(closed) = &self.closed {
                let _ = closed.send(self.locator.clone());
            }
        }
    }

    pub struct FakePage {
        number: usize,
        tag: u8,
        script: PageScript,
    }

    impl PageHandle for FakePage {
        fn number(&self) -> usize {
            self.number
        }

        fn intrinsic_size(&self) -> Result<PageSize, RenderError> {
            match self.script {
                PageScript::Ok(size) => Ok(size),
                // Size is fine; the failure happens at rasterization
                PageScript::RasterFails => Ok(PageSize::new(8.0, 6.0)),
                PageScript::LoadFails => Err(RenderError::page(self.number, "unreachable")),
            }
        }
    }

    /// Writes `[page, tag]` into the first two bytes of each raster and
    /// records which pages it was asked to draw
    #[derive(Clone, Default)]
    pub struct FakeRasterizer {
        calls: Arc<Mutex<Vec<usize>>>,
    }

    impl FakeRasterizer {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn calls(&self) -> Vec<usize> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    impl Rasterizer<FakePage> for FakeRasterizer {
        fn rasterize(
            &self,
            page: &FakePage,
            _viewport: &Viewport,
            target: &mut RasterSurface,
        ) -> Result<(), RenderError> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(page.number);

            if matches!(page.script, PageScript::RasterFails) {
                return Err(RenderError::page(page.number, "scripted raster failure"));
            }

            target.pixels[0] = page.number as u8;
            target.pixels[1] = page.tag;
            Ok(())
        }
    }

    /// `(page, tag)` markers of every raster in a surface
    #[must_use]
    pub fn markers(surface: &[Arc<RasterSurface>]) -> Vec<(u8, u8)> {
        surface
            .iter()
            .map(|raster| (raster.pixels[0], raster.pixels[1]))
            .collect()
    }
}
