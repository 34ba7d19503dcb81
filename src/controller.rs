//! Pagination controller – drives repeated measurement of mounted blocks
//! until their heights stop changing, then packs them into pages.
//!
//! The controller is single-threaded and frame-driven. The host calls, once
//! per rendering frame:
//!
//! 1. [`MeasureSurface::advance_frame`] on its surface,
//! 2. [`PaginationController::handle_event`] for each event it returned,
//! 3. [`PaginationController::on_frame`].
//!
//! [`run_until_ready`] does exactly that.

use crate::error::PrintError;
use crate::frame::FrameQueue;
use crate::paginate::{paginate_blocks, PageData, PaginationInput};
use crate::surface::{HostEvent, MeasureSurface};

/// Upper bound on measurement passes in one run.
pub const MAX_PASSES: u32 = 8;

/// Two measurements closer than this are the same height.
pub const STABLE_TOLERANCE_PX: f32 = 0.5;

/// Packing parameters that, together with the blocks, identify a session.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationOptions {
    pub gap_px: f32,
    /// Budget of every page but the first.
    pub body_px: f32,
    /// Reserve the intro's measured height on the first page.
    pub include_intro: bool,
    pub break_before: Option<Vec<bool>>,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            gap_px: 16.0,
            body_px: 0.0,
            include_intro: false,
            break_before: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureState {
    Unmeasured,
    Measuring { pass: u32 },
    Stable,
}

/// A scheduled measurement pass. `prev` holds the heights read by the pass
/// that scheduled it.
#[derive(Debug)]
struct PassTask {
    session: u64,
    pass: u32,
    prev: Option<Vec<f32>>,
}

pub struct PaginationController<B> {
    blocks: Vec<B>,
    intro: Option<B>,
    options: PaginationOptions,
    pages: Vec<PageData<B>>,
    ready: bool,
    state: MeasureState,
    /// Bumped whenever scheduled passes must stop firing.
    session: u64,
    /// Single-flight guard: a pass is scheduled or running.
    measuring: bool,
    observing: bool,
    needs_mount: bool,
    last_heights: Option<Vec<f32>>,
    frames: FrameQueue<PassTask>,
    restarts: u32,
}

impl<B: Clone> PaginationController<B> {
    /// Start a session. The first pass runs on the first frame after the
    /// blocks are mounted with [`PaginationController::mount_measure`].
    pub fn new(blocks: Vec<B>, intro: Option<B>, options: PaginationOptions) -> Self {
        let mut controller = Self {
            blocks,
            intro,
            options,
            pages: Vec::new(),
            ready: false,
            state: MeasureState::Unmeasured,
            session: 0,
            measuring: false,
            observing: true,
            needs_mount: true,
            last_heights: None,
            frames: FrameQueue::new(),
            restarts: 0,
        };
        controller.kick();
        controller
    }

    pub fn pages(&self) -> &[PageData<B>] {
        &self.pages
    }

    pub fn ready(&self) -> bool {
        self.ready
    }

    pub fn state(&self) -> MeasureState {
        self.state
    }

    pub fn blocks(&self) -> &[B] {
        &self.blocks
    }

    pub fn intro(&self) -> Option<&B> {
        self.intro.as_ref()
    }

    pub fn options(&self) -> &PaginationOptions {
        &self.options
    }

    pub fn is_measuring(&self) -> bool {
        self.measuring
    }

    /// Number of event-triggered restarts accepted so far.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Heights used for the most recently published pages.
    pub fn last_heights(&self) -> Option<&[f32]> {
        self.last_heights.as_deref()
    }

    /// Render the blocks (and the intro, when reserved) on `surface`.
    /// Measurement cannot make progress until this has been called for the
    /// current input.
    pub fn mount_measure<S: MeasureSurface<B>>(&mut self, surface: &mut S) -> Result<(), PrintError> {
        let intro = if self.options.include_intro {
            self.intro.as_ref()
        } else {
            None
        };
        surface.mount(&self.blocks, intro)?;
        self.needs_mount = false;
        Ok(())
    }

    /// Run every pass scheduled before this frame.
    pub fn on_frame<S: MeasureSurface<B>>(&mut self, surface: &S) {
        for task in self.frames.take_due() {
            self.run_pass(surface, task);
        }
    }

    /// React to a host event. Ignored while a pass is scheduled or running,
    /// and after teardown.
    pub fn handle_event(&mut self, event: HostEvent) {
        if !self.observing {
            return;
        }
        if self.measuring {
            log::debug!("{event:?} while measuring, coalesced");
            return;
        }
        log::debug!("{event:?}: re-measuring");
        self.restarts += 1;
        self.kick();
    }

    /// Replace the input. Scheduled passes of the old input are dropped,
    /// previous heights are forgotten and measurement starts over once the
    /// new blocks are mounted.
    pub fn set_input(&mut self, blocks: Vec<B>, intro: Option<B>, options: PaginationOptions) {
        self.blocks = blocks;
        self.intro = intro;
        self.options = options;
        self.frames.cancel_all();
        self.last_heights = None;
        self.needs_mount = true;
        self.state = MeasureState::Unmeasured;
        self.observing = true;
        self.kick();
    }

    /// Stop observing and drop every scheduled pass.
    pub fn teardown(&mut self) {
        self.session += 1;
        self.frames.cancel_all();
        self.observing = false;
        self.measuring = false;
    }

    /// Schedule pass 0 of a fresh run on the next frame.
    fn kick(&mut self) {
        self.session += 1;
        self.ready = false;
        self.measuring = true;
        self.frames.request(PassTask {
            session: self.session,
            pass: 0,
            prev: None,
        });
    }

    fn run_pass<S: MeasureSurface<B>>(&mut self, surface: &S, task: PassTask) {
        if task.session != self.session {
            return;
        }
        let heights = surface.block_heights();
        if self.needs_mount || heights.len() != self.blocks.len() {
            log::debug!("Measurement surface not mounted yet, waiting a frame");
            self.frames.request(task);
            return;
        }
        self.state = MeasureState::Measuring { pass: task.pass };

        let stable = match task.prev.as_deref().or(self.last_heights.as_deref()) {
            Some(prev) if prev.len() == heights.len() => heights
                .iter()
                .zip(prev)
                .all(|(h, p)| (h - p).abs() <= STABLE_TOLERANCE_PX),
            _ => false,
        };

        if stable || task.pass >= MAX_PASSES {
            if !stable {
                log::warn!("Block heights did not settle after {MAX_PASSES} passes, using the last measurement");
            }
            log::debug!("Heights stable after pass {}", task.pass);
            self.publish(surface, heights);
            return;
        }

        self.frames.request(PassTask {
            session: task.session,
            pass: task.pass + 1,
            prev: Some(heights),
        });
    }

    fn publish<S: MeasureSurface<B>>(&mut self, surface: &S, heights: Vec<f32>) {
        let intro_height = if self.options.include_intro {
            surface.intro_height().unwrap_or(0.0)
        } else {
            0.0
        };
        self.pages = paginate_blocks(&PaginationInput {
            nodes: &self.blocks,
            heights: &heights,
            intro_height,
            gap_px: self.options.gap_px,
            body_px: self.options.body_px,
            break_before: self.options.break_before.as_deref(),
        });
        log::debug!(
            "Packed {} blocks into {} pages",
            self.blocks.len(),
            self.pages.len()
        );
        self.last_heights = Some(heights);
        self.ready = true;
        self.state = MeasureState::Stable;
        self.measuring = false;
    }
}

/// Drive `surface` and `controller` frame by frame until the controller is
/// ready. Fails with [`PrintError::Stalled`] after `max_frames` frames.
pub fn run_until_ready<B: Clone, S: MeasureSurface<B>>(
    controller: &mut PaginationController<B>,
    surface: &mut S,
    max_frames: u32,
) -> Result<u32, PrintError> {
    for frame in 1..=max_frames {
        for event in surface.advance_frame()? {
            controller.handle_event(event);
        }
        controller.on_frame(surface);
        if controller.ready() {
            log::debug!("Pagination ready after {frame} frames");
            return Ok(frame);
        }
    }
    Err(PrintError::Stalled { frames: max_frames })
}
