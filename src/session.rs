//! Session-scoped state container
//!
//! [`DustRemovalSession`] owns everything an interactive front end edits: the
//! loaded image, the probability map of the last detection, the mask editor
//! with its undo history, the removal result and the view state. All mutation
//! goes through its methods so mask values, dimensions and history bounds
//! stay consistent.
//!
//! Detection and removal run as [`ProcessingTask`]s on the runtime's blocking
//! pool. The owner calls [`DustRemovalSession::poll`] from its own loop to
//! pick up finished work. Results produced for an image that has since been
//! replaced are discarded.
//!
//! Observers receive a [`ChangeSet`] after every mutation. Use
//! [`DustRemovalSession::batch`] to coalesce several mutations into a single
//! notification.

use crate::{
    config::DustRemovalConfig,
    detection::ProgressSpan,
    error::{DustRemovalError, Result},
    inference::SegmentationBackend,
    inpaint::InpaintStrategy,
    mask::{binarize, BinaryMask, MaskEditor},
    processor::{build_inpaint_strategy, detect_dust, remove_dust},
    services::{ImageIOService, OutputFormatHandler},
    task::{ProcessingTask, TaskKind, TaskOutput},
    types::{ImageSize, ProbabilityMap, RemovalResult},
    view::{CanvasPoint, CanvasSize, ToolMode, ViewMode, ViewState},
};
use image::{DynamicImage, GrayImage, RgbImage};
use instant::Duration;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use uuid::Uuid;

/// Lifecycle of the active mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskStatus {
    #[default]
    Unset,
    /// Produced by thresholding a probability map
    Detected,
    /// Changed by at least one brush or eraser stroke
    Edited,
}

/// Part of the session that changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionChange {
    Image,
    Probability,
    Mask,
    History,
    Result,
    View,
    Tool,
    Processing,
    Error,
    Threshold,
}

/// Changes delivered in one notification
pub type ChangeSet = BTreeSet<SessionChange>;

/// Receiver of session change notifications
pub trait SessionObserver: Send + Sync {
    fn on_change(&self, changes: &ChangeSet);
}

impl<F> SessionObserver for F
where
    F: Fn(&ChangeSet) + Send + Sync,
{
    fn on_change(&self, changes: &ChangeSet) {
        self(changes);
    }
}

#[derive(Debug, Clone)]
struct LoadedImage {
    rgb: Arc<RgbImage>,
    gray: Arc<GrayImage>,
    path: Option<PathBuf>,
}

impl LoadedImage {
    fn size(&self) -> ImageSize {
        ImageSize::new(self.rgb.width(), self.rgb.height())
    }
}

type SharedBackend = Arc<Mutex<Box<dyn SegmentationBackend>>>;

/// Interactive dust removal session
pub struct DustRemovalSession {
    config: DustRemovalConfig,
    runtime: Handle,
    backend: SharedBackend,
    strategy: Arc<InpaintStrategy>,
    session_id: Uuid,
    image: Option<LoadedImage>,
    probability: Option<Arc<ProbabilityMap>>,
    editor: Option<MaskEditor>,
    mask_status: MaskStatus,
    result: Option<RemovalResult>,
    view: ViewState,
    detection_task: Option<ProcessingTask<ProbabilityMap>>,
    removal_task: Option<ProcessingTask<RemovalResult>>,
    detection_progress: Arc<AtomicU8>,
    last_error: Option<DustRemovalError>,
    last_detection_time: Option<Duration>,
    last_removal_time: Option<Duration>,
    observers: Vec<Arc<dyn SessionObserver>>,
    batch_depth: usize,
    pending: ChangeSet,
}

impl std::fmt::Debug for DustRemovalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DustRemovalSession")
            .field("session_id", &self.session_id)
            .field("image", &self.image.as_ref().map(LoadedImage::size))
            .field("mask_status", &self.mask_status)
            .field("has_result", &self.result.is_some())
            .field("detecting", &self.detection_task.is_some())
            .field("removing", &self.removal_task.is_some())
            .finish_non_exhaustive()
    }
}

impl DustRemovalSession {
    /// Create a session that runs its tasks on `runtime`
    ///
    /// The backend is initialized lazily by the first detection. A deep
    /// inpainting model named in the config is loaded here.
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(
        config: DustRemovalConfig,
        backend: Box<dyn SegmentationBackend>,
        runtime: Handle,
    ) -> Result<Self> {
        config.validate()?;
        let strategy = Arc::new(build_inpaint_strategy(&config.inpainting));
        let view = ViewState::with_settings(
            config.editing.brush_radius,
            config.editing.overlay_opacity,
        );
        log::debug!(
            "New session: {} backend, {} inpainting",
            backend.name(),
            strategy.name()
        );
        Ok(Self {
            config,
            runtime,
            backend: Arc::new(Mutex::new(backend)),
            strategy,
            session_id: Uuid::new_v4(),
            image: None,
            probability: None,
            editor: None,
            mask_status: MaskStatus::Unset,
            result: None,
            view,
            detection_task: None,
            removal_task: None,
            detection_progress: Arc::new(AtomicU8::new(0)),
            last_error: None,
            last_detection_time: None,
            last_removal_time: None,
            observers: Vec::new(),
            batch_depth: 0,
            pending: ChangeSet::new(),
        })
    }

    /// Register an observer for change notifications
    pub fn subscribe(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    /// Run `f` and deliver all of its changes as one notification
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.batch_depth += 1;
        let result = f(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 && !self.pending.is_empty() {
            let changes = std::mem::take(&mut self.pending);
            self.deliver(&changes);
        }
        result
    }

    fn emit<I: IntoIterator<Item = SessionChange>>(&mut self, changes: I) {
        self.pending.extend(changes);
        if self.batch_depth == 0 && !self.pending.is_empty() {
            let changes = std::mem::take(&mut self.pending);
            self.deliver(&changes);
        }
    }

    fn deliver(&self, changes: &ChangeSet) {
        for observer in &self.observers {
            observer.on_change(changes);
        }
    }

    // ---- accessors -------------------------------------------------------

    #[must_use]
    pub fn config(&self) -> &DustRemovalConfig {
        &self.config
    }

    /// Identity of the currently loaded image
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    #[must_use]
    pub fn image(&self) -> Option<&RgbImage> {
        self.image.as_ref().map(|i| i.rgb.as_ref())
    }

    #[must_use]
    pub fn image_size(&self) -> Option<ImageSize> {
        self.image.as_ref().map(LoadedImage::size)
    }

    #[must_use]
    pub fn image_path(&self) -> Option<&Path> {
        self.image.as_ref().and_then(|i| i.path.as_deref())
    }

    #[must_use]
    pub fn probability(&self) -> Option<&ProbabilityMap> {
        self.probability.as_deref()
    }

    /// Authoritative full-resolution mask
    #[must_use]
    pub fn mask(&self) -> Option<&BinaryMask> {
        self.editor.as_ref().map(MaskEditor::full_mask)
    }

    /// Full-resolution mask including an in-progress stroke
    #[must_use]
    pub fn display_mask(&self) -> Option<&BinaryMask> {
        self.editor.as_ref().map(MaskEditor::display_mask)
    }

    #[must_use]
    pub fn low_res_mask(&self) -> Option<&BinaryMask> {
        self.editor.as_ref().map(MaskEditor::low_res_mask)
    }

    #[must_use]
    pub fn mask_status(&self) -> MaskStatus {
        self.mask_status
    }

    #[must_use]
    pub fn history_len(&self) -> usize {
        self.editor.as_ref().map_or(0, MaskEditor::history_len)
    }

    #[must_use]
    pub fn result(&self) -> Option<&RgbImage> {
        self.result.as_ref().map(|r| &r.image)
    }

    #[must_use]
    pub fn removal_result(&self) -> Option<&RemovalResult> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn view(&self) -> &ViewState {
        &self.view
    }

    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.config.detection.threshold
    }

    /// Overall progress of the running detection, in percent
    #[must_use]
    pub fn detection_progress(&self) -> u8 {
        self.detection_progress.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&DustRemovalError> {
        self.last_error.as_ref()
    }

    /// Take the last background error, clearing it
    pub fn take_error(&mut self) -> Option<DustRemovalError> {
        self.last_error.take()
    }

    #[must_use]
    pub fn last_detection_time(&self) -> Option<Duration> {
        self.last_detection_time
    }

    #[must_use]
    pub fn last_removal_time(&self) -> Option<Duration> {
        self.last_removal_time
    }

    // ---- predicates ------------------------------------------------------

    #[must_use]
    pub fn is_detecting(&self) -> bool {
        self.detection_task.is_some()
    }

    #[must_use]
    pub fn is_removing(&self) -> bool {
        self.removal_task.is_some()
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.is_detecting() || self.is_removing()
    }

    #[must_use]
    pub fn can_detect(&self) -> bool {
        self.image.is_some() && !self.is_processing()
    }

    #[must_use]
    pub fn can_remove(&self) -> bool {
        self.image.is_some() && self.has_mask() && !self.is_processing()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.is_processing() && self.editor.as_ref().is_some_and(MaskEditor::can_undo)
    }

    /// A mask is shown for review and no removal result exists yet
    #[must_use]
    pub fn is_in_detection_mode(&self) -> bool {
        self.has_mask() && self.result.is_none()
    }

    fn has_mask(&self) -> bool {
        self.editor.is_some() && self.mask_status != MaskStatus::Unset
    }

    fn running_task(&self) -> Option<TaskKind> {
        self.detection_task
            .as_ref()
            .map(ProcessingTask::kind)
            .or_else(|| self.removal_task.as_ref().map(ProcessingTask::kind))
    }

    // ---- image and mask ----------------------------------------------------

    /// Load an image file, replacing the current image and all derived state
    ///
    /// On failure the session is left untouched.
    ///
    /// # Errors
    /// - File missing or not a decodable image
    pub fn load_image<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let image = ImageIOService::load_image(path)?;
        self.set_image(&image, Some(path.to_path_buf()))
    }

    /// Replace the current image and all derived state
    ///
    /// Tasks still running for the previous image keep their slot; their
    /// results are discarded when they finish.
    ///
    /// # Errors
    /// - Image has zero width or height
    pub fn set_image(&mut self, image: &DynamicImage, path: Option<PathBuf>) -> Result<()> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DustRemovalError::load("Image has no pixels"));
        }

        self.session_id = Uuid::new_v4();
        self.image = Some(LoadedImage {
            rgb: Arc::new(image.to_rgb8()),
            gray: Arc::new(image.to_luma8()),
            path,
        });
        self.probability = None;
        self.editor = None;
        self.mask_status = MaskStatus::Unset;
        self.result = None;
        self.last_error = None;
        self.view.reset_view();
        self.view.showing_original = false;
        log::info!(
            "Loaded {} image (session {})",
            self.image_size().map_or_else(String::new, |s| s.to_string()),
            self.session_id
        );
        self.emit([
            SessionChange::Image,
            SessionChange::Probability,
            SessionChange::Mask,
            SessionChange::History,
            SessionChange::Result,
            SessionChange::View,
        ]);
        Ok(())
    }

    /// Use `mask` as the active mask, resized to the image if needed
    ///
    /// # Errors
    /// - No image loaded
    /// - A task is running
    pub fn set_mask(&mut self, mask: BinaryMask) -> Result<()> {
        if let Some(kind) = self.running_task() {
            return Err(DustRemovalError::TaskInProgress(kind.label()));
        }
        let size = self
            .image_size()
            .ok_or_else(|| DustRemovalError::processing("No image loaded"))?;
        let mask = if mask.size() == size {
            mask
        } else {
            mask.resize_nearest(size)
        };
        self.install_mask(mask);
        self.emit([SessionChange::Mask, SessionChange::Result]);
        Ok(())
    }

    /// Clear the probability map, mask and result; the image stays loaded
    pub fn reset(&mut self) {
        self.probability = None;
        self.editor = None;
        self.mask_status = MaskStatus::Unset;
        self.result = None;
        self.emit([
            SessionChange::Probability,
            SessionChange::Mask,
            SessionChange::History,
            SessionChange::Result,
        ]);
    }

    /// Change the detection threshold
    ///
    /// When a probability map exists and no task is running the mask is
    /// re-derived from it and becomes `Detected` again; undo history is kept.
    ///
    /// # Errors
    /// - Threshold outside `(0, 1)`
    pub fn set_threshold(&mut self, threshold: f32) -> Result<()> {
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(DustRemovalError::config_value_error(
                "threshold",
                threshold,
                "(0, 1)",
                Some(crate::config::DEFAULT_THRESHOLD),
            ));
        }
        self.config.detection.threshold = threshold;
        self.emit([SessionChange::Threshold]);

        if self.is_processing() {
            return Ok(());
        }
        if let Some(map) = self.probability.clone() {
            let mask = binarize(&map, threshold);
            log::debug!(
                "Re-threshold at {threshold}: {:.3}% dust",
                mask.coverage() * 100.0
            );
            self.install_mask(mask);
            self.emit([SessionChange::Mask, SessionChange::Result]);
        }
        Ok(())
    }

    fn install_mask(&mut self, mask: BinaryMask) {
        match self.editor.as_mut() {
            Some(editor) if editor.size() == mask.size() => editor.replace_mask(mask),
            _ => self.editor = Some(MaskEditor::new(mask, &self.config.editing)),
        }
        self.mask_status = MaskStatus::Detected;
        self.result = None;
    }

    // ---- background tasks --------------------------------------------------

    /// Start detection on the loaded image
    ///
    /// The tool is forced to `None` for the duration of the task.
    ///
    /// # Errors
    /// - A detection or removal is already running
    /// - No image loaded
    pub fn start_detection(&mut self) -> Result<()> {
        if let Some(kind) = self.running_task() {
            return Err(DustRemovalError::TaskInProgress(kind.label()));
        }
        let gray = self
            .image
            .as_ref()
            .map(|i| Arc::clone(&i.gray))
            .ok_or_else(|| DustRemovalError::processing("No image loaded"))?;

        self.end_stroke();
        let backend = Arc::clone(&self.backend);
        let progress = Arc::clone(&self.detection_progress);
        let detection = self.config.detection.clone();
        let execution = self.config.execution.clone();
        progress.store(0, Ordering::Relaxed);

        self.detection_task = Some(ProcessingTask::spawn(
            &self.runtime,
            TaskKind::Detection,
            self.session_id,
            move || {
                let mut backend = backend
                    .lock()
                    .map_err(|_| DustRemovalError::internal("Segmentation backend lock poisoned"))?;
                backend.initialize(&execution)?;
                let result = detect_dust(
                    &gray,
                    backend.as_mut(),
                    &detection,
                    ProgressSpan::new(0.0, 100.0),
                    &mut |percentage| {
                        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                        progress.store(percentage.round().clamp(0.0, 100.0) as u8, Ordering::Relaxed);
                    },
                )?;
                Ok(result.probability)
            },
        ));
        self.force_tool_none();
        self.emit([SessionChange::Processing]);
        Ok(())
    }

    /// Start dust removal with the current mask
    ///
    /// An active stroke is ended first so its edits are included.
    ///
    /// # Errors
    /// - A detection or removal is already running
    /// - No image or no mask
    pub fn start_removal(&mut self) -> Result<()> {
        if let Some(kind) = self.running_task() {
            return Err(DustRemovalError::TaskInProgress(kind.label()));
        }
        let image = self
            .image
            .as_ref()
            .map(|i| Arc::clone(&i.rgb))
            .ok_or_else(|| DustRemovalError::processing("No image loaded"))?;
        if !self.has_mask() {
            return Err(DustRemovalError::processing("No dust mask to remove"));
        }

        self.end_stroke();
        let mask = self
            .mask()
            .cloned()
            .ok_or_else(|| DustRemovalError::processing("No dust mask to remove"))?;
        let strategy = Arc::clone(&self.strategy);
        let config = self.config.inpainting.clone();

        self.removal_task = Some(ProcessingTask::spawn(
            &self.runtime,
            TaskKind::Removal,
            self.session_id,
            move || remove_dust(&image, &mask, &config, &strategy),
        ));
        self.force_tool_none();
        self.emit([SessionChange::Processing]);
        Ok(())
    }

    fn force_tool_none(&mut self) {
        if self.view.tool != ToolMode::None {
            self.view.tool = ToolMode::None;
            self.emit([SessionChange::Tool]);
        }
    }

    /// Apply finished task results without blocking
    ///
    /// Returns `true` if any task finished.
    pub fn poll(&mut self) -> bool {
        let mut finished = false;
        if let Some(outcome) = self.detection_task.as_mut().and_then(ProcessingTask::try_take) {
            if let Some(task) = self.detection_task.take() {
                self.finish_detection(task.session_id(), outcome);
            }
            finished = true;
        }
        if let Some(outcome) = self.removal_task.as_mut().and_then(ProcessingTask::try_take) {
            if let Some(task) = self.removal_task.take() {
                self.finish_removal(task.session_id(), outcome);
            }
            finished = true;
        }
        finished
    }

    /// Block until running tasks finish and apply their results
    ///
    /// Must not be called from inside an async context; use
    /// [`Self::wait_for_tasks_async`] there.
    pub fn wait_for_tasks(&mut self) {
        if let Some(task) = self.detection_task.take() {
            let id = task.session_id();
            self.finish_detection(id, task.join());
        }
        if let Some(task) = self.removal_task.take() {
            let id = task.session_id();
            self.finish_removal(id, task.join());
        }
    }

    /// Await running tasks and apply their results
    pub async fn wait_for_tasks_async(&mut self) {
        if let Some(task) = self.detection_task.take() {
            let id = task.session_id();
            let outcome = task.wait().await;
            self.finish_detection(id, outcome);
        }
        if let Some(task) = self.removal_task.take() {
            let id = task.session_id();
            let outcome = task.wait().await;
            self.finish_removal(id, outcome);
        }
    }

    fn is_stale(&self, kind: TaskKind, task_id: Uuid) -> bool {
        if task_id == self.session_id {
            return false;
        }
        log::debug!("Discarding {kind} result for replaced image (session {task_id})");
        true
    }

    fn record_failure(&mut self, kind: TaskKind, error: DustRemovalError) {
        log::error!("❌ {kind} failed: {error}");
        self.last_error = Some(error);
        self.emit([SessionChange::Error, SessionChange::Processing]);
    }

    fn finish_detection(&mut self, task_id: Uuid, outcome: Result<TaskOutput<ProbabilityMap>>) {
        if self.is_stale(TaskKind::Detection, task_id) {
            self.emit([SessionChange::Processing]);
            return;
        }
        match outcome {
            Ok(output) => {
                let map = Arc::new(output.value);
                let mask = binarize(&map, self.config.detection.threshold);
                log::info!(
                    "✅ Detection finished in {:.2}s, {:.3}% dust",
                    output.elapsed.as_secs_f64(),
                    mask.coverage() * 100.0
                );
                self.probability = Some(map);
                self.install_mask(mask);
                self.last_detection_time = Some(output.elapsed);
                self.detection_progress.store(100, Ordering::Relaxed);
                self.emit([
                    SessionChange::Probability,
                    SessionChange::Mask,
                    SessionChange::Result,
                    SessionChange::Processing,
                ]);
            },
            Err(e) => self.record_failure(TaskKind::Detection, e),
        }
    }

    fn finish_removal(&mut self, task_id: Uuid, outcome: Result<TaskOutput<RemovalResult>>) {
        if self.is_stale(TaskKind::Removal, task_id) {
            self.emit([SessionChange::Processing]);
            return;
        }
        match outcome {
            Ok(output) => {
                log::info!(
                    "✅ Removal finished in {:.2}s",
                    output.elapsed.as_secs_f64()
                );
                self.last_removal_time = Some(output.elapsed);
                self.result = Some(output.value);
                self.view.showing_original = false;
                self.emit([SessionChange::Result, SessionChange::Processing]);
            },
            Err(e) => self.record_failure(TaskKind::Removal, e),
        }
    }

    // ---- strokes -----------------------------------------------------------

    fn editable(&mut self) -> Option<&mut MaskEditor> {
        if self.is_processing() {
            return None;
        }
        self.editor.as_mut()
    }

    /// Open a stroke session (snapshots the mask for undo once)
    ///
    /// Ignored without a mask, without a drawing tool, or while processing.
    pub fn begin_stroke(&mut self) -> bool {
        if self.view.tool.stroke_tool().is_none() {
            return false;
        }
        let Some(editor) = self.editable() else {
            return false;
        };
        if editor.is_stroke_active() {
            return true;
        }
        editor.begin_stroke();
        self.emit([SessionChange::History]);
        true
    }

    /// Brush or erase at a canvas position with the current tool
    ///
    /// Continues the open stroke from its previous point. The brush radius is
    /// in image pixels, so zooming changes only how large it looks.
    /// Points outside the rendered image are ignored.
    pub fn stroke_at(&mut self, point: CanvasPoint, canvas: CanvasSize) -> bool {
        let Some(tool) = self.view.tool.stroke_tool() else {
            return false;
        };
        let Some(size) = self.image_size() else {
            return false;
        };
        let Some(image_point) = self.view.canvas_to_image(point, canvas, size) else {
            return false;
        };
        let radius = self.view.brush_radius() as f32;

        let Some(editor) = self.editable() else {
            return false;
        };
        let opened = !editor.is_stroke_active();
        let changed = editor.stroke_to(image_point, tool, radius);

        let mut changes = vec![SessionChange::Mask];
        if opened {
            changes.push(SessionChange::History);
        }
        if changed {
            self.mask_status = MaskStatus::Edited;
        }
        self.emit(changes);
        changed
    }

    /// Close the stroke session, making its edits durable
    pub fn end_stroke(&mut self) -> bool {
        let Some(editor) = self.editor.as_mut() else {
            return false;
        };
        if !editor.is_stroke_active() {
            return false;
        }
        let changed = editor.end_stroke();
        self.emit([SessionChange::Mask]);
        changed
    }

    /// Restore the mask from before the most recent stroke
    ///
    /// Undoing every stroke since the last detection or re-threshold puts the
    /// mask back to `Detected`. An existing removal result is kept.
    pub fn undo(&mut self) -> bool {
        let Some(editor) = self.editable() else {
            return false;
        };
        if !editor.undo() {
            return false;
        }
        let edited = editor.is_edited();
        self.mask_status = if edited {
            MaskStatus::Edited
        } else {
            MaskStatus::Detected
        };
        self.emit([SessionChange::Mask, SessionChange::History]);
        true
    }

    // ---- view --------------------------------------------------------------

    /// Switch the pointer tool; ignored while a task is running
    pub fn set_tool(&mut self, tool: ToolMode) -> bool {
        if self.is_processing() && tool != ToolMode::None {
            return false;
        }
        self.end_stroke();
        self.view.tool = tool;
        self.emit([SessionChange::Tool]);
        true
    }

    pub fn set_brush_radius(&mut self, radius: u32) {
        self.view.set_brush_radius(radius);
        self.emit([SessionChange::View]);
    }

    pub fn set_overlay_opacity(&mut self, opacity: f32) {
        self.view.set_overlay_opacity(opacity);
        self.emit([SessionChange::View]);
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view.view_mode = mode;
        self.emit([SessionChange::View]);
    }

    pub fn set_split_position(&mut self, position: f32) {
        self.view.set_split_position(position);
        self.emit([SessionChange::View]);
    }

    pub fn set_hide_detections(&mut self, hide: bool) {
        self.view.hide_detections = hide;
        self.emit([SessionChange::View]);
    }

    /// Show the source instead of the result while `showing` is set
    pub fn set_showing_original(&mut self, showing: bool) {
        self.view.showing_original = showing && self.result.is_some();
        self.emit([SessionChange::View]);
    }

    pub fn zoom_in(&mut self) {
        self.view.zoom_in();
        self.emit([SessionChange::View]);
    }

    pub fn zoom_out(&mut self) {
        self.view.zoom_out();
        self.emit([SessionChange::View]);
    }

    pub fn reset_view(&mut self) {
        self.view.reset_view();
        self.emit([SessionChange::View]);
    }

    /// Cursor-anchored wheel zoom
    pub fn wheel_zoom(&mut self, cursor: CanvasPoint, canvas: CanvasSize, delta: f32) -> bool {
        let changed = self.view.wheel_zoom(cursor, canvas, delta);
        if changed {
            self.emit([SessionChange::View]);
        }
        changed
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.view.pan_by(dx, dy);
        self.emit([SessionChange::View]);
    }

    // ---- output ------------------------------------------------------------

    /// Save the removal result
    ///
    /// With `path` the format follows its extension; otherwise the result is
    /// written next to the source as `<stem><suffix>.<ext>`.
    ///
    /// # Errors
    /// - No result yet
    /// - Unsupported extension or write failure
    pub fn save_result(&self, path: Option<&Path>) -> Result<PathBuf> {
        let result = self
            .result
            .as_ref()
            .ok_or_else(|| DustRemovalError::processing("No result to save"))?;
        let image = DynamicImage::ImageRgb8(result.image.clone());
        let quality = self.config.output.jpeg_quality;

        if let Some(path) = path {
            ImageIOService::save_image_as(&image, path, quality)?;
            return Ok(path.to_path_buf());
        }

        let source = self
            .image_path()
            .ok_or_else(|| DustRemovalError::processing("Image has no source path; choose an output path"))?;
        let format = OutputFormatHandler::resolve_format(source, self.config.output.format);
        let output = OutputFormatHandler::output_path(source, None, format, &self.config.output.suffix);
        ImageIOService::save_image(&image, &output, format, quality)?;
        log::info!("💾 Saved {}", output.display());
        Ok(output)
    }
}
