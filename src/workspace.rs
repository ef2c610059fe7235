//! Per-visitor studio state: uploads, selections, the last result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::constants::{LOADING_GENERATE, LOADING_WATERMARK, MAX_IMAGES_PER_WORKSPACE};
use crate::intake::UploadedImage;
use crate::prompt::{AspectRatio, PromptSelections};

/// Why a generate request cannot go ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateBlocked {
    /// No reference image picked
    NoImageSelected,
    /// Every category is empty
    EmptyPrompt,
    /// The picked image scored under the usable threshold
    LowClarity,
    /// A generation for this workspace is already running
    AlreadyRunning,
}

/// Where an in-flight run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    /// Waiting on the image model
    Synthesizing,
    /// Stamping the returned image
    Watermarking,
}

impl GenerationStage {
    /// Loading copy shown while the run sits in this stage.
    pub fn loading_message(self) -> &'static str {
        match self {
            GenerationStage::Synthesizing => LOADING_GENERATE,
            GenerationStage::Watermarking => LOADING_WATERMARK,
        }
    }
}

/// Everything a synthesis run needs, detached from the workspace lock.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Reference image bytes
    pub image: Arc<[u8]>,
    /// Reference image MIME type
    pub mime_type: &'static str,
    /// Assembled descriptor prompt
    pub prompt: String,
    /// Requested frame
    pub aspect_ratio: AspectRatio,
}

/// Watermarked PNG from the last successful run.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    /// PNG bytes
    pub png: Arc<[u8]>,
    /// Prompt it was generated from
    pub prompt: String,
    /// Completion time
    pub created_at: DateTime<Utc>,
}

/// A visitor's multi-step form.
#[derive(Debug, Clone)]
pub struct Workspace {
    images: Vec<UploadedImage>,
    selected_image_id: Option<String>,
    /// Descriptor choices per category
    pub selections: PromptSelections,
    /// Requested frame
    pub aspect_ratio: AspectRatio,
    generated: Option<GeneratedImage>,
    generating: Option<GenerationStage>,
    last_seen: DateTime<Utc>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            selected_image_id: None,
            selections: PromptSelections::default(),
            aspect_ratio: AspectRatio::default(),
            generated: None,
            generating: None,
            last_seen: Utc::now(),
        }
    }
}

impl Workspace {
    /// Uploaded images, oldest first.
    pub fn images(&self) -> &[UploadedImage] {
        &self.images
    }

    /// Looks up an uploaded image.
    pub fn image(&self, id: &str) -> Option<&UploadedImage> {
        self.images.iter().find(|image| image.id == id)
    }

    /// How many more uploads fit under [`MAX_IMAGES_PER_WORKSPACE`].
    pub fn remaining_capacity(&self) -> usize {
        MAX_IMAGES_PER_WORKSPACE.saturating_sub(self.images.len())
    }

    /// Appends scored uploads, skipping ids already present. Returns how many
    /// were turned away because the workspace is full.
    pub fn add_images(&mut self, images: impl IntoIterator<Item = UploadedImage>) -> usize {
        let mut refused = 0;
        for image in images {
            if self.image(&image.id).is_some() {
                continue;
            }
            if self.remaining_capacity() == 0 {
                refused += 1;
                continue;
            }
            self.images.push(image);
        }
        refused
    }

    /// Removes an upload, clearing the selection if it pointed there.
    pub fn remove_image(&mut self, id: &str) -> bool {
        let before = self.images.len();
        self.images.retain(|image| image.id != id);
        if self.selected_image_id.as_deref() == Some(id) {
            self.selected_image_id = None;
        }
        before != self.images.len()
    }

    /// Picks the reference image; unknown ids are refused.
    pub fn select_image(&mut self, id: &str) -> bool {
        if self.image(id).is_some() {
            self.selected_image_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// Drops the current pick.
    pub fn clear_selection(&mut self) {
        self.selected_image_id = None;
    }

    /// The picked reference image.
    pub fn selected_image(&self) -> Option<&UploadedImage> {
        self.selected_image_id
            .as_deref()
            .and_then(|id| self.image(id))
    }

    /// Last watermarked result.
    pub fn generated(&self) -> Option<&GeneratedImage> {
        self.generated.as_ref()
    }

    /// Whether a synthesis call is in flight.
    pub fn is_generating(&self) -> bool {
        self.generating.is_some()
    }

    /// Stage of the in-flight run, if any.
    pub fn generation_stage(&self) -> Option<GenerationStage> {
        self.generating
    }

    /// Moves an in-flight run on to watermarking.
    pub fn mark_watermarking(&mut self) {
        if self.generating.is_some() {
            self.generating = Some(GenerationStage::Watermarking);
        }
    }

    /// A reference image is picked and at least one category has content.
    pub fn is_ready_to_generate(&self) -> bool {
        self.selected_image().is_some() && self.selections.has_content()
    }

    /// Checks the preconditions in order and, if they hold, clears the previous
    /// result, marks the workspace busy and hands back what the remote call needs.
    pub fn begin_generation(&mut self) -> Result<GenerationRequest, GenerateBlocked> {
        if self.generating.is_some() {
            return Err(GenerateBlocked::AlreadyRunning);
        }
        let image = self
            .selected_image()
            .ok_or(GenerateBlocked::NoImageSelected)?;
        let prompt = self
            .selections
            .assemble()
            .ok_or(GenerateBlocked::EmptyPrompt)?;
        if image.is_low_clarity() {
            return Err(GenerateBlocked::LowClarity);
        }
        let request = GenerationRequest {
            image: image.bytes.clone(),
            mime_type: image.mime_type,
            prompt,
            aspect_ratio: self.aspect_ratio,
        };
        self.generated = None;
        self.generating = Some(GenerationStage::Synthesizing);
        Ok(request)
    }

    /// Ends a run started by [`Workspace::begin_generation`].
    pub fn finish_generation(&mut self, result: Option<GeneratedImage>) {
        self.generating = None;
        if result.is_some() {
            self.generated = result;
        }
    }

    fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}

/// All live workspaces, keyed by the id stored in the visitor's session.
#[derive(Clone, Debug, Default)]
pub struct WorkspaceStore {
    inner: Arc<RwLock<HashMap<String, Workspace>>>,
}

impl WorkspaceStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a workspace, fresh if the id is unknown.
    pub async fn snapshot(&self, id: &str) -> Workspace {
        let mut guard = self.inner.write().await;
        let workspace = guard.entry(id.to_string()).or_default();
        workspace.touch();
        workspace.clone()
    }

    /// Runs `f` against the workspace under the write lock. `f` must not block.
    pub async fn update<T>(&self, id: &str, f: impl FnOnce(&mut Workspace) -> T) -> T {
        let mut guard = self.inner.write().await;
        let workspace = guard.entry(id.to_string()).or_default();
        workspace.touch();
        f(workspace)
    }

    /// Number of live workspaces.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// True when no workspace is live.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Drops workspaces not seen for `idle`, keeping ones with a run in flight.
    pub async fn prune_idle(&self, idle: Duration) -> usize {
        let Ok(idle) = chrono::Duration::from_std(idle) else {
            return 0;
        };
        let cutoff = Utc::now() - idle;
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, workspace| workspace.generating.is_some() || workspace.last_seen >= cutoff);
        let removed = before - guard.len();
        if removed > 0 {
            debug!("Pruned {} idle workspaces", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::ClarityCheck;
    use crate::intake::InspectedImage;

    fn image_with_score(score: Option<u8>) -> UploadedImage {
        let mut image = UploadedImage::new(
            "face.png",
            vec![1, 2, 3],
            &InspectedImage {
                mime_type: "image/png",
                width: 1,
                height: 1,
            },
        );
        image.clarity = score.map(|score| ClarityCheck {
            score,
            feedback: String::new(),
            is_usable: score >= 50,
        });
        image
    }

    #[test]
    fn preconditions_are_checked_in_order() {
        let mut workspace = Workspace::default();
        assert_eq!(
            workspace.begin_generation().err(),
            Some(GenerateBlocked::NoImageSelected)
        );

        let low = image_with_score(Some(30));
        let low_id = low.id.clone();
        workspace.add_images([low]);
        assert!(workspace.select_image(&low_id));
        assert_eq!(
            workspace.begin_generation().err(),
            Some(GenerateBlocked::EmptyPrompt)
        );

        workspace.selections.style.toggle("Gothic và bí ẩn");
        assert!(workspace.is_ready_to_generate());
        assert_eq!(
            workspace.begin_generation().err(),
            Some(GenerateBlocked::LowClarity)
        );
    }

    #[test]
    fn unscored_images_may_generate() {
        let mut workspace = Workspace::default();
        let image = image_with_score(None);
        let id = image.id.clone();
        workspace.add_images([image]);
        workspace.select_image(&id);
        workspace.selections.lighting.set_custom("Ánh nến");
        let request = workspace.begin_generation().expect("ready");
        assert_eq!(request.prompt, "Ánh sáng: Ánh nến.");
        assert_eq!(request.mime_type, "image/png");
    }

    #[test]
    fn one_run_at_a_time() {
        let mut workspace = Workspace::default();
        let image = image_with_score(Some(90));
        let id = image.id.clone();
        workspace.add_images([image]);
        workspace.select_image(&id);
        workspace.selections.style.set_custom("x");
        workspace.begin_generation().expect("first run");
        assert_eq!(
            workspace.begin_generation().err(),
            Some(GenerateBlocked::AlreadyRunning)
        );
        workspace.finish_generation(Some(GeneratedImage {
            png: Arc::from(vec![9u8]),
            prompt: "x".to_string(),
            created_at: Utc::now(),
        }));
        assert!(!workspace.is_generating());
        assert!(workspace.generated().is_some());

        // a new run clears the previous result, a failed one leaves it cleared
        workspace.begin_generation().expect("second run");
        assert!(workspace.generated().is_none());
        workspace.finish_generation(None);
        assert!(workspace.generated().is_none());
    }

    #[test]
    fn removing_the_selected_image_clears_selection() {
        let mut workspace = Workspace::default();
        let image = image_with_score(Some(90));
        let id = image.id.clone();
        workspace.add_images([image]);
        workspace.select_image(&id);
        assert!(!workspace.select_image("missing"));
        assert!(workspace.remove_image(&id));
        assert!(workspace.selected_image().is_none());
        assert!(!workspace.remove_image(&id));
    }

    #[test]
    fn uploads_stop_at_the_image_cap() {
        let mut workspace = Workspace::default();
        let first: Vec<UploadedImage> = (0..MAX_IMAGES_PER_WORKSPACE - 1)
            .map(|_| image_with_score(Some(90)))
            .collect();
        assert_eq!(workspace.add_images(first), 0);
        assert_eq!(workspace.remaining_capacity(), 1);

        let refused = workspace.add_images([image_with_score(Some(90)), image_with_score(Some(80))]);
        assert_eq!(refused, 1);
        assert_eq!(workspace.images().len(), MAX_IMAGES_PER_WORKSPACE);
        assert_eq!(workspace.remaining_capacity(), 0);

        let id = workspace.images()[0].id.clone();
        workspace.remove_image(&id);
        assert_eq!(workspace.remaining_capacity(), 1);
    }

    #[test]
    fn runs_report_their_stage() {
        let mut workspace = Workspace::default();
        workspace.mark_watermarking();
        assert_eq!(workspace.generation_stage(), None);

        let image = image_with_score(Some(90));
        let id = image.id.clone();
        workspace.add_images([image]);
        workspace.select_image(&id);
        workspace.selections.camera_angle.set_custom("Cận cảnh");
        workspace.begin_generation().expect("run");
        assert_eq!(
            workspace.generation_stage(),
            Some(GenerationStage::Synthesizing)
        );
        workspace.mark_watermarking();
        assert_eq!(
            workspace.generation_stage().map(GenerationStage::loading_message),
            Some(LOADING_WATERMARK)
        );
        workspace.finish_generation(None);
        assert!(!workspace.is_generating());
    }

    #[tokio::test]
    async fn store_prunes_idle_workspaces() {
        let store = WorkspaceStore::new();
        store
            .update("a", |workspace| workspace.selections.style.set_custom("x"))
            .await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.prune_idle(Duration::from_secs(60)).await, 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.prune_idle(Duration::from_millis(1)).await, 1);
        assert!(store.is_empty().await);
    }
}
