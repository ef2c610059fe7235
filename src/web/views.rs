use super::csrf::csrf_token;
use super::flash;
use super::prelude::*;
use crate::constants::{LOADING_CLARITY, LOADING_GENERATE, RESULT_DOWNLOAD_NAME};
use crate::intake::{ClarityBand, UploadedImage};
use crate::prompt::{AspectRatio, Category, CategorySelection};
use crate::workspace::{GenerationStage, Workspace};

#[derive(Clone, Debug)]
pub(crate) struct ImageCardView {
    pub(crate) id: String,
    pub(crate) file_name: String,
    pub(crate) url: String,
    pub(crate) is_selected: bool,
    pub(crate) has_clarity: bool,
    pub(crate) score: u8,
    pub(crate) feedback: String,
    pub(crate) clarity_class: &'static str,
}

impl ImageCardView {
    fn new(image: &UploadedImage, selected_id: Option<&str>) -> Self {
        let score = image.clarity.as_ref().map(|c| c.score).unwrap_or(0);
        Self {
            id: image.id.clone(),
            file_name: image.file_name.clone(),
            url: format!("/images/{}", image.id),
            is_selected: selected_id == Some(image.id.as_str()),
            has_clarity: image.clarity.is_some(),
            score,
            feedback: image
                .clarity
                .as_ref()
                .map(|c| c.feedback.clone())
                .unwrap_or_default(),
            clarity_class: ClarityBand::for_score(score).css_class(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct SuggestionView {
    pub(crate) value: &'static str,
    pub(crate) input_id: String,
    pub(crate) checked: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct CategoryView {
    pub(crate) key: &'static str,
    pub(crate) heading: &'static str,
    pub(crate) suggestions_label: &'static str,
    pub(crate) placeholder: &'static str,
    pub(crate) custom: String,
    pub(crate) suggestions: Vec<SuggestionView>,
}

impl CategoryView {
    fn new(category: Category, selection: &CategorySelection) -> Self {
        let suggestions = category
            .suggestions()
            .iter()
            .enumerate()
            .map(|(idx, &value)| SuggestionView {
                value,
                input_id: format!("{}-{}", category.key(), idx),
                checked: selection.is_selected(value),
            })
            .collect();
        Self {
            key: category.key(),
            heading: category.heading(),
            suggestions_label: category.suggestions_label(),
            placeholder: category.placeholder(),
            custom: selection.custom().to_string(),
            suggestions,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct RatioView {
    pub(crate) value: &'static str,
    pub(crate) label: &'static str,
    pub(crate) checked: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "studio.html")]
pub(crate) struct StudioTemplate {
    pub(crate) csrf_token: String,
    pub(crate) has_flash: bool,
    pub(crate) flash_message: String,
    pub(crate) flash_class: String,
    pub(crate) flash_is_error: bool,
    pub(crate) images: Vec<ImageCardView>,
    pub(crate) has_images: bool,
    pub(crate) categories: Vec<CategoryView>,
    pub(crate) ratios: Vec<RatioView>,
    pub(crate) ready: bool,
    pub(crate) generating: bool,
    pub(crate) has_prompt_preview: bool,
    pub(crate) prompt_preview: String,
    pub(crate) has_result: bool,
    pub(crate) result_url: String,
    pub(crate) download_url: String,
    pub(crate) download_name: &'static str,
    pub(crate) loading_clarity: &'static str,
    pub(crate) loading_generate: &'static str,
    pub(crate) loading_message: &'static str,
}

impl StudioTemplate {
    fn new(workspace: &Workspace, csrf_token: String, flash: Option<flash::FlashMessage>) -> Self {
        let selected_id = workspace.selected_image().map(|image| image.id.as_str());
        let images: Vec<ImageCardView> = workspace
            .images()
            .iter()
            .map(|image| ImageCardView::new(image, selected_id))
            .collect();
        let categories = Category::ALL
            .into_iter()
            .map(|category| CategoryView::new(category, workspace.selections.get(category)))
            .collect();
        let ratios = AspectRatio::ALL
            .into_iter()
            .map(|ratio| RatioView {
                value: ratio.value(),
                label: ratio.label(),
                checked: ratio == workspace.aspect_ratio,
            })
            .collect();
        let prompt_preview = workspace.selections.assemble().unwrap_or_default();
        let (has_flash, flash_message, flash_class) = match flash {
            Some(message) => (true, message.text.to_string(), message.class.to_string()),
            None => (false, String::new(), String::new()),
        };
        // the timestamp busts browser caches between runs
        let version = workspace
            .generated()
            .map(|generated| generated.created_at.timestamp_millis())
            .unwrap_or_default();

        Self {
            csrf_token,
            has_flash,
            flash_message,
            flash_is_error: flash_class == "error",
            flash_class,
            has_images: !images.is_empty(),
            images,
            categories,
            ratios,
            ready: workspace.is_ready_to_generate(),
            generating: workspace.is_generating(),
            has_prompt_preview: !prompt_preview.is_empty(),
            prompt_preview,
            has_result: workspace.generated().is_some(),
            result_url: format!("/result?v={version}"),
            download_url: "/result/download".to_string(),
            download_name: RESULT_DOWNLOAD_NAME,
            loading_clarity: LOADING_CLARITY,
            loading_generate: LOADING_GENERATE,
            loading_message: workspace
                .generation_stage()
                .map(GenerationStage::loading_message)
                .unwrap_or(LOADING_GENERATE),
        }
    }
}

/// handles the / GET
pub(crate) async fn root_handler(
    State(state): State<AppState>,
    studio: StudioSession,
) -> Result<StudioTemplate, StudioError> {
    let workspace = state.workspaces.snapshot(&studio.workspace_id).await;
    let csrf_token = csrf_token(&studio.session).await?;
    let flash = flash::take_flash_message(&studio.session).await?;
    Ok(StudioTemplate::new(&workspace, csrf_token, flash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::LOADING_WATERMARK;
    use crate::gemini::ClarityCheck;
    use crate::intake::InspectedImage;

    fn busy_workspace() -> Workspace {
        let mut image = UploadedImage::new(
            "face.png",
            vec![1, 2, 3],
            &InspectedImage {
                mime_type: "image/png",
                width: 1,
                height: 1,
            },
        );
        image.clarity = Some(ClarityCheck {
            score: 91,
            feedback: "Khuôn mặt sắc nét".to_string(),
            is_usable: true,
        });
        let id = image.id.clone();
        let mut workspace = Workspace::default();
        workspace.add_images([image]);
        workspace.select_image(&id);
        workspace.selections.style.set_custom("mặc áo giáp");
        workspace.begin_generation().expect("run starts");
        workspace
    }

    #[test]
    fn loading_copy_follows_the_run() {
        let mut workspace = busy_workspace();
        let page = StudioTemplate::new(&workspace, "t".to_string(), None)
            .render()
            .expect("render");
        assert!(page.contains(&format!("<p>{LOADING_GENERATE}</p>")));
        assert!(page.contains("Đang tạo..."));
        assert!(!page.contains(LOADING_WATERMARK));

        workspace.mark_watermarking();
        let page = StudioTemplate::new(&workspace, "t".to_string(), None)
            .render()
            .expect("render");
        assert!(page.contains(LOADING_WATERMARK));
    }

    #[test]
    fn cards_show_feedback_and_selection() {
        let workspace = busy_workspace();
        let page = StudioTemplate::new(&workspace, "t".to_string(), None)
            .render()
            .expect("render");
        assert!(page.contains("91% Rõ nét"));
        assert!(page.contains("Khuôn mặt sắc nét"));
        assert!(page.contains("Đã chọn"));
        assert!(page.contains("Sẵn sàng sáng tạo?"));
    }

    #[test]
    fn errors_sit_under_the_generate_button() {
        let workspace = Workspace::default();
        let text = "Vui lòng chọn một hình ảnh khuôn mặt rõ nét.";
        let message = flash::FlashMessage {
            text,
            class: "error",
        };
        let page = StudioTemplate::new(&workspace, "t".to_string(), Some(message))
            .render()
            .expect("render");
        let button = page.find("Kết hợp hình ảnh").expect("generate button");
        let shown = page.find(text).expect("flash shown");
        assert!(shown > button);
        assert_eq!(page.matches(text).count(), 1);
    }
}
