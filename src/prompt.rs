//! Descriptor categories, aspect ratios and prompt assembly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    BACKGROUND_SUGGESTIONS, CAMERA_ANGLE_SUGGESTIONS, LIGHTING_SUGGESTIONS, STYLE_SUGGESTIONS,
};

/// One of the four descriptor groups a visitor fills in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Style and subject
    Style,
    /// Background / setting
    Background,
    /// Camera angle
    CameraAngle,
    /// Lighting
    Lighting,
}

impl Category {
    /// All categories, in prompt order.
    pub const ALL: [Category; 4] = [
        Category::Style,
        Category::Background,
        Category::CameraAngle,
        Category::Lighting,
    ];

    /// Form field key, also used for the free-text field as `<key>_custom`.
    pub fn key(self) -> &'static str {
        match self {
            Category::Style => "style",
            Category::Background => "background",
            Category::CameraAngle => "camera_angle",
            Category::Lighting => "lighting",
        }
    }

    /// Label that prefixes this category's part of the prompt.
    pub fn prompt_label(self) -> &'static str {
        match self {
            Category::Style => "Phong cách và chủ đề",
            Category::Background => "Bối cảnh/thiết lập",
            Category::CameraAngle => "Góc máy",
            Category::Lighting => "Ánh sáng",
        }
    }

    /// Step heading on the studio page.
    pub fn heading(self) -> &'static str {
        match self {
            Category::Style => "Bước 2: Thêm phong cách",
            Category::Background => "Bước 3: Xác định bối cảnh",
            Category::CameraAngle => "Bước 4: Đặt góc máy",
            Category::Lighting => "Bước 5: Chọn ánh sáng",
        }
    }

    /// Label above the suggestion grid.
    pub fn suggestions_label(self) -> &'static str {
        match self {
            Category::Style => "Gợi ý phong cách",
            Category::Background => "Gợi ý bối cảnh",
            Category::CameraAngle => "Gợi ý góc máy",
            Category::Lighting => "Gợi ý ánh sáng",
        }
    }

    /// Placeholder for the free-text field.
    pub fn placeholder(self) -> &'static str {
        match self {
            Category::Style => "VD: Một hiệp sĩ mặc áo giáp sáng bóng...",
            Category::Background => "VD: Bên trong buồng lái tàu vũ trụ...",
            Category::CameraAngle => "VD: Chụp từ dưới lên...",
            Category::Lighting => "VD: Ánh nến lung linh...",
        }
    }

    /// The fixed suggestion tags offered for this category.
    pub fn suggestions(self) -> &'static [&'static str] {
        match self {
            Category::Style => STYLE_SUGGESTIONS,
            Category::Background => BACKGROUND_SUGGESTIONS,
            Category::CameraAngle => CAMERA_ANGLE_SUGGESTIONS,
            Category::Lighting => LIGHTING_SUGGESTIONS,
        }
    }

    /// Whether `tag` is one of this category's suggestions.
    pub fn is_suggestion(self, tag: &str) -> bool {
        self.suggestions().contains(&tag)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.key() == s)
            .ok_or(())
    }
}

/// Tags chosen from the suggestions, in the order they were picked, plus free text.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct CategorySelection {
    selected: Vec<String>,
    custom: String,
}

impl CategorySelection {
    /// Selected tags in pick order.
    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    /// Free-text augmentation, as typed.
    pub fn custom(&self) -> &str {
        &self.custom
    }

    /// Whether `tag` is currently selected.
    pub fn is_selected(&self, tag: &str) -> bool {
        self.selected.iter().any(|existing| existing == tag)
    }

    /// Adds `tag` at the end, or removes it if already selected.
    pub fn toggle(&mut self, tag: &str) {
        if self.is_selected(tag) {
            self.selected.retain(|existing| existing != tag);
        } else {
            self.selected.push(tag.to_string());
        }
    }

    /// Replaces the selection with `tags`, keeping the pick order of tags that stay selected
    /// and appending newly chosen ones in the order given. Duplicates are ignored.
    pub fn set_selected<'a>(&mut self, tags: impl IntoIterator<Item = &'a str>) {
        let mut wanted: Vec<&str> = Vec::new();
        for tag in tags {
            if !wanted.contains(&tag) {
                wanted.push(tag);
            }
        }
        self.selected.retain(|existing| wanted.contains(&existing.as_str()));
        for tag in wanted {
            if !self.is_selected(tag) {
                self.selected.push(tag.to_string());
            }
        }
    }

    /// Replaces the free text.
    pub fn set_custom(&mut self, custom: &str) {
        self.custom = custom.to_string();
    }

    /// True when a tag is chosen or the free text has non-blank content.
    pub fn has_content(&self) -> bool {
        !self.selected.is_empty() || !self.custom.trim().is_empty()
    }

    /// Renders `"<label>: a, b, custom."`, or `None` when nothing non-blank is left.
    pub fn prompt_part(&self, label: &str) -> Option<String> {
        let all: Vec<&str> = self
            .selected
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.custom.as_str()))
            .filter(|part| !part.trim().is_empty())
            .collect();
        if all.is_empty() {
            return None;
        }
        Some(format!("{}: {}.", label, all.join(", ")))
    }
}

/// Every category's selection.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PromptSelections {
    /// Style and subject
    pub style: CategorySelection,
    /// Background / setting
    pub background: CategorySelection,
    /// Camera angle
    pub camera_angle: CategorySelection,
    /// Lighting
    pub lighting: CategorySelection,
}

impl PromptSelections {
    /// Selection for one category.
    pub fn get(&self, category: Category) -> &CategorySelection {
        match category {
            Category::Style => &self.style,
            Category::Background => &self.background,
            Category::CameraAngle => &self.camera_angle,
            Category::Lighting => &self.lighting,
        }
    }

    /// Mutable selection for one category.
    pub fn get_mut(&mut self, category: Category) -> &mut CategorySelection {
        match category {
            Category::Style => &mut self.style,
            Category::Background => &mut self.background,
            Category::CameraAngle => &mut self.camera_angle,
            Category::Lighting => &mut self.lighting,
        }
    }

    /// True when any category contributes to the prompt.
    pub fn has_content(&self) -> bool {
        Category::ALL
            .into_iter()
            .any(|category| self.get(category).has_content())
    }

    /// Joins every non-empty category part with a space, in prompt order.
    pub fn assemble(&self) -> Option<String> {
        let parts: Vec<String> = Category::ALL
            .into_iter()
            .filter_map(|category| self.get(category).prompt_part(category.prompt_label()))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Output frame shape requested from the image model.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 1:1
    #[default]
    #[serde(rename = "1:1")]
    Square,
    /// 16:9
    #[serde(rename = "16:9")]
    Widescreen,
    /// 9:16
    #[serde(rename = "9:16")]
    Portrait,
    /// 4:3
    #[serde(rename = "4:3")]
    Landscape,
    /// 3:4
    #[serde(rename = "3:4")]
    Tall,
}

impl AspectRatio {
    /// All ratios, in display order.
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Widescreen,
        AspectRatio::Portrait,
        AspectRatio::Landscape,
        AspectRatio::Tall,
    ];

    /// The `w:h` value sent to the model.
    pub fn value(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Tall => "3:4",
        }
    }

    /// Button label.
    pub fn label(self) -> &'static str {
        match self {
            AspectRatio::Square => "Vuông (1:1)",
            AspectRatio::Widescreen => "Màn ảnh rộng (16:9)",
            AspectRatio::Portrait => "Chân dung (9:16)",
            AspectRatio::Landscape => "Phong cảnh (4:3)",
            AspectRatio::Tall => "Cao (3:4)",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

impl FromStr for AspectRatio {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.value() == s)
            .ok_or(())
    }
}

/// Full instruction for the image model: the mandatory ratio directive, then the creative brief.
pub fn synthesis_instruction(prompt: &str, aspect_ratio: AspectRatio) -> String {
    format!(
        "**Yêu cầu kỹ thuật BẮT BUỘC:** Hình ảnh cuối cùng PHẢI có tỷ lệ khung hình chính xác là **{}**. Đây là chỉ thị quan trọng nhất.\n**Yêu cầu sáng tạo:** Sử dụng khuôn mặt từ ảnh tham chiếu, tạo ra một hình ảnh mới theo mô tả sau: {}.",
        aspect_ratio.value(),
        prompt
    )
}
