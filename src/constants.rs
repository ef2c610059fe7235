//! Shared constants: model defaults, suggestion lists and user-facing copy.
//!

/// Default Generative Language API root, models are resolved relative to it.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// Model that scores face clarity.
pub const DEFAULT_CLARITY_MODEL: &str = "gemini-2.5-flash";

/// Model that renders the merged image.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";

/// Text stamped in the bottom-right corner of every result.
pub const WATERMARK_TEXT: &str = "KYLE NGUYEN";

/// Minimum clarity score an image needs before it can be used for generation.
pub const CLARITY_USABLE_THRESHOLD: u8 = 50;

/// Scores at or above this are shown as "good".
pub const CLARITY_GOOD_THRESHOLD: u8 = 75;

/// Name offered to the browser when downloading the result.
pub const RESULT_DOWNLOAD_NAME: &str = "tac-pham-hoan-doi-guong-mat.png";

/// Cache-Control value for uploaded image thumbnails.
pub const UPLOAD_CACHE_CONTROL: &str = "private, max-age=3600";

/// Cache-Control value for the generated result, which changes on every run.
pub const RESULT_CACHE_CONTROL: &str = "private, no-store";

/// Uploads kept per visitor before further files are turned away.
pub const MAX_IMAGES_PER_WORKSPACE: usize = 12;

/// Length of CSRF session tokens
pub const CSRF_TOKEN_LENGTH: usize = 32;

/// How often idle workspaces are swept, in seconds.
pub const WORKSPACE_SWEEP_INTERVAL_SECONDS: u64 = 60;

/// Instruction sent alongside every uploaded image to the clarity model.
pub const CLARITY_INSTRUCTION: &str = "Analyze the provided image for its suitability as a face reference in an AI image generation task. Focus on the clarity, visibility, and lighting of the main face. Return a JSON object with 'score' (an integer from 0 to 100 representing clarity), 'feedback' (a brief string in Vietnamese explaining the score), and 'isUsable' (a boolean, true if score is 50 or above).";

/// Style and subject suggestions.
pub const STYLE_SUGGESTIONS: &[&str] = &[
    "Tranh kỹ thuật số, giả tưởng",
    "Thành phố cyberpunk đèn neon",
    "Chiến binh cổ đại, áo giáp chi tiết",
    "Phi hành gia trong không gian, nền vũ trụ",
    "Chân dung phong cách ấn tượng",
    "Minh họa màu nước rực rỡ",
    "Gothic và bí ẩn",
    "Nhà phát minh Steampunk",
    "Siêu anh hùng, ánh sáng điện ảnh",
    "Phong cách nhân vật Anime",
    "Kiệt tác sơn dầu",
    "Nhân vật hoạt hình Pixar",
];

/// Background and setting suggestions.
pub const BACKGROUND_SUGGESTIONS: &[&str] = &[
    "Rừng sương mù",
    "Cảnh quan thành phố tương lai",
    "Lâu đài bị phù phép",
    "Bãi biển ngập nắng",
    "Tàn tích hậu tận thế",
    "Thư viện ấm cúng",
    "Cảnh quan hành tinh xa lạ",
    "Họa tiết hình học trừu tượng",
];

/// Camera angle suggestions.
pub const CAMERA_ANGLE_SUGGESTIONS: &[&str] = &[
    "Cận cảnh",
    "Toàn thân",
    "Góc nhìn từ dưới lên",
    "Góc nhìn từ trên xuống",
    "Góc nghiêng",
    "Cảnh rộng",
    "Nhìn nghiêng",
    "Góc máy qua vai",
];

/// Lighting suggestions.
pub const LIGHTING_SUGGESTIONS: &[&str] = &[
    "Ánh sáng điện ảnh",
    "Ánh sáng dịu, khuếch tán",
    "Đèn ngược sáng ấn tượng",
    "Ánh nắng giờ vàng",
    "Ánh sáng neon",
    "Ánh sáng studio",
    "Ánh trăng kỳ bí",
    "Ánh sáng khối",
];

/// Shown while uploads are being scored.
pub const LOADING_CLARITY: &str = "Đang phân tích độ rõ nét của khuôn mặt...";

/// Shown while the merged image is rendered.
pub const LOADING_GENERATE: &str =
    "Đang kết hợp khuôn mặt với ý tưởng... Việc này có thể mất một chút thời gian.";

/// Shown while the returned image is stamped.
pub const LOADING_WATERMARK: &str = "Đang thêm watermark...";
