use tower_sessions::Session;

use crate::error::StudioError;
use crate::workspace::GenerateBlocked;

const FLASH_FLAG_KEY: &str = "flash_flag";

pub(crate) const FLASH_NO_IMAGE_SELECTED: u16 = 1;
pub(crate) const FLASH_EMPTY_PROMPT: u16 = 2;
pub(crate) const FLASH_LOW_CLARITY: u16 = 3;
pub(crate) const FLASH_GENERATION_FAILED: u16 = 4;
pub(crate) const FLASH_ANALYSIS_FAILED: u16 = 5;
pub(crate) const FLASH_UNSUPPORTED_UPLOAD: u16 = 6;
pub(crate) const FLASH_ALREADY_RUNNING: u16 = 7;
pub(crate) const FLASH_SELECTIONS_SAVED: u16 = 8;
pub(crate) const FLASH_NO_FILES: u16 = 9;
pub(crate) const FLASH_TOO_MANY_IMAGES: u16 = 10;

#[derive(Clone, Debug)]
pub(crate) struct FlashMessage {
    pub(crate) text: &'static str,
    pub(crate) class: &'static str,
}

pub(crate) fn flag_for_blocked(blocked: GenerateBlocked) -> u16 {
    match blocked {
        GenerateBlocked::NoImageSelected => FLASH_NO_IMAGE_SELECTED,
        GenerateBlocked::EmptyPrompt => FLASH_EMPTY_PROMPT,
        GenerateBlocked::LowClarity => FLASH_LOW_CLARITY,
        GenerateBlocked::AlreadyRunning => FLASH_ALREADY_RUNNING,
    }
}

pub(crate) async fn set_flash(session: &Session, flag: u16) -> Result<(), StudioError> {
    session.insert(FLASH_FLAG_KEY, flag).await?;
    Ok(())
}

pub(crate) async fn take_flash_message(
    session: &Session,
) -> Result<Option<FlashMessage>, StudioError> {
    let flag = session
        .get::<u16>(FLASH_FLAG_KEY)
        .await?
        .filter(|flag| *flag != 0);
    if flag.is_some() {
        session.insert(FLASH_FLAG_KEY, 0u16).await?;
    }
    Ok(flag.and_then(message_for))
}

fn message_for(flag: u16) -> Option<FlashMessage> {
    let (text, class) = match flag {
        FLASH_NO_IMAGE_SELECTED => ("Vui lòng chọn một hình ảnh khuôn mặt rõ nét.", "error"),
        FLASH_EMPTY_PROMPT => (
            "Vui lòng cung cấp ít nhất một mô tả về phong cách, bối cảnh, góc máy hoặc ánh sáng.",
            "error",
        ),
        FLASH_LOW_CLARITY => (
            "Hình ảnh đã chọn có độ nét khuôn mặt thấp. Vui lòng sử dụng ảnh rõ hơn để có kết quả tốt hơn.",
            "error",
        ),
        FLASH_GENERATION_FAILED => (
            "Đã xảy ra lỗi trong quá trình tạo ảnh. Vui lòng kiểm tra console và thử lại.",
            "error",
        ),
        FLASH_ANALYSIS_FAILED => (
            "Phân tích độ nét khuôn mặt không thành công. Vui lòng thử lại.",
            "error",
        ),
        FLASH_UNSUPPORTED_UPLOAD => ("Chỉ hỗ trợ ảnh PNG, JPG hoặc WEBP.", "error"),
        FLASH_ALREADY_RUNNING => ("Ảnh đang được tạo, vui lòng đợi trong giây lát.", "warning"),
        FLASH_SELECTIONS_SAVED => ("Đã lưu lựa chọn của bạn.", "success"),
        FLASH_NO_FILES => ("Vui lòng chọn ít nhất một ảnh để tải lên.", "warning"),
        FLASH_TOO_MANY_IMAGES => (
            "Đã đạt số lượng ảnh tối đa. Vui lòng xóa bớt ảnh trước khi tải thêm.",
            "warning",
        ),
        _ => return None,
    };
    Some(FlashMessage { text, class })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_block_reason_has_a_message() {
        for blocked in [
            GenerateBlocked::NoImageSelected,
            GenerateBlocked::EmptyPrompt,
            GenerateBlocked::LowClarity,
            GenerateBlocked::AlreadyRunning,
        ] {
            assert!(message_for(flag_for_blocked(blocked)).is_some());
        }
        assert!(message_for(0).is_none());
        assert!(message_for(999).is_none());
    }
}
