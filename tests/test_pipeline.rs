use std::io::Cursor;

use faceswap_studio::config::setup_logging;
use faceswap_studio::intake::inspect_image;
use faceswap_studio::prompt::{AspectRatio, Category, PromptSelections, synthesis_instruction};
use faceswap_studio::watermark::Watermarker;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

fn portrait(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([30, 60, 90, 255]));
    let mut buf = Cursor::new(Vec::new());
    let img = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8()),
        _ => DynamicImage::ImageRgba8(img),
    };
    img.write_to(&mut buf, format).expect("encode portrait");
    buf.into_inner()
}

#[test]
fn test_prompt_carries_every_category_in_order() {
    let _ = setup_logging(true);

    let mut selections = PromptSelections::default();
    selections
        .get_mut(Category::Lighting)
        .set_selected(["Ánh sáng neon"]);
    selections
        .get_mut(Category::Style)
        .set_selected(["Thành phố cyberpunk đèn neon", "Kiệt tác sơn dầu"]);
    selections.get_mut(Category::Style).set_custom("mặc áo choàng");
    selections
        .get_mut(Category::CameraAngle)
        .set_custom("Chụp từ dưới lên");

    let prompt = selections.assemble().expect("prompt");
    let style = prompt.find("Phong cách").expect("style part");
    let camera = prompt.find("Góc máy").expect("camera part");
    let light = prompt.find("Ánh sáng:").expect("lighting part");
    assert!(style < camera && camera < light);
    assert!(!prompt.contains("Bối cảnh"));
    assert!(prompt.contains("Thành phố cyberpunk đèn neon, Kiệt tác sơn dầu, mặc áo choàng."));

    let instruction = synthesis_instruction(&prompt, AspectRatio::Portrait);
    assert!(instruction.contains("**9:16**"));
    assert!(instruction.ends_with(&format!("{prompt}.")));
}

#[test]
fn test_watermark_keeps_dimensions_for_each_format() {
    let watermark = Watermarker::bundled("KYLE NGUYEN").expect("bundled font");
    for format in [ImageFormat::Png, ImageFormat::Jpeg] {
        let input = portrait(320, 200, format);
        assert!(inspect_image(&input).is_ok());

        let output = watermark.apply(&input).expect("watermark");
        let inspected = inspect_image(&output).expect("inspect output");
        assert_eq!(inspected.mime_type, "image/png");
        assert_eq!((inspected.width, inspected.height), (320, 200));

        let decoded = image::load_from_memory(&output).expect("decode").to_rgba8();
        // top-left stays untouched, the stamp lives bottom-right
        let corner = decoded.get_pixel(2, 2).0;
        for (got, want) in corner[..3].iter().zip([30u8, 60, 90]) {
            assert!(got.abs_diff(want) <= 4, "corner changed: {corner:?}");
        }
        assert!(
            decoded
                .enumerate_pixels()
                .filter(|(x, y, _)| *x > 160 && *y > 100)
                .any(|(_, _, pixel)| pixel.0[0] > 120)
        );
    }
}
