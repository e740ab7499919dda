//! 封面图片格式识别与 JPEG 归一化。
//!
//! 归档内封面固定为 `cover.jpg`，非 JPEG 数据需要先转码。

use image::GenericImageView;
use tracing::debug;

use crate::base_system::error::{BookError, BookResult};

/// 按文件头识别图片的 MIME 类型。
pub(crate) fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.len() >= 3 && bytes[0] == 0xFF && bytes[1] == 0xD8 && bytes[2] == 0xFF {
        return "image/jpeg";
    }
    if bytes.len() >= 8 && bytes[..8] == [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A] {
        return "image/png";
    }
    if bytes.len() >= 6 && &bytes[0..3] == b"GIF" {
        return "image/gif";
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return "image/webp";
    }
    "application/octet-stream"
}

/// 返回可直接作为 `cover.jpg` 写入的数据。
///
/// 已是 JPEG 且尺寸不超过 `max_dim`（0 表示不限）时原样返回；
/// 否则解码、按比例缩小并以 `quality` 重新编码。
pub(crate) fn normalize_to_jpeg(bytes: &[u8], quality: u8, max_dim: u32) -> BookResult<Vec<u8>> {
    let mime = sniff_mime(bytes);
    if mime == "image/jpeg" && max_dim == 0 {
        return Ok(bytes.to_vec());
    }

    let mut img = image::load_from_memory(bytes)
        .map_err(|e| BookError::Parse(format!("封面图片无法解码 ({mime}): {e}")))?;

    let (w, h) = img.dimensions();
    let longest = w.max(h);
    let oversized = max_dim > 0 && longest > max_dim;
    if mime == "image/jpeg" && !oversized {
        return Ok(bytes.to_vec());
    }
    if oversized {
        let scale = max_dim as f32 / longest as f32;
        let nw = ((w as f32) * scale).round().max(1.0) as u32;
        let nh = ((h as f32) * scale).round().max(1.0) as u32;
        img = img.resize_exact(nw, nh, image::imageops::FilterType::Lanczos3);
    }

    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder
        .encode(
            &rgb,
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| BookError::Parse(format!("封面 JPEG 编码失败: {e}")))?;
    debug!(target: "cover", from = mime, width = rgb.width(), height = rgb.height(), "cover transcoded");
    Ok(out)
}
