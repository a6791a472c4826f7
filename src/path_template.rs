//! Destination path handling for screenshot requests.
//!
//! A template such as `shots/frame_####.png` names one output file per
//! dispatched encode task: the last run of `#` in the file name is replaced
//! by the zero-padded frame number, then the extension is normalized to the
//! requested file type.

use std::path::PathBuf;

use crate::error::{ShotError, ShotResult};
use crate::format::{ImageFileType, KNOWN_IMAGE_EXTENSIONS};

const FRAME_PLACEHOLDER: char = '#';

/// Reject templates that cannot name a file. Called before a request is
/// queued so encode tasks never see them.
pub fn validate_template(template: &str) -> ShotResult<()> {
    if template.trim().is_empty() {
        return Err(ShotError::InvalidRequest("path template is empty".into()));
    }
    if template.contains('\0') {
        return Err(ShotError::InvalidRequest(
            "path template contains a NUL byte".into(),
        ));
    }
    if template.ends_with(['/', '\\']) {
        return Err(ShotError::InvalidRequest(format!(
            "path template names a directory: {template}"
        )));
    }
    let name = file_name(template);
    if name.trim().is_empty() || name == "." || name == ".." {
        return Err(ShotError::InvalidRequest(format!(
            "path template has no file name: {template}"
        )));
    }
    let lowered = name.to_ascii_lowercase();
    if KNOWN_IMAGE_EXTENSIONS.contains(&lowered.as_str()) {
        return Err(ShotError::InvalidRequest(format!(
            "path template file name is only an extension: {template}"
        )));
    }
    Ok(())
}

/// Byte offset where the file name component starts.
fn file_name_start(path: &str) -> usize {
    path.rfind(['/', '\\']).map_or(0, |sep| sep + 1)
}

fn file_name(path: &str) -> &str {
    &path[file_name_start(path)..]
}

/// Replace the last run of `#` in the file name with `frame`, zero-padded
/// to the run's length. Templates without a placeholder come back as-is.
pub fn apply_frame_number(template: &str, frame: u64) -> String {
    let name_start = file_name_start(template);
    let name = &template[name_start..];

    let Some(run_end) = name.rfind(FRAME_PLACEHOLDER).map(|i| i + 1) else {
        return template.to_string();
    };
    let run_start = name[..run_end]
        .rfind(|c: char| c != FRAME_PLACEHOLDER)
        .map_or(0, |i| i + 1);
    let width = run_end - run_start;

    let mut out = String::with_capacity(template.len() + 8);
    out.push_str(&template[..name_start + run_start]);
    out.push_str(&format!("{frame:0width$}"));
    out.push_str(&template[name_start + run_end..]);
    out
}

/// Make the path end in an extension accepted by `file_type`. A different
/// known image extension is replaced; anything else is kept and the
/// preferred extension appended.
pub fn ensure_extension(path: &str, file_type: ImageFileType) -> String {
    let name = file_name(path).to_ascii_lowercase();

    if file_type
        .extensions()
        .iter()
        .any(|ext| name.len() > ext.len() && name.ends_with(ext))
    {
        return path.to_string();
    }

    let stem_len = KNOWN_IMAGE_EXTENSIONS
        .iter()
        .find(|ext| name.len() > ext.len() && name.ends_with(*ext))
        .map_or(path.len(), |ext| path.len() - ext.len());

    let mut out = String::with_capacity(stem_len + 5);
    out.push_str(&path[..stem_len]);
    out.push_str(file_type.preferred_extension());
    out
}

/// Final output path for one encode task.
pub fn resolve_output_path(template: &str, frame: u64, file_type: ImageFileType) -> PathBuf {
    PathBuf::from(ensure_extension(
        &apply_frame_number(template, frame),
        file_type,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_run_is_zero_padded() {
        assert_eq!(apply_frame_number("shot_####.png", 1), "shot_0001.png");
        assert_eq!(apply_frame_number("shot_#.png", 42), "shot_42.png");
        assert_eq!(apply_frame_number("shot_##.png", 12345), "shot_12345.png");
    }

    #[test]
    fn only_the_last_run_in_the_file_name_is_replaced() {
        assert_eq!(apply_frame_number("a##_b###.png", 7), "a##_b007.png");
        assert_eq!(apply_frame_number("take_##/shot_###.png", 3), "take_##/shot_003.png");
        assert_eq!(apply_frame_number("take_##/shot.png", 3), "take_##/shot.png");
    }

    #[test]
    fn templates_without_placeholder_are_untouched() {
        assert_eq!(apply_frame_number("screen.png", 9), "screen.png");
    }

    #[test]
    fn matching_extension_is_kept_case_insensitively() {
        assert_eq!(ensure_extension("a.PNG", ImageFileType::Png), "a.PNG");
        assert_eq!(ensure_extension("a.jpeg", ImageFileType::Jpeg), "a.jpeg");
        assert_eq!(ensure_extension("a.tif", ImageFileType::Tiff), "a.tif");
    }

    #[test]
    fn foreign_image_extension_is_replaced() {
        assert_eq!(ensure_extension("shot.jpg", ImageFileType::Png), "shot.png");
        assert_eq!(ensure_extension("dir.v2/shot.exr", ImageFileType::Bmp), "dir.v2/shot.bmp");
    }

    #[test]
    fn unknown_extension_gets_appended() {
        assert_eq!(ensure_extension("shot", ImageFileType::Png), "shot.png");
        assert_eq!(ensure_extension("shot.v1", ImageFileType::Jpeg), "shot.v1.jpg");
        assert_eq!(ensure_extension("dir.png/shot", ImageFileType::Png), "dir.png/shot.png");
    }

    #[test]
    fn resolve_combines_frame_and_extension() {
        assert_eq!(
            resolve_output_path("out/shot_####", 12, ImageFileType::Png),
            PathBuf::from("out/shot_0012.png")
        );
    }

    #[test]
    fn malformed_templates_are_rejected() {
        for bad in ["", "   ", "shots/", "shots\\", "a\0b.png", "shots/..", "."] {
            assert!(
                matches!(validate_template(bad), Err(ShotError::InvalidRequest(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(validate_template("shots/shot_####.png").is_ok());
        assert!(validate_template("#").is_ok());
    }

    #[test]
    fn bare_extension_file_names_are_rejected() {
        for bad in [".png", "out/.JPG", "out\\.webp"] {
            assert!(
                matches!(validate_template(bad), Err(ShotError::InvalidRequest(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(validate_template(".shot").is_ok());
        assert!(validate_template("out/x.png").is_ok());
    }
}
