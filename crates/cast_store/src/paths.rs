use std::path::{Path, PathBuf};

use time::macros::format_description;
use time::OffsetDateTime;

pub const CAST_EXTENSION: &str = "cast";
pub const MAX_FILENAME_SEGMENT: usize = 100;
/// `NAME_MAX` on common Linux filesystems.
pub const MAX_FILE_NAME_BYTES: usize = 255;

/// Replace characters that are unsafe in a filename segment with `_`.
///
/// Path separators, ASCII control characters and the reserved set `<>:"|?*`
/// are replaced one-for-one; the result is capped at [`MAX_FILENAME_SEGMENT`]
/// characters. Spaces are kept.
#[must_use]
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_FILENAME_SEGMENT)
        .collect()
}

/// `output_dir/YYYY-MM`
#[must_use]
pub fn month_dir(output_dir: &Path, at: OffsetDateTime) -> PathBuf {
    let format = format_description!("[year]-[month]");
    let bucket = at
        .format(&format)
        .unwrap_or_else(|_| format!("{:04}-{:02}", at.year(), u8::from(at.month())));
    output_dir.join(bucket)
}

#[must_use]
pub fn cast_file_name(at: OffsetDateTime, host: &str, session: &str, window_name: &str) -> String {
    let format = format_description!("[year]-[month]-[day]_[hour][minute]");
    let stamp = at.format(&format).unwrap_or_else(|_| {
        format!(
            "{:04}-{:02}-{:02}_{:02}{:02}",
            at.year(),
            u8::from(at.month()),
            at.day(),
            at.hour(),
            at.minute()
        )
    });

    let mut stem = format!(
        "{}_{}_{}_{}",
        safe_filename(&stamp),
        safe_filename(host),
        safe_filename(session),
        safe_filename(window_name)
    );
    truncate_bytes(&mut stem, MAX_FILE_NAME_BYTES - CAST_EXTENSION.len() - 1);
    format!("{stem}.{CAST_EXTENSION}")
}

fn truncate_bytes(name: &mut String, max: usize) {
    if name.len() <= max {
        return;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name.truncate(end);
}

/// Full output path: `output_dir/YYYY-MM/<stamp>_<host>_<session>_<window>.cast`.
#[must_use]
pub fn cast_path(
    output_dir: &Path,
    at: OffsetDateTime,
    host: &str,
    session: &str,
    window_name: &str,
) -> PathBuf {
    month_dir(output_dir, at).join(cast_file_name(at, host, session, window_name))
}
