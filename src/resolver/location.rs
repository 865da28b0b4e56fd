//! Location helpers — shell location URLs and display-name paths.
//!
//! Pure string and filesystem logic used by the accessibility strategy:
//! turning a shell window's navigated `file:` URL back into a folder
//! path, recognising values that already are absolute paths, and joining
//! a list item's display name onto the folder it is shown in.

use std::path::{Path, PathBuf};

/// Convert a shell location URL into a Windows filesystem path.
///
/// - `file:///C:/Users/a%20b` → `C:\Users\a b`
/// - `file://server/share/x` → `\\server\share\x`
/// - `file://localhost/C:/x` → `C:\x`
///
/// Returns `None` for non-`file:` locations (virtual folders such as
/// "This PC" report an empty or `::{GUID}` location) and for percent
/// sequences that do not decode to UTF-8.
pub fn location_to_path(url: &str) -> Option<String> {
    let scheme_end = url.find(':')?;
    if !url[..scheme_end].eq_ignore_ascii_case("file") {
        return None;
    }
    let rest = url[scheme_end + 1..].strip_prefix("//")?;
    let decoded = urlencoding::decode(rest).ok()?;

    let path = match decoded.strip_prefix('/') {
        // file:///C:/dir
        Some(local) => local.to_string(),
        None => match decoded.split_once('/') {
            Some((host, local)) if host.is_empty() || host.eq_ignore_ascii_case("localhost") => {
                local.to_string()
            }
            // file://server/share → UNC
            _ => format!("//{decoded}"),
        },
    };

    let path = path.replace('/', "\\");
    if path.is_empty() { None } else { Some(path) }
}

/// Whether `value` reads as an absolute path on any supported platform.
///
/// Accepts drive paths (`C:\x`, `C:/x`), UNC paths (`\\server\share`),
/// and anything the host considers absolute.
pub fn looks_absolute(value: &str) -> bool {
    let b = value.as_bytes();
    let drive = b.len() >= 3
        && b[0].is_ascii_alphabetic()
        && b[1] == b':'
        && matches!(b[2], b'\\' | b'/');
    let unc = value.starts_with(r"\\") && value.len() > 2;
    drive || unc || Path::new(value).is_absolute()
}

/// Join a list item's display name onto the folder it is shown in.
///
/// Returns the joined path when it exists. When the shell hides known
/// extensions the display name is only the file stem; in that case the
/// single folder entry whose stem matches (case-insensitively) is used.
/// Ambiguous stems and names containing separators yield `None`.
pub fn join_display_name(folder: &Path, name: &str) -> Option<PathBuf> {
    let name = name.trim();
    if name.is_empty() || name.contains(['\\', '/']) {
        return None;
    }

    let direct = folder.join(name);
    if direct.exists() {
        return Some(direct);
    }

    let wanted = name.to_lowercase();
    let mut matches = std::fs::read_dir(folder)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| stem.to_lowercase() == wanted)
        });

    let first = matches.next()?;
    match matches.next() {
        Some(_) => None,
        None => Some(first),
    }
}
