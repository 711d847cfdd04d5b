//! Distribution detection from `/etc/os-release`.

use std::fmt;
use std::path::Path;

pub const OS_RELEASE: &str = "/etc/os-release";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Debian,
    Alpine,
    Unknown,
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debian => "debian",
            Self::Alpine => "alpine",
            Self::Unknown => "unknown",
        })
    }
}

fn field(os_release: &str, name: &str) -> Option<String> {
    os_release.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().trim_matches('"').trim_matches('\'').to_lowercase())
    })
}

/// Classifies os-release text: `ID=` decides first, then `ID_LIKE=`.
pub fn detect_os(os_release: &str) -> OsFamily {
    if let Some(id) = field(os_release, "ID") {
        match id.as_str() {
            "debian" | "ubuntu" => return OsFamily::Debian,
            "alpine" => return OsFamily::Alpine,
            _ => {}
        }
    }
    if let Some(like) = field(os_release, "ID_LIKE") {
        if like.contains("debian") {
            return OsFamily::Debian;
        }
        if like.contains("alpine") {
            return OsFamily::Alpine;
        }
    }
    OsFamily::Unknown
}

/// Reads an os-release file; unreadable means [`OsFamily::Unknown`].
pub fn detect_os_from(path: impl AsRef<Path>) -> OsFamily {
    std::fs::read_to_string(path).map_or(OsFamily::Unknown, |text| detect_os(&text))
}

/// `VERSION_CODENAME`, e.g. `bookworm`.
pub fn version_codename(os_release: &str) -> Option<String> {
    field(os_release, "VERSION_CODENAME").filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_decides() {
        assert_eq!(detect_os("NAME=\"Debian\"\nID=debian\n"), OsFamily::Debian);
        assert_eq!(detect_os("ID=ubuntu\nID_LIKE=debian"), OsFamily::Debian);
        assert_eq!(detect_os("ID=\"alpine\""), OsFamily::Alpine);
    }

    #[test]
    fn id_like_fallback() {
        assert_eq!(detect_os("ID=linuxmint\nID_LIKE=\"ubuntu debian\""), OsFamily::Debian);
        assert_eq!(detect_os("ID=postmarketos\nID_LIKE=alpine"), OsFamily::Alpine);
        assert_eq!(detect_os("ID=fedora\nID_LIKE=\"rhel centos\""), OsFamily::Unknown);
        assert_eq!(detect_os(""), OsFamily::Unknown);
    }

    #[test]
    fn id_like_is_not_id() {
        // ID_LIKE must not be read as ID.
        assert_eq!(detect_os("ID_LIKE=alpine\nID=debian"), OsFamily::Debian);
    }

    #[test]
    fn missing_file_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_os_from(dir.path().join("os-release")), OsFamily::Unknown);
    }

    #[test]
    fn codename() {
        assert_eq!(
            version_codename("ID=debian\nVERSION_CODENAME=bookworm\n").as_deref(),
            Some("bookworm")
        );
        assert_eq!(version_codename("ID=alpine"), None);
    }
}
