//! Artifact classification

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Gzip,
    /// Named `.zip`. Still sniffed before it is opened as an archive.
    Zip,
    Passthrough,
}

fn ends_with_ignore_case(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len()
        && name.is_char_boundary(name.len() - suffix.len())
        && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// Kind suggested by the file name. Tarballs are copied as they are.
pub fn classify_name(name: &str) -> ArtifactKind {
    if ends_with_ignore_case(name, ".tar.gz") {
        ArtifactKind::Passthrough
    } else if ends_with_ignore_case(name, ".gz") {
        ArtifactKind::Gzip
    } else if ends_with_ignore_case(name, ".zip") {
        ArtifactKind::Zip
    } else {
        ArtifactKind::Passthrough
    }
}

pub fn is_gzip(head: &[u8]) -> bool {
    head.starts_with(&GZIP_MAGIC)
}

/// Drop the trailing `.gz` or `.zip` extension, whatever its case.
pub fn strip_compression_extension(key: &str) -> &str {
    for suffix in [".gz", ".zip"] {
        if ends_with_ignore_case(key, suffix) {
            return &key[..key.len() - suffix.len()];
        }
    }
    key
}

/// Normalise a zip member name into a relative path, rejecting names that
/// would escape the archive folder.
pub fn member_path(name: &str) -> Option<String> {
    let normalized = name.replace('\\', "/");
    let mut parts = Vec::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            part => parts.push(part),
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_name() {
        assert_eq!(classify_name("raw/a/latest/v/data.txt.gz"), ArtifactKind::Gzip);
        assert_eq!(classify_name("raw/a/latest/v/DATA.GZ"), ArtifactKind::Gzip);
        assert_eq!(classify_name("raw/a/latest/v/bundle.tar.gz"), ArtifactKind::Passthrough);
        assert_eq!(classify_name("raw/a/latest/v/foodb.ZIP"), ArtifactKind::Zip);
        assert_eq!(classify_name("raw/a/latest/v/hp.owl"), ArtifactKind::Passthrough);
        assert_eq!(classify_name("gz"), ArtifactKind::Passthrough);
    }

    #[test]
    fn test_strip_only_trailing_extension() {
        assert_eq!(
            strip_compression_extension("extracted/a/latest/v/x.gz.tsv.gz"),
            "extracted/a/latest/v/x.gz.tsv"
        );
        assert_eq!(strip_compression_extension("extracted/a/latest/v/f.ZIP"), "extracted/a/latest/v/f");
        assert_eq!(strip_compression_extension("extracted/a/latest/v/f.owl"), "extracted/a/latest/v/f.owl");
    }

    #[test]
    fn test_gzip_magic() {
        assert!(is_gzip(&[0x1f, 0x8b, 0x08]));
        assert!(!is_gzip(b"PK\x03\x04"));
        assert!(!is_gzip(&[0x1f]));
    }

    #[test]
    fn test_member_path() {
        assert_eq!(member_path("csv/Food.csv").as_deref(), Some("csv/Food.csv"));
        assert_eq!(member_path("./dir\\file.txt").as_deref(), Some("dir/file.txt"));
        assert_eq!(member_path("/abs/file").as_deref(), Some("abs/file"));
        assert_eq!(member_path("../evil"), None);
        assert_eq!(member_path("a/../../evil"), None);
        assert_eq!(member_path("dir/"), Some("dir".to_string()));
        assert_eq!(member_path("/"), None);
    }
}
