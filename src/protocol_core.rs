//! Command header codec and path helpers shared by the server and the client
//!
//! Every connection starts with one fixed 1024-byte header:
//! operation (16) | name or path (256) | size as big-endian i64 (8) | zero fill.
//! Text fields are NUL-padded and end at the first zero byte.

use crate::error::{FtpError, Result};
use crate::protocol::{
    op, HEADER_LEN, MIN_HEADER_LEN, NAME_LEN, NAME_OFFSET, OPERATION_LEN, OPERATION_OFFSET,
    SIZE_LEN, SIZE_OFFSET,
};
use std::fmt;
use std::path::{Path, PathBuf};

/// Operation selected by the first header field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Upload,
    Download,
    Show,
    Search,
    /// Tag not understood by this build; kept for logging
    Unknown(String),
}

impl Operation {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            op::UPLOAD => Operation::Upload,
            op::DOWNLOAD => Operation::Download,
            op::SHOW => Operation::Show,
            op::SEARCH => Operation::Search,
            other => Operation::Unknown(other.to_string()),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            Operation::Upload => op::UPLOAD,
            Operation::Download => op::DOWNLOAD,
            Operation::Show => op::SHOW,
            Operation::Search => op::SEARCH,
            Operation::Unknown(tag) => tag,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Decoded command header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHeader {
    pub operation: Operation,
    pub name: String,
    pub size: i64,
}

impl CommandHeader {
    /// Build a header, rejecting fields that would not survive encoding intact
    pub fn new(operation: Operation, name: impl Into<String>, size: i64) -> Result<Self> {
        let name = name.into();
        if operation.as_tag().len() > OPERATION_LEN {
            return Err(FtpError::protocol(format!(
                "operation tag too long: {} bytes (max {})",
                operation.as_tag().len(),
                OPERATION_LEN
            )));
        }
        if name.len() > NAME_LEN {
            return Err(FtpError::protocol(format!(
                "name too long: {} bytes (max {})",
                name.len(),
                NAME_LEN
            )));
        }
        if name.as_bytes().contains(&0) {
            return Err(FtpError::protocol("name contains NUL byte"));
        }
        Ok(Self {
            operation,
            name,
            size,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        encode_header(self.operation.as_tag(), &self.name, self.size)
    }

    /// Decode a header from at least `MIN_HEADER_LEN` bytes
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < MIN_HEADER_LEN {
            return Err(FtpError::protocol(format!(
                "header too short: {} bytes (need at least {})",
                buf.len(),
                MIN_HEADER_LEN
            )));
        }
        let tag = decode_field(buf, OPERATION_OFFSET, OPERATION_OFFSET + OPERATION_LEN);
        let name = decode_field(buf, NAME_OFFSET, NAME_OFFSET + NAME_LEN);
        let mut size = [0u8; SIZE_LEN];
        size.copy_from_slice(&buf[SIZE_OFFSET..SIZE_OFFSET + SIZE_LEN]);
        Ok(Self {
            operation: Operation::from_tag(&tag),
            name,
            size: decode_i64_be(size),
        })
    }
}

/// Encode a header, silently truncating oversized fields
pub fn encode_header(operation: &str, name_or_path: &str, size: i64) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    put_field(&mut header, OPERATION_OFFSET, OPERATION_LEN, operation.as_bytes());
    put_field(&mut header, NAME_OFFSET, NAME_LEN, name_or_path.as_bytes());
    header[SIZE_OFFSET..SIZE_OFFSET + SIZE_LEN].copy_from_slice(&encode_i64_be(size));
    header
}

fn put_field(buf: &mut [u8], start: usize, width: usize, value: &[u8]) {
    let n = value.len().min(width);
    buf[start..start + n].copy_from_slice(&value[..n]);
}

/// Run of non-zero bytes from `start`, stopping at the first zero or at `end`
pub fn decode_field(bytes: &[u8], start: usize, end: usize) -> String {
    let end = end.min(bytes.len());
    if start >= end {
        return String::new();
    }
    let field = &bytes[start..end];
    let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..len]).into_owned()
}

pub fn encode_i64_be(n: i64) -> [u8; 8] {
    n.to_be_bytes()
}

pub fn decode_i64_be(bytes: [u8; 8]) -> i64 {
    i64::from_be_bytes(bytes)
}

/// Build a search header: the tag, then every name followed by `\n` from offset 16.
///
/// Names that no longer fit in the header are dropped along with all later
/// names. Returns the header and the names that made it in.
pub fn pack_search_names<S: AsRef<str>>(names: &[S]) -> ([u8; HEADER_LEN], Vec<String>) {
    let mut header = encode_header(op::SEARCH, "", 0);
    let mut off = NAME_OFFSET;
    let mut accepted = Vec::with_capacity(names.len());
    for name in names {
        let b = name.as_ref().as_bytes();
        if b.is_empty() || b.contains(&0) || b.contains(&b'\n') {
            continue;
        }
        if off + b.len() + 1 > HEADER_LEN {
            break;
        }
        header[off..off + b.len()].copy_from_slice(b);
        header[off + b.len()] = b'\n';
        off += b.len() + 1;
        accepted.push(name.as_ref().to_string());
    }
    (header, accepted)
}

/// Names packed after the operation field, up to the first zero byte
pub fn parse_search_names(header: &[u8]) -> Vec<String> {
    decode_field(header, NAME_OFFSET, HEADER_LEN)
        .split('\n')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Base name of an uploaded file; uploads are flattened into one directory
pub fn sanitize_file_name(name: &str) -> Result<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    if matches!(base, "" | "." | "..") {
        return Err(FtpError::protocol(format!(
            "invalid upload file name: {:?}",
            name
        )));
    }
    // On Windows, ':' selects an alternate data stream
    #[cfg(windows)]
    if base.contains(':') {
        return Err(FtpError::protocol(format!(
            "upload file name contains colon: {:?}",
            name
        )));
    }
    Ok(base.to_string())
}

/// Resolve a client-supplied relative path under `root`.
///
/// Both `/` and `\` separate components. Absolute paths, `..` components
/// and NUL bytes are rejected (plus `:` on Windows), and the result must stay
/// under `root` after symlinks are resolved.
pub fn normalize_under_root(root: &Path, rel: &str) -> Result<PathBuf> {
    if rel.contains('\0') {
        return Err(FtpError::protocol("path contains NUL byte"));
    }
    if rel.starts_with('/') || rel.starts_with('\\') {
        return Err(FtpError::protocol(format!("absolute path not allowed: {}", rel)));
    }

    let mut safe = PathBuf::new();
    for part in rel.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                return Err(FtpError::protocol(format!(
                    "path contains parent component: {}",
                    rel
                )))
            }
            p => {
                // On Windows, reject components with ':' (drive prefixes, ADS)
                #[cfg(windows)]
                if p.contains(':') {
                    return Err(FtpError::protocol(format!(
                        "path component contains colon: {}",
                        rel
                    )));
                }
                safe.push(p)
            }
        }
    }
    if safe.as_os_str().is_empty() {
        return Err(FtpError::protocol("empty path"));
    }

    let joined = root.join(&safe);
    let canon_root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());

    // Existing paths: resolve symlinks and check containment
    if let Ok(canon) = std::fs::canonicalize(&joined) {
        if !canon.starts_with(&canon_root) {
            return Err(FtpError::protocol(format!("path escapes root via symlinks: {}", rel)));
        }
        return Ok(canon);
    }

    // New files: the parent must resolve under root
    if let (Some(parent), Some(file_name)) = (joined.parent(), joined.file_name()) {
        if let Ok(canon_parent) = std::fs::canonicalize(parent) {
            if !canon_parent.starts_with(&canon_root) {
                return Err(FtpError::protocol(format!(
                    "path parent escapes root via symlinks: {}",
                    rel
                )));
            }
            return Ok(canon_parent.join(file_name));
        }
    }

    Ok(joined)
}

/// Create directory with parent creation
pub async fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        tokio::fs::create_dir_all(path).await?;
    }
    Ok(())
}

/// Create parent directory if needed
pub async fn ensure_parent_exists(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir_exists(parent).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_header_layout() {
        let h = encode_header("upload", "a.bin", 2500);
        assert_eq!(h.len(), HEADER_LEN);
        assert_eq!(&h[0..6], b"upload");
        assert!(h[6..16].iter().all(|&b| b == 0));
        assert_eq!(&h[16..21], b"a.bin");
        assert!(h[21..272].iter().all(|&b| b == 0));
        assert_eq!(&h[272..280], &2500i64.to_be_bytes());
        assert!(h[280..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_header_fields_recovered() {
        let full_name = "n".repeat(NAME_LEN);
        let cases = [
            ("upload", "a.bin", 2500i64),
            ("download", "dir/sub/file.txt", 0),
            ("show", "", 0),
            ("sixteen-byte-tag", full_name.as_str(), -1),
        ];
        for (operation, name, size) in cases {
            let h = encode_header(operation, name, size);
            assert_eq!(decode_field(&h, 0, 16), operation);
            assert_eq!(decode_field(&h, 16, 272), name);
            let decoded = CommandHeader::decode(&h).unwrap();
            assert_eq!(decoded.size, size);
        }
    }

    #[test]
    fn test_encode_truncates_oversized_fields() {
        let long_name = "x".repeat(300);
        let h = encode_header("a-very-long-operation-tag", &long_name, 7);
        assert_eq!(decode_field(&h, 0, 16), "a-very-long-oper");
        assert_eq!(decode_field(&h, 16, 272).len(), NAME_LEN);
        // Truncated name must not bleed into the size field
        assert_eq!(CommandHeader::decode(&h).unwrap().size, 7);
    }

    #[test]
    fn test_command_header_rejects_long_name() {
        let err = CommandHeader::new(Operation::Upload, "x".repeat(NAME_LEN + 1), 1).unwrap_err();
        assert!(err.is_protocol());
        assert!(CommandHeader::new(Operation::Upload, "a\0b", 1).is_err());
        assert!(CommandHeader::new(Operation::Upload, "x".repeat(NAME_LEN), 1).is_ok());
    }

    #[test]
    fn test_command_header_round_trip() {
        let header = CommandHeader::new(Operation::Download, "docs/readme.md", 0).unwrap();
        let decoded = CommandHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_decode_short_header() {
        let h = encode_header("upload", "a", 1);
        assert!(CommandHeader::decode(&h[..MIN_HEADER_LEN - 1]).is_err());
        assert!(CommandHeader::decode(&h[..MIN_HEADER_LEN]).is_ok());
    }

    #[test]
    fn test_unknown_operation() {
        let h = encode_header("delete", "a", 0);
        let decoded = CommandHeader::decode(&h).unwrap();
        assert_eq!(decoded.operation, Operation::Unknown("delete".to_string()));
        assert_eq!(decoded.operation.to_string(), "delete");
    }

    #[test]
    fn test_decode_field_bounds() {
        let buf = b"abc\0def";
        assert_eq!(decode_field(buf, 0, 7), "abc");
        assert_eq!(decode_field(buf, 4, 7), "def");
        assert_eq!(decode_field(buf, 4, 100), "def");
        assert_eq!(decode_field(buf, 1, 2), "b");
        assert_eq!(decode_field(buf, 3, 7), "");
        assert_eq!(decode_field(buf, 9, 12), "");
    }

    #[test]
    fn test_i64_be_round_trip() {
        for n in [0i64, 1, -1, 1024, i64::MAX, i64::MIN, -2500] {
            assert_eq!(decode_i64_be(encode_i64_be(n)), n);
        }
        assert_eq!(encode_i64_be(1), [0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_search_names_round_trip() {
        let (h, accepted) = pack_search_names(&["x.txt", "y.txt"]);
        assert_eq!(decode_field(&h, 0, 16), "search");
        assert_eq!(accepted, vec!["x.txt", "y.txt"]);
        assert_eq!(&h[16..28], b"x.txt\ny.txt\n");
        assert_eq!(parse_search_names(&h), vec!["x.txt", "y.txt"]);
    }

    #[test]
    fn test_search_names_overflow_dropped() {
        // 100 names of 99 bytes + newline: only (1024 - 16) / 100 = 10 fit
        let names: Vec<String> = (0..100).map(|i| format!("{:099}", i)).collect();
        let (h, accepted) = pack_search_names(&names);
        assert_eq!(accepted.len(), 10);
        assert_eq!(parse_search_names(&h), accepted);
    }

    #[test]
    fn test_parse_search_names_without_trailing_newline() {
        let mut h = [0u8; HEADER_LEN];
        h[..6].copy_from_slice(b"search");
        h[16..27].copy_from_slice(b"a.txt\nb.txt");
        assert_eq!(parse_search_names(&h), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("a.bin").unwrap(), "a.bin");
        assert_eq!(sanitize_file_name("dir/sub/a.bin").unwrap(), "a.bin");
        assert_eq!(sanitize_file_name("..\\..\\evil.exe").unwrap(), "evil.exe");
        assert!(sanitize_file_name("").is_err());
        assert!(sanitize_file_name("..").is_err());
        assert!(sanitize_file_name("dir/").is_err());
    }

    #[test]
    fn test_sanitize_file_name_colon() {
        #[cfg(not(windows))]
        assert_eq!(sanitize_file_name("notes 10:30.txt").unwrap(), "notes 10:30.txt");
        #[cfg(windows)]
        assert!(sanitize_file_name("c:file").is_err());
    }

    #[test]
    fn test_normalize_under_root_safe_paths() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        let result = normalize_under_root(root, "subdir/file.txt").unwrap();
        assert!(result.ends_with("subdir/file.txt"));

        let result = normalize_under_root(root, "./subdir/./file.txt").unwrap();
        assert!(result.ends_with("subdir/file.txt"));

        // Backslash separators are accepted on every platform
        let result = normalize_under_root(root, "subdir\\file.txt").unwrap();
        assert!(result.ends_with("subdir/file.txt"));
    }

    #[test]
    fn test_normalize_under_root_unsafe_paths() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        assert!(normalize_under_root(root, "../etc/passwd").is_err());
        assert!(normalize_under_root(root, "subdir/../../etc/passwd").is_err());
        assert!(normalize_under_root(root, "/etc/passwd").is_err());
        assert!(normalize_under_root(root, "\\windows\\system32").is_err());
        assert!(normalize_under_root(root, "file\0.txt").is_err());
        assert!(normalize_under_root(root, "").is_err());
        assert!(normalize_under_root(root, "./").is_err());
    }

    #[test]
    fn test_normalize_under_root_colon() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        #[cfg(not(windows))]
        {
            let result = normalize_under_root(root, "logs/a:b.txt").unwrap();
            assert!(result.ends_with("logs/a:b.txt"));
        }
        #[cfg(windows)]
        assert!(normalize_under_root(root, "C:\\windows").is_err());
    }

    #[test]
    fn test_normalize_existing_file_is_canonical() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let subdir = root.join("subdir");
        std::fs::create_dir(&subdir).unwrap();
        let file = subdir.join("file.txt");
        std::fs::write(&file, "test").unwrap();

        let result = normalize_under_root(root, "subdir/file.txt").unwrap();
        assert_eq!(result, file.canonicalize().unwrap());
    }

    #[tokio::test]
    async fn test_ensure_parent_exists() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("new").join("nested").join("file.txt");

        assert!(!file_path.parent().unwrap().exists());
        ensure_parent_exists(&file_path).await.unwrap();
        assert!(file_path.parent().unwrap().is_dir());

        // Idempotent
        ensure_parent_exists(&file_path).await.unwrap();
    }
}
