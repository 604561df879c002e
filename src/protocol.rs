//! Shared protocol constants for the ftpx fixed-header transport

// Command header layout (all offsets in bytes)
pub const HEADER_LEN: usize = 1024;
pub const OPERATION_OFFSET: usize = 0;
pub const OPERATION_LEN: usize = 16;
pub const NAME_OFFSET: usize = OPERATION_OFFSET + OPERATION_LEN; // 16
pub const NAME_LEN: usize = 256;
pub const SIZE_OFFSET: usize = NAME_OFFSET + NAME_LEN; // 272
pub const SIZE_LEN: usize = 8;

// A header shorter than operation + name + size is rejected
pub const MIN_HEADER_LEN: usize = SIZE_OFFSET + SIZE_LEN; // 280

// File bodies move in fixed 1024-byte chunks
pub const CHUNK_SIZE: usize = 1024;

pub const DEFAULT_PORT: u16 = 1263;

// Upper bound for list/search responses read to EOF by the client
pub const MAX_RESPONSE_LEN: usize = 16 * 1024 * 1024;

// Operation tags as they appear on the wire
pub mod op {
    pub const UPLOAD: &str = "upload";
    pub const DOWNLOAD: &str = "download";
    pub const SHOW: &str = "show";
    pub const SEARCH: &str = "search";
}

// Centralized timeout constants
pub mod timeouts {
    // Default deadline for any single connection read or write (ms)
    pub const IO_MS: u64 = 30_000;

    // Connection establishment timeout (ms)
    pub const CONNECT_MS: u64 = 5_000;
}
