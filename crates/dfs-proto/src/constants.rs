/// Distributed file system protocol and system constants.

/// Well-known port of the naming server's client service interface.
pub const SERVICE_PORT: u16 = 6000;
/// Well-known port of the naming server's storage registration interface.
pub const REGISTRATION_PORT: u16 = 6001;

/// Maximum frame size (64 MB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Path component separator.
pub const PATH_SEPARATOR: char = '/';
/// Reserved delimiter; may not appear in any path component.
pub const PATH_DELIMITER: char = ':';
