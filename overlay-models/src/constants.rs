// Constants for the overlay modules
// This file contains global constants used across the application

/// The default configuration file name for the application.
/// This constant is used to specify the default configuration file
/// that the application will attempt to load at startup.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "overlay.toml";

/// Prefix for environment overrides, e.g. `OV__WEB__PORT=8090`.
pub const ENV_PREFIX: &str = "OV";

pub const DATA_DIR: &str = "./data";
pub const LOG_DIR: &str = "./logs";

/// Route under which overlay assets are served.
pub const ASSET_ROUTE: &str = "/files/overlays";

/// Sort applied when resolving the active overlay.
pub const ACTIVE_SORT: &str = "-updated,-id";

pub const LOADING_MESSAGE: &str = "Loading overlay…";
pub const INACTIVE_MESSAGE: &str = "No active overlay";
pub const MISSING_IMAGE_MESSAGE: &str = "Overlay image is missing";

pub const MAX_DESCRIPTION_LEN: usize = 256;
pub const ALLOWED_IMAGE_MIMES: [&str; 2] = ["image/png", "image/gif"];

/// Leading bytes of every PNG file.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];
/// Leading bytes of GIF files, both revisions.
pub const GIF_SIGNATURES: [&[u8]; 2] = [b"GIF87a", b"GIF89a"];
