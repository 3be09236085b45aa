use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;

/// File-name-safe capture site name: `<layer>_<base64url(identifier)>`.
pub fn site_name(layer: &str, identifier: &str) -> String {
    format!("{layer}_{}", URL_SAFE.encode(identifier))
}
