//! `.env` loading ahead of `AppConfig::from_env`.

use std::path::Path;

/// Load `path`, or the first `.env` found from the working directory upwards, into the
/// process environment. Variables that are already set win. A missing file is fine.
pub fn load_dotenv(path: Option<&Path>) -> Result<(), dotenvy::Error> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path),
        None => dotenvy::dotenv().map(|_| ()),
    };
    match loaded {
        Err(e) if e.not_found() => Ok(()),
        other => other,
    }
}
