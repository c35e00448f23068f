use std::error::Error;
use std::fs::OpenOptions;
use std::path::PathBuf;

/// Uses the explicit DSN, or a sqlite file under `<data_dir>/db/`.
/// Sqlite files are created up front so the driver can open them.
pub(crate) fn resolve_dsn(
    input: Option<&str>,
    data_dir: &str,
) -> Result<String, Box<dyn Error + Send + Sync>> {
    if let Some(input) = input.map(str::trim).filter(|input| !input.is_empty()) {
        ensure_sqlite_file(input)?;
        return Ok(input.to_string());
    }

    let db_path = PathBuf::from(data_dir).join("db").join("chatgate.db");
    let db_path = db_path.to_string_lossy();
    let dsn = match db_path.strip_prefix('/') {
        Some(absolute) => format!("sqlite:///{absolute}"),
        None => format!("sqlite://{db_path}"),
    };
    ensure_sqlite_file(&dsn)?;
    Ok(dsn)
}

fn sqlite_path(dsn: &str) -> Option<PathBuf> {
    let rest = dsn.strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    if rest.starts_with(":memory:") || rest.starts_with("memory:") {
        return None;
    }
    let path = rest.split(['?', '#']).next()?.trim();
    if path.is_empty() {
        return None;
    }
    Some(PathBuf::from(path))
}

fn ensure_sqlite_file(dsn: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let Some(path) = sqlite_path(dsn) else {
        return Ok(());
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        OpenOptions::new().create(true).truncate(false).write(true).open(&path)?;
    }
    Ok(())
}
