pub(crate) fn resolve_data_dir(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(dir) if !dir.is_empty() => dir.to_string(),
        _ => "./data".to_string(),
    }
}
