use std::path::Path;

/// 1-based number of the first line in `path` containing `needle`.
pub fn find_line(path: &Path, needle: &str) -> Result<u32, String> {
    let needle = needle.trim();
    if needle.is_empty() {
        return Err("Breakpoint search string must not be empty".to_string());
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {e}", path.display()))?;

    contents
        .lines()
        .position(|line| line.contains(needle))
        .map(|index| index as u32 + 1)
        .ok_or_else(|| format!("'{needle}' not found in {}", path.display()))
}
