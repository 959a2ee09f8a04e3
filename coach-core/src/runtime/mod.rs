use std::path::{Path, PathBuf};

#[cfg(target_os = "macos")]
const ORT_LIB: &str = "libonnxruntime.dylib";
#[cfg(target_os = "windows")]
const ORT_LIB: &str = "onnxruntime.dll";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const ORT_LIB: &str = "libonnxruntime.so";

/// Resolve and set ORT_DYLIB_PATH at runtime when it is missing or invalid.
///
/// Priority order:
/// 1) Existing ORT_DYLIB_PATH (if file exists)
/// 2) models/onnxruntime*/lib/<ort library> near current exe/cwd
/// 3) the platform's usual system library directories
///
/// Returns the library path in use, if one was found.
pub fn configure_ort_dylib() -> Option<PathBuf> {
    if let Some(existing) = std::env::var_os("ORT_DYLIB_PATH") {
        let existing_path = PathBuf::from(existing);
        if existing_path.is_file() {
            tracing::info!(path = %existing_path.display(), "using ORT_DYLIB_PATH from environment");
            return Some(existing_path);
        }
        tracing::warn!(
            path = %existing_path.display(),
            "ORT_DYLIB_PATH is set but file does not exist; attempting auto-discovery"
        );
    }

    let roots = search_roots();
    if let Some(found) = find_ort_library(&roots) {
        // Called once from the CLI before any ORT session exists and before
        // other threads are spawned.
        std::env::set_var("ORT_DYLIB_PATH", &found);
        tracing::info!(path = %found.display(), "configured ORT_DYLIB_PATH");
        return Some(found);
    }

    tracing::warn!(
        library = ORT_LIB,
        "could not locate the ONNX Runtime library; set ORT_DYLIB_PATH to an ONNX Runtime build"
    );
    None
}

fn search_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }

    if let Ok(exe) = std::env::current_exe() {
        let mut dir = exe.parent().map(Path::to_path_buf);
        for _ in 0..5 {
            let Some(d) = dir else {
                break;
            };
            roots.push(d.clone());
            dir = d.parent().map(Path::to_path_buf);
        }
    }
    roots
}

/// First existing library file among the candidates for `roots`.
fn find_ort_library(roots: &[PathBuf]) -> Option<PathBuf> {
    ort_candidates(roots).into_iter().find(|c| c.is_file())
}

fn ort_candidates(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    for root in roots {
        candidates.push(root.join("models/onnxruntime/lib").join(ORT_LIB));
        candidates.push(root.join("models").join(ORT_LIB));
        candidates.push(root.join(ORT_LIB));
    }

    if cfg!(target_os = "macos") {
        candidates.push(PathBuf::from("/opt/homebrew/lib").join(ORT_LIB));
    } else if cfg!(not(target_os = "windows")) {
        candidates.push(PathBuf::from("/usr/local/lib").join(ORT_LIB));
        candidates.push(PathBuf::from("/usr/lib").join(ORT_LIB));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_library_under_models() {
        let dir = tempfile::tempdir().unwrap();
        let lib_dir = dir.path().join("models/onnxruntime/lib");
        std::fs::create_dir_all(&lib_dir).unwrap();
        std::fs::write(lib_dir.join(ORT_LIB), b"").unwrap();

        let found = find_ort_library(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(found, lib_dir.join(ORT_LIB));
    }

    #[test]
    fn test_project_candidates_come_first() {
        let root = PathBuf::from("/srv/coach");
        let candidates = ort_candidates(&[root.clone()]);
        assert!(candidates[0].starts_with(&root));
        assert!(candidates.iter().all(|c| c.ends_with(ORT_LIB)));
    }
}
