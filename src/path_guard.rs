//! Write-path confinement for pipelines.
//!
//! Every function here is a predicate or a pure canonicalization; nothing
//! touches the filesystem except [`PathGuard`] when symlink resolution is on,
//! and even then it only reads metadata. Callers must check the answer before
//! writing.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::decision::{Decision, DenialCategory};
use crate::pipeline::{PipelineId, allowed_directories};

static SYSTEM_ROOT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(etc|usr|var|home|root|tmp)(/|$)").unwrap());

static SENSITIVE_SEGMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(node_modules|\.git|\.env(\..+)?|secrets)$").unwrap());

static RESERVED_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(CON|PRN|AUX|NUL|COM[1-9]|LPT[1-9])(\..*)?$").unwrap()
});

static DRIVE_PREFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]:(/|$)").unwrap());

const MAX_FILENAME_LEN: usize = 255;
const ILLEGAL_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/', '\\'];

/// Canonicalize a path string for downstream checks.
///
/// Strips null bytes, converts `\` to `/`, collapses repeated separators and
/// resolves `.`/`..` lexically. Leading `..` segments of a relative path are
/// kept; `..` above an absolute root is dropped. Does not enforce sandboxing.
pub fn sanitize_path(input: &str) -> String {
    let unified: String = input
        .chars()
        .filter(|c| *c != '\0')
        .map(|c| if c == '\\' { '/' } else { c })
        .collect();

    let (root, rest) = split_root(&unified);

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else if root.is_empty() {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    format!("{}{}", root, segments.join("/"))
}

/// Split an already separator-unified path into its root (`/`, `C:/`) and the rest.
fn split_root(path: &str) -> (String, &str) {
    if let Some(rest) = path.strip_prefix('/') {
        return ("/".to_string(), rest);
    }
    if DRIVE_PREFIX_REGEX.is_match(path) {
        let (drive, rest) = path.split_at(2);
        return (format!("{}/", drive.to_uppercase()), rest.trim_start_matches('/'));
    }
    (String::new(), path)
}

fn is_absolute(path: &str) -> bool {
    !split_root(path).0.is_empty()
}

/// Defense-in-depth check, independent of the allow-list.
///
/// Matches absolute system roots, home-relative paths, `..` traversal tokens,
/// and sensitive segments (`node_modules`, `.git`, `.env`, `.env.*`, `secrets`).
pub fn contains_forbidden_pattern(path: &str) -> bool {
    let unified = path.replace('\\', "/");

    if unified.starts_with('~') || SYSTEM_ROOT_REGEX.is_match(&unified) {
        return true;
    }

    unified
        .split('/')
        .any(|segment| segment == ".." || SENSITIVE_SEGMENT_REGEX.is_match(segment))
}

/// Whether a single path segment is a safe, portable file name.
pub fn is_valid_filename(name: &str) -> bool {
    if name.is_empty() || name.chars().count() > MAX_FILENAME_LEN {
        return false;
    }
    if name == "." || name == ".." {
        return false;
    }
    if name
        .chars()
        .any(|c| c.is_control() || ILLEGAL_FILENAME_CHARS.contains(&c))
    {
        return false;
    }
    if name.ends_with(' ') {
        return false;
    }
    !RESERVED_NAME_REGEX.is_match(name)
}

/// The target path relative to the repository root, or `None` when it escapes it.
fn relative_to_root(target: &str, repo_root: &str) -> Option<String> {
    let target = sanitize_path(target);
    let root = sanitize_path(repo_root);

    let relative = if is_absolute(&target) {
        if !is_absolute(&root) {
            return None;
        } else if root == "/" {
            target.trim_start_matches('/').to_string()
        } else {
            target.strip_prefix(&format!("{}/", root))?.to_string()
        }
    } else {
        target
    };

    if relative.is_empty()
        || relative == ".."
        || relative.starts_with("../")
        || is_absolute(&relative)
    {
        return None;
    }
    Some(relative)
}

/// The allowed directory of `pipeline` that strictly contains `relative`.
fn matching_prefix(relative: &str, pipeline: PipelineId) -> Option<&'static str> {
    allowed_directories(pipeline)
        .iter()
        .copied()
        .find(|prefix| relative.len() > prefix.len() && relative.starts_with(prefix))
}

/// Whether `target` may be written by `pipeline`.
///
/// The target is normalized lexically and must be a strict descendant of one of
/// the pipeline's allowed directories. A path that resolves into another
/// pipeline's tree is rejected even though it is inside the repository.
/// Symbolic links are not followed; use [`PathGuard`] for that.
pub fn is_path_allowed(target: &str, pipeline: PipelineId, repo_root: &str) -> bool {
    relative_to_root(target, repo_root)
        .is_some_and(|rel| matching_prefix(&rel, pipeline).is_some())
}

/// Full pre-write check with a structured answer.
///
/// Order: null bytes, containment, traversal tokens and sensitive segments,
/// then validity of the final file name.
pub fn check_write(target: &str, pipeline: PipelineId, repo_root: &str) -> Decision {
    if target.contains('\0') {
        return Decision::deny(
            DenialCategory::ForbiddenPathPattern,
            format!("Path {:?} contains a null byte", target.replace('\0', "\\0")),
        );
    }

    let Some(relative) = relative_to_root(target, repo_root) else {
        return outside_sandbox(target, pipeline);
    };
    if matching_prefix(&relative, pipeline).is_none() {
        return outside_sandbox(target, pipeline);
    }

    let raw = target.replace('\\', "/");
    let raw_relative = raw.strip_prefix(repo_root).unwrap_or(&raw);
    if contains_forbidden_pattern(raw_relative) || contains_forbidden_pattern(&relative) {
        return Decision::deny(
            DenialCategory::ForbiddenPathPattern,
            format!(
                "Path '{}' contains a traversal token or a sensitive segment",
                target
            ),
        )
        .with_remediation(format!("write to '{}' directly", relative));
    }

    let file_name = relative.rsplit('/').next().unwrap_or_default();
    if !is_valid_filename(file_name) {
        return Decision::deny(
            DenialCategory::InvalidFilename,
            format!("'{}' is not a portable file name", file_name),
        )
        .with_remediation("avoid reserved device names, control characters, <>:\"|?* and trailing spaces");
    }

    Decision::allow(format!("'{}' is inside the {} sandbox", relative, pipeline))
}

fn outside_sandbox(target: &str, pipeline: PipelineId) -> Decision {
    Decision::deny(
        DenialCategory::PathOutsideSandbox,
        format!(
            "Path '{}' does not resolve beneath any directory allowed for {}",
            target, pipeline
        ),
    )
    .with_remediation(format!(
        "write beneath one of: {}",
        allowed_directories(pipeline).join(", ")
    ))
}

/// Path checks bound to one repository root, optionally following symlinks.
///
/// With symlink resolution enabled, the longest existing ancestor of the target
/// is canonicalized on disk before the containment test, so a link planted
/// inside an allowed directory cannot redirect a write elsewhere.
#[derive(Debug, Clone)]
pub struct PathGuard {
    repo_root: PathBuf,
    resolve_symlinks: bool,
}

impl PathGuard {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            resolve_symlinks: false,
        }
    }

    pub fn with_symlink_resolution(mut self, enabled: bool) -> Self {
        self.resolve_symlinks = enabled;
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn is_path_allowed(&self, target: &str, pipeline: PipelineId) -> bool {
        self.check_write(target, pipeline).allowed
    }

    pub fn check_write(&self, target: &str, pipeline: PipelineId) -> Decision {
        let root = self.repo_root.to_string_lossy();
        let decision = check_write(target, pipeline, &root);
        if !decision.allowed || !self.resolve_symlinks {
            log_decision(target, pipeline, &decision);
            return decision;
        }

        let decision = match self.resolved_relative(target) {
            Ok(Some(rel)) if matching_prefix(&rel, pipeline).is_some() => decision,
            Ok(_) => Decision::deny(
                DenialCategory::PathOutsideSandbox,
                format!(
                    "Path '{}' follows a symbolic link out of the {} sandbox",
                    target, pipeline
                ),
            )
            .with_remediation("remove the symbolic link or write to a real directory"),
            Err(e) => Decision::deny(
                DenialCategory::PathOutsideSandbox,
                format!("Cannot resolve '{}' on disk: {}", target, e),
            ),
        };
        log_decision(target, pipeline, &decision);
        decision
    }

    /// The on-disk location of `target` relative to the canonical root.
    fn resolved_relative(&self, target: &str) -> std::io::Result<Option<String>> {
        let root = self.repo_root.canonicalize()?;
        let sanitized = sanitize_path(target);
        let lexical = if is_absolute(&sanitized) {
            PathBuf::from(&sanitized)
        } else {
            self.repo_root.join(&sanitized)
        };

        // symlink_metadata does not follow links, so a dangling link stops the walk.
        let mut existing = lexical.as_path();
        let mut remainder = Vec::new();
        while existing.symlink_metadata().is_err() {
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    remainder.push(name.to_os_string());
                    existing = parent;
                }
                _ => break,
            }
        }

        let mut resolved = match existing.canonicalize() {
            Ok(path) => path,
            Err(e) if existing.is_symlink() => {
                return Err(std::io::Error::new(
                    e.kind(),
                    format!("dangling symbolic link at {}", existing.display()),
                ));
            }
            Err(e) => return Err(e),
        };
        for name in remainder.into_iter().rev() {
            resolved.push(name);
        }

        Ok(resolved
            .strip_prefix(&root)
            .ok()
            .map(|rel| rel.to_string_lossy().replace('\\', "/")))
    }
}

fn log_decision(target: &str, pipeline: PipelineId, decision: &Decision) {
    if decision.allowed {
        tracing::debug!(%target, %pipeline, "write permitted");
    } else {
        tracing::warn!(
            %target,
            %pipeline,
            category = ?decision.category,
            reason = %decision.reason,
            "write denied"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const ROOT: &str = "/srv/factory";

    // =========================================
    // sanitize_path
    // =========================================

    #[test]
    fn test_sanitize_normalizes_separators_and_dots() {
        assert_eq!(sanitize_path("a\\b\\\\c"), "a/b/c");
        assert_eq!(sanitize_path("a//b/./c/"), "a/b/c");
        assert_eq!(sanitize_path("a/b/../c"), "a/c");
        assert_eq!(sanitize_path("a\0/b"), "a/b");
    }

    #[test]
    fn test_sanitize_keeps_leading_parent_segments() {
        assert_eq!(sanitize_path("../x"), "../x");
        assert_eq!(sanitize_path("a/../../x"), "../x");
        assert_eq!(sanitize_path("/a/../../x"), "/x");
    }

    #[test]
    fn test_sanitize_drive_letters() {
        assert_eq!(sanitize_path("c:\\repo\\..\\x"), "C:/x");
        assert_eq!(sanitize_path(""), "");
    }

    // =========================================
    // contains_forbidden_pattern
    // =========================================

    #[test]
    fn test_forbidden_system_roots() {
        for p in ["/etc/passwd", "/usr/bin/x", "/var/log", "/home/u", "/root", "/tmp/x", "~/x"] {
            assert!(contains_forbidden_pattern(p), "{p}");
        }
        assert!(!contains_forbidden_pattern("/etcetera/x"));
    }

    #[test]
    fn test_forbidden_segments() {
        for p in [
            "a/../b",
            "app/node_modules/x",
            ".git/config",
            "build/.env",
            "build/.env.production",
            "x\\secrets\\key",
        ] {
            assert!(contains_forbidden_pattern(p), "{p}");
        }
        assert!(!contains_forbidden_pattern("app-factory/builds/env/x"));
        assert!(!contains_forbidden_pattern("app-factory/builds/.environment"));
    }

    // =========================================
    // is_valid_filename
    // =========================================

    #[test]
    fn test_valid_filenames() {
        assert!(is_valid_filename("index.ts"));
        assert!(is_valid_filename(".gitkeep"));
        assert!(is_valid_filename("CONTRACT.md"));
        assert!(is_valid_filename(&"a".repeat(255)));
    }

    #[test]
    fn test_invalid_filenames() {
        assert!(!is_valid_filename(""));
        assert!(!is_valid_filename(&"a".repeat(256)));
        assert!(!is_valid_filename("bad\u{7}name"));
        assert!(!is_valid_filename("tab\tname"));
        for c in ['<', '>', ':', '"', '|', '?', '*'] {
            assert!(!is_valid_filename(&format!("a{c}b")), "{c}");
        }
        assert!(!is_valid_filename("trailing "));
        assert!(!is_valid_filename(".."));
    }

    #[test]
    fn test_reserved_device_names() {
        for name in ["CON", "prn", "Aux", "nul.txt", "COM1", "com9.log", "LPT1", "lpt5.tar.gz"] {
            assert!(!is_valid_filename(name), "{name}");
        }
        assert!(is_valid_filename("COM10"));
        assert!(is_valid_filename("console.log"));
    }

    // =========================================
    // is_path_allowed
    // =========================================

    #[test]
    fn test_allowed_absolute_and_relative() {
        assert!(is_path_allowed(
            "/srv/factory/app-factory/builds/x/App.tsx",
            PipelineId::AppFactory,
            ROOT
        ));
        assert!(is_path_allowed(
            "app-factory/outputs/report.md",
            PipelineId::AppFactory,
            ROOT
        ));
    }

    #[test]
    fn test_cross_pipeline_traversal_is_denied() {
        let target = format!("{ROOT}/app-factory/builds/x/../../../dapp-factory/dapp-builds/y");
        assert!(!is_path_allowed(&target, PipelineId::AppFactory, ROOT));
        // The same location is legitimately dapp-factory's.
        assert!(is_path_allowed(&target, PipelineId::DappFactory, ROOT));
    }

    #[test]
    fn test_two_parent_segments_stay_in_own_tree() {
        // Resolves to app-factory/dapp-factory/dapp-builds/y, which neither pipeline owns.
        let target = format!("{ROOT}/app-factory/builds/x/../../dapp-factory/dapp-builds/y");
        assert!(!is_path_allowed(&target, PipelineId::AppFactory, ROOT));
        assert!(!is_path_allowed(&target, PipelineId::DappFactory, ROOT));
        let d = check_write(&target, PipelineId::AppFactory, ROOT);
        assert!(d.is_denied_with(DenialCategory::PathOutsideSandbox));
    }

    #[test]
    fn test_absolute_target_with_relative_root_is_denied() {
        for root in [".", "", "repo"] {
            assert!(
                !is_path_allowed("/app-factory/builds/x.txt", PipelineId::AppFactory, root),
                "{root:?}"
            );
            let d = check_write("/app-factory/builds/x.txt", PipelineId::AppFactory, root);
            assert!(d.is_denied_with(DenialCategory::PathOutsideSandbox), "{root:?}");
        }
        assert!(is_path_allowed("app-factory/builds/x.txt", PipelineId::AppFactory, "."));
    }

    #[test]
    fn test_parent_segments_are_denied_for_every_pipeline() {
        for pipeline in PipelineId::ALL {
            for target in ["../x", "../../etc/passwd", "app-factory/../../x", "/srv/other/x"] {
                assert!(!is_path_allowed(target, pipeline, ROOT), "{target}");
            }
        }
    }

    #[test]
    fn test_allowed_directory_itself_is_not_a_descendant() {
        assert!(!is_path_allowed("app-factory/builds", PipelineId::AppFactory, ROOT));
        assert!(!is_path_allowed("app-factory/builds/", PipelineId::AppFactory, ROOT));
        assert!(!is_path_allowed("app-factory/buildsx/y", PipelineId::AppFactory, ROOT));
    }

    #[test]
    fn test_other_pipeline_tree_is_denied() {
        for a in PipelineId::ALL {
            for b in PipelineId::ALL {
                if a == b {
                    continue;
                }
                for dir in allowed_directories(b) {
                    let target = format!("{dir}file.txt");
                    assert!(!is_path_allowed(&target, a, ROOT), "{a} -> {target}");
                }
            }
        }
    }

    // =========================================
    // check_write
    // =========================================

    #[test]
    fn test_check_write_categories() {
        let outside = check_write("src/main.rs", PipelineId::AppFactory, ROOT);
        assert!(outside.is_denied_with(DenialCategory::PathOutsideSandbox));
        assert!(outside.remediation.unwrap().contains("app-factory/builds/"));

        let dotdot = check_write("app-factory/builds/a/../b.txt", PipelineId::AppFactory, ROOT);
        assert!(dotdot.is_denied_with(DenialCategory::ForbiddenPathPattern));

        let env = check_write("app-factory/builds/.env", PipelineId::AppFactory, ROOT);
        assert!(env.is_denied_with(DenialCategory::ForbiddenPathPattern));

        let reserved = check_write("app-factory/builds/NUL.txt", PipelineId::AppFactory, ROOT);
        assert!(reserved.is_denied_with(DenialCategory::InvalidFilename));

        let null = check_write("app-factory/builds/a\0b", PipelineId::AppFactory, ROOT);
        assert!(null.is_denied_with(DenialCategory::ForbiddenPathPattern));

        let ok = check_write("/srv/factory/app-factory/builds/ok.txt", PipelineId::AppFactory, ROOT);
        assert!(ok.allowed, "{:?}", ok);
    }

    #[test]
    fn test_check_write_under_system_root_repo() {
        // A repository living under /home must not trip the system-root pattern.
        let d = check_write(
            "/home/dev/repo/website-pipeline/generated/index.html",
            PipelineId::WebsitePipeline,
            "/home/dev/repo",
        );
        assert!(d.allowed, "{:?}", d);
    }

    // =========================================
    // PathGuard with symlink resolution
    // =========================================

    #[test]
    fn test_guard_allows_new_file_in_real_directory() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app-factory/builds")).unwrap();
        let guard = PathGuard::new(dir.path()).with_symlink_resolution(true);
        assert!(guard.is_path_allowed("app-factory/builds/new/dir/file.ts", PipelineId::AppFactory));
    }

    #[cfg(unix)]
    #[test]
    fn test_guard_denies_symlink_escape() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app-factory/builds")).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("app-factory/builds/link"))
            .unwrap();

        let lexical = PathGuard::new(dir.path());
        assert!(lexical.is_path_allowed("app-factory/builds/link/x.txt", PipelineId::AppFactory));

        let guard = PathGuard::new(dir.path()).with_symlink_resolution(true);
        let d = guard.check_write("app-factory/builds/link/x.txt", PipelineId::AppFactory);
        assert!(d.is_denied_with(DenialCategory::PathOutsideSandbox));
        assert!(d.reason.contains("symbolic link"));
    }

    #[cfg(unix)]
    #[test]
    fn test_guard_denies_dangling_symlink() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app-factory/builds")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("pwned.txt"),
            dir.path().join("app-factory/builds/out.txt"),
        )
        .unwrap();

        let guard = PathGuard::new(dir.path()).with_symlink_resolution(true);
        let d = guard.check_write("app-factory/builds/out.txt", PipelineId::AppFactory);
        assert!(d.is_denied_with(DenialCategory::PathOutsideSandbox), "{:?}", d);
        assert!(d.reason.contains("symbolic link"));

        // A dangling link as an intermediate directory is refused the same way.
        std::os::unix::fs::symlink(
            outside.path().join("missing"),
            dir.path().join("app-factory/builds/gone"),
        )
        .unwrap();
        assert!(!guard.is_path_allowed("app-factory/builds/gone/x.txt", PipelineId::AppFactory));
    }

    #[cfg(unix)]
    #[test]
    fn test_guard_denies_symlink_into_other_pipeline() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app-factory/builds")).unwrap();
        fs::create_dir_all(dir.path().join("dapp-factory/dapp-builds")).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("dapp-factory/dapp-builds"),
            dir.path().join("app-factory/builds/shared"),
        )
        .unwrap();

        let guard = PathGuard::new(dir.path()).with_symlink_resolution(true);
        assert!(!guard.is_path_allowed("app-factory/builds/shared/x", PipelineId::AppFactory));
    }
}
