//! Crash fingerprinting.
//!
//! Derives a stable 16-hex-digit group key from an error kind and its
//! normalized stack frames, so the same root cause collapses to one group
//! across app versions, line-number churn, and per-build synthetic names.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use crate::models::{Crash, StackFrame};

/// Stop walking non-native frames after this many contribute to the hash.
const MAX_FRAMES: usize = 5;

static GENERIC_PARAMS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^<>]*>").unwrap());
static ANON_CLASS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$(\d+|anon\w*)").unwrap());
static CLOSURE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_closure\d*|\$\d+|_\d+$").unwrap());
static BUILD_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[0-9a-f]{8,}\.(js|dart|ts)$").unwrap());

/// Normalizes a class/type name for fingerprinting: strips generic
/// parameters and anonymous-class synthetic markers.
///
/// Generic brackets are stripped innermost-first until none remain, since
/// nested generics (`Map<String, Foo<Bar>>`) need more than one pass of a
/// non-nesting `<...>` pattern.
fn normalize_class(class: &str) -> String {
    let mut stripped = class.to_string();
    loop {
        let next = GENERIC_PARAMS.replace_all(&stripped, "").into_owned();
        if next == stripped {
            break;
        }
        stripped = next;
    }
    ANON_CLASS.replace_all(&stripped, "").into_owned()
}

/// Normalizes a method name: strips closure/lambda synthetic markers and a
/// trailing `_async` suffix left over from language-level desugaring.
fn normalize_method(method: &str) -> String {
    let no_closure = CLOSURE_MARKER.replace_all(method, "");
    no_closure.strip_suffix("_async").unwrap_or(&no_closure).to_string()
}

/// Normalizes a file name: keeps only the last path segment, drops any
/// query/fragment suffix, and collapses a per-build content hash.
fn normalize_file(file: &str) -> String {
    let last_segment = file
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file);
    let truncated = last_segment
        .split(['?', '#'])
        .next()
        .unwrap_or(last_segment);
    BUILD_HASH.replace(truncated, ".$1").into_owned()
}

/// Builds the `class:method:file` segment fed into the hasher for one
/// frame, omitting empty components but always keeping the colons absent
/// (the components themselves, not separators, are what's skipped).
fn normalize_frame(frame: &StackFrame) -> String {
    let class = frame
        .class_name
        .as_deref()
        .map(normalize_class)
        .filter(|s| !s.is_empty());
    let method = normalize_method(&frame.method_name);
    let method = if method.is_empty() { None } else { Some(method) };
    let file = normalize_file(&frame.file_name);
    let file = if file.is_empty() { None } else { Some(file) };

    [class, method, file]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(":")
}

/// Computes the 16-hex-character fingerprint for a crash.
///
/// Deterministic in the error kind and the normalized forms of up to the
/// first five non-native stack frames. See module docs for the rationale
/// behind each normalization rule.
pub fn fingerprint(crash: &Crash) -> String {
    fingerprint_of(&crash.error_type, &crash.stack_trace)
}

/// Computes a fingerprint directly from an error kind and frame list,
/// without requiring a fully materialized [`Crash`].
pub fn fingerprint_of(error_type: &str, frames: &[StackFrame]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(error_type.as_bytes());
    hasher.update(b"|");

    frames
        .iter()
        .filter(|f| !f.native)
        .take(MAX_FRAMES)
        .for_each(|frame| {
            hasher.update(normalize_frame(frame).as_bytes());
            hasher.update(b"|");
        });

    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(file: &str, line: u32, method: &str, native: bool) -> StackFrame {
        StackFrame {
            file_name: file.to_string(),
            line_number: line,
            column_number: None,
            method_name: method.to_string(),
            class_name: None,
            native,
        }
    }

    #[test]
    fn deterministic_and_16_hex_chars() {
        let frames = vec![frame("a.dart", 10, "parse", false)];
        let a = fingerprint_of("FormatException", &frames);
        let b = fingerprint_of("FormatException", &frames);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn native_frames_are_invisible() {
        let without_native = vec![frame("a.dart", 1, "m", false)];
        let with_native_before = vec![
            frame("dart:async", 0, "run", true),
            frame("a.dart", 1, "m", false),
        ];
        let with_native_after = vec![
            frame("a.dart", 1, "m", false),
            frame("dart:async", 0, "run", true),
        ];
        let base = fingerprint_of("E", &without_native);
        assert_eq!(base, fingerprint_of("E", &with_native_before));
        assert_eq!(base, fingerprint_of("E", &with_native_after));
    }

    #[test]
    fn line_and_column_are_ignored() {
        let f1 = vec![frame("a.dart", 10, "parse", false)];
        let f2 = vec![frame("a.dart", 99, "parse", false)];
        assert_eq!(fingerprint_of("E", &f1), fingerprint_of("E", &f2));
    }

    #[test]
    fn build_hash_in_file_name_is_collapsed() {
        let f1 = vec![frame("foo.ab12cd34.dart", 1, "m", false)];
        let f2 = vec![frame("foo.ffffffff.dart", 1, "m", false)];
        assert_eq!(fingerprint_of("E", &f1), fingerprint_of("E", &f2));
    }

    #[test]
    fn different_error_kinds_never_merge() {
        let frames = vec![frame("a.dart", 1, "m", false)];
        assert_ne!(fingerprint_of("A", &frames), fingerprint_of("B", &frames));
    }

    #[test]
    fn all_native_frames_still_produces_a_fingerprint() {
        let frames = vec![frame("dart:async", 0, "run", true)];
        let fp = fingerprint_of("E", &frames);
        assert_eq!(fp.len(), 16);
        assert_eq!(fp, fingerprint_of("E", &[]));
    }

    #[test]
    fn only_first_five_non_native_frames_contribute() {
        let mut six = vec![];
        for i in 0..6 {
            six.push(frame(&format!("f{i}.dart"), i, "m", false));
        }
        let five = six[..5].to_vec();
        assert_eq!(fingerprint_of("E", &five), fingerprint_of("E", &six));
    }

    #[test]
    fn generic_parameters_are_stripped_from_class() {
        assert_eq!(normalize_class("List<String>"), "List");
        assert_eq!(normalize_class("Map<String, Foo<Bar>>"), "Map");
    }

    #[test]
    fn anonymous_class_markers_are_stripped() {
        assert_eq!(normalize_class("MyClass$1"), "MyClass");
        assert_eq!(normalize_class("MyClass$anon42"), "MyClass");
    }

    #[test]
    fn closure_markers_are_stripped_from_method() {
        assert_eq!(normalize_method("onTap_closure0"), "onTap");
        assert_eq!(normalize_method("lambda$1"), "lambda");
        assert_eq!(normalize_method("handler_7"), "handler");
        assert_eq!(normalize_method("fetchData_async"), "fetchData");
    }

    #[test]
    fn file_name_keeps_last_segment_and_strips_query() {
        assert_eq!(normalize_file("/src/app/foo.dart"), "foo.dart");
        assert_eq!(normalize_file("C:\\src\\foo.dart"), "foo.dart");
        assert_eq!(normalize_file("bundle.js?v=3"), "bundle.js");
        assert_eq!(normalize_file("bundle.js#frag"), "bundle.js");
    }
}
