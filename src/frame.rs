//! Call-stack frame detection and prefix extraction.
//!
//! A frame is a trimmed line starting with `at `. Its prefix is the class
//! portion of `package.Class.method(File.java:N)` with the method name and any
//! nested-class or lambda suffix (`$...`) removed.

const FRAME_MARKER: &str = "at ";

/// True if `line`, once trimmed, is a call-stack frame.
pub fn is_frame(line: &str) -> bool {
    line.trim().starts_with(FRAME_MARKER)
}

/// Trimmed frame lines of `text`, in source order. Everything else
/// (exception messages, `Caused by:`, `... N more`) is dropped.
pub fn frames(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| is_frame(line))
}

/// Reduce a frame line to its grouping prefix.
///
/// `at reactor.core.publisher.FluxMapFuseable$MapFuseableSubscriber.onNext(FluxMapFuseable.java:129)`
/// becomes `reactor.core.publisher.FluxMapFuseable`.
///
/// Callers must pass a line accepted by [`is_frame`]. Anything else is sliced
/// past its first three characters and reduced the same way.
pub fn extract_prefix(frame_line: &str) -> String {
    debug_assert!(
        frame_line.starts_with(FRAME_MARKER),
        "not a frame line: {frame_line:?}"
    );

    let body = frame_line
        .strip_prefix(FRAME_MARKER)
        .or_else(|| frame_line.get(FRAME_MARKER.len()..))
        .unwrap_or("");
    let class_and_method = body.split('(').next().unwrap_or("");

    let Some(idx) = class_and_method.rfind('.') else {
        return class_and_method.to_string();
    };
    let full_class = &class_and_method[..idx];

    match full_class.find('$') {
        Some(dollar) => full_class[..dollar].to_string(),
        None => full_class.to_string(),
    }
}
