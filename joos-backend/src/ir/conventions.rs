//! Reserved names shared by the IR producer, the tiler and the emitter.

/// Temporary that holds a call's result after the call returns.
pub const RETURN_TEMP: &str = "_RET";

/// Prefix of positional argument temporaries: `_ARG0`, `_ARG1`, ...
pub const ARG_PREFIX: &str = "_ARG";

/// Runtime allocation routine; takes its single argument in the accumulator.
pub const MALLOC: &str = "__malloc";

/// Runtime trap: null dereference, bounds failure, division by zero.
pub const EXCEPTION: &str = "__exception";

/// Process entry symbol of the startup artifact.
pub const START_LABEL: &str = "_start";

/// Symbols every artifact imports whether or not it calls them.
pub const RUNTIME_SYMBOLS: [&str; 2] = [EXCEPTION, MALLOC];

pub fn arg_temp(index: usize) -> String {
    format!("{ARG_PREFIX}{index}")
}

/// Position of an argument temporary, or `None` for any other name.
pub fn arg_index(name: &str) -> Option<usize> {
    name.strip_prefix(ARG_PREFIX)?.parse().ok()
}

pub fn is_return_temp(name: &str) -> bool {
    name == RETURN_TEMP
}
