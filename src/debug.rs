use std::env;
use std::sync::OnceLock;

static GC_DEBUG_ENABLED: OnceLock<bool> = OnceLock::new();

/// Print the message to stderr when the GC_DEBUG environment variable is
/// set. The environment check is cached on first call.
#[inline]
pub(crate) fn gc_debug(msg: &str) {
    let enabled = *GC_DEBUG_ENABLED.get_or_init(|| env::var("GC_DEBUG").is_ok());
    if enabled {
        eprintln!("GC_DEBUG: {}", msg);
    }
}
