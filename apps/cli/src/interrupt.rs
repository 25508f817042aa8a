use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit code used when a second interrupt arrives before the run winds down.
const FORCED_EXIT_CODE: i32 = 130;

/// Sets the flag and reports whether this was the first interrupt.
fn request_cancel(flag: &AtomicBool) -> bool {
    !flag.swap(true, Ordering::SeqCst)
}

/// Installs a Ctrl+C handler that asks the pipeline to stop between files.
/// A second Ctrl+C exits immediately.
pub fn cancel_on_interrupt() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        if request_cancel(&flag) {
            log::warn!("interrupt received, stopping after the current file");
        } else {
            log::warn!("second interrupt, exiting");
            std::process::exit(FORCED_EXIT_CODE);
        }
    })?;
    Ok(cancel)
}
