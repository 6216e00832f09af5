//! Built-in counter sources.

mod hardware;
pub mod intel;
mod software;

/// `event=0x.. umask=0x..` for raw Intel selectors.
pub(crate) fn format_event_umask(config: u64) -> String {
    let event = config & 0xff;
    let umask = (config >> 8) & 0xff;
    let rest = config >> 16;

    if rest == 0 {
        format!("event=0x{event:02x} umask=0x{umask:02x}")
    } else {
        format!("event=0x{event:02x} umask=0x{umask:02x} config=0x{rest:x}")
    }
}
