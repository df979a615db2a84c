use std::net::TcpListener;
use std::sync::atomic::{AtomicU16, Ordering};

const FIRST_PORT: u16 = 9322;

static CDP_PORT_COUNTER: AtomicU16 = AtomicU16::new(FIRST_PORT);

/// Allocate the next free CDP remote-debugging port.
/// Walks upward from 9322, wrapping at 65500, and skips ports already bound locally.
pub fn allocate_cdp_port() -> u16 {
    loop {
        let port = next_port();
        if TcpListener::bind(("127.0.0.1", port)).is_ok() {
            return port;
        }
        tracing::debug!("CDP port {} is busy, trying next", port);
    }
}

fn next_port() -> u16 {
    let port = CDP_PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
    if port > 65500 {
        CDP_PORT_COUNTER.store(FIRST_PORT + 1, Ordering::SeqCst);
        return FIRST_PORT;
    }
    port
}
