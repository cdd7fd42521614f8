//! Process-relative monotonic clock, nanosecond sleep, and best-effort CPU
//! pinning — the small OS-facing helpers the timing pipeline needs.

use std::time::Instant;

use once_cell::sync::OnceCell;

static START: OnceCell<Instant> = OnceCell::new();

/// Nanoseconds since this process's first call to [`now_ns`]. The absolute
/// epoch doesn't matter anywhere in the spec (only differences and
/// comparisons against `expire_time` do), so a process-relative monotonic
/// clock is sufficient and avoids depending on wall-clock time.
pub fn now_ns() -> u64 {
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}

/// Sleeps for approximately `ns` nanoseconds, or returns immediately if
/// `ns` is zero.
pub fn sleep_ns(ns: u64) {
    if ns > 0 {
        std::thread::sleep(std::time::Duration::from_nanos(ns));
    }
}

/// Pins the calling thread to a single CPU. Best-effort: a platform or
/// permission failure is reported to the caller (who logs and continues
/// unpinned) rather than treated as fatal, per the spec's "CPU affinity is
/// best-effort" design note.
#[cfg(target_os = "linux")]
pub fn pin_to_cpu(cpu: usize) -> bool {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        let size = std::mem::size_of::<libc::cpu_set_t>();
        let bits_per_word = 8 * std::mem::size_of::<libc::c_ulong>();
        if cpu >= size * 8 {
            return false;
        }
        let words = set_words_mut(&mut set);
        words[cpu / bits_per_word] |= 1 << (cpu % bits_per_word);
        libc::sched_setaffinity(0, size, &set) == 0
    }
}

#[cfg(target_os = "linux")]
unsafe fn set_words_mut(set: &mut libc::cpu_set_t) -> &mut [libc::c_ulong] {
    let ptr = set as *mut libc::cpu_set_t as *mut libc::c_ulong;
    let words = std::mem::size_of::<libc::cpu_set_t>() / std::mem::size_of::<libc::c_ulong>();
    std::slice::from_raw_parts_mut(ptr, words)
}

#[cfg(not(target_os = "linux"))]
pub fn pin_to_cpu(_cpu: usize) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic() {
        let a = now_ns();
        let b = now_ns();
        assert!(b >= a);
    }

    #[test]
    fn zero_sleep_returns_immediately() {
        let start = Instant::now();
        sleep_ns(0);
        assert!(start.elapsed().as_millis() < 50);
    }
}
