use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Identifies a connection group (host, port).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupId {
    host: String,
    port: u16,
}

impl GroupId {
    fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_ascii_lowercase(), port }
    }
}

/// Idle handle with the time it was returned to the pool.
struct IdleEntry<C> {
    handle: C,
    idle_since: Instant,
}

struct PoolState<C> {
    groups: HashMap<GroupId, VecDeque<IdleEntry<C>>>,
    total_idle: usize,
}

/// Limits applied by [`ConnectionPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle handles kept per (host, port). Default 6.
    pub max_per_host: usize,
    /// Idle handles kept across all hosts. Default 30.
    pub max_total: usize,
    /// Handles idle for longer than this are never handed out. Default 60s.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_per_host: 6, max_total: 30, idle_timeout: Duration::from_secs(60) }
    }
}

/// Keyed cache of idle transport handles.
///
/// The pool has no protocol knowledge: it stores whatever handle type the
/// caller gives it and closes handles by dropping them. Every operation takes
/// the single pool mutex for map bookkeeping only; handles being closed are
/// dropped after the lock is released.
pub struct ConnectionPool<C> {
    config: PoolConfig,
    state: Mutex<PoolState<C>>,
}

impl<C> std::fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("idle", &self.count())
            .finish()
    }
}

impl<C> Default for ConnectionPool<C> {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl<C> ConnectionPool<C> {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState { groups: HashMap::new(), total_idle: 0 }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState<C>> {
        // A panic while holding the lock cannot leave the maps half-updated
        // in a way that matters, so keep serving from a poisoned pool.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the most recently released idle handle for `(host, port)`.
    ///
    /// Entries past the idle timeout are evicted on the way. `None` means
    /// nothing is pooled and the caller should open a new connection.
    pub fn acquire(&self, host: &str, port: u16) -> Option<C> {
        let group_id = GroupId::new(host, port);
        let now = Instant::now();
        let mut expired = Vec::new();

        let found = {
            let mut state = self.lock();
            let mut found = None;
            let mut removed = 0;
            if let Some(queue) = state.groups.get_mut(&group_id) {
                while let Some(entry) = queue.pop_back() {
                    removed += 1;
                    if now.duration_since(entry.idle_since) >= self.config.idle_timeout {
                        expired.push(entry.handle);
                        continue;
                    }
                    found = Some(entry.handle);
                    break;
                }
                // Anything older than an expired entry is expired too.
                let mut stale = 0;
                while let Some(entry) = queue.front() {
                    if now.duration_since(entry.idle_since) < self.config.idle_timeout {
                        break;
                    }
                    if let Some(entry) = queue.pop_front() {
                        expired.push(entry.handle);
                        stale += 1;
                    }
                }
                removed += stale;
                if queue.is_empty() {
                    state.groups.remove(&group_id);
                }
            }
            state.total_idle -= removed;
            found
        };

        if !expired.is_empty() {
            tracing::debug!(host = %host, port, evicted = expired.len(), "evicted expired idle connections");
        }
        drop(expired);
        if found.is_some() {
            tracing::trace!(host = %host, port, "reusing pooled connection");
        }
        found
    }

    /// Return a handle for reuse.
    ///
    /// Returns `false` if the per-host queue is full, in which case the handle
    /// is closed instead. When the pool-wide cap is reached the oldest idle
    /// handle of any host is closed to make room.
    pub fn release(&self, host: &str, port: u16, handle: C) -> bool {
        let group_id = GroupId::new(host, port);
        let mut closed = None;

        let accepted = {
            let mut state = self.lock();
            let queued = state.groups.get(&group_id).map_or(0, VecDeque::len);
            if queued >= self.config.max_per_host || self.config.max_total == 0 {
                closed = Some(handle);
                false
            } else {
                if state.total_idle >= self.config.max_total {
                    if let Some(victim) = Self::pop_oldest(&mut state) {
                        closed = Some(victim);
                    }
                }
                state
                    .groups
                    .entry(group_id)
                    .or_default()
                    .push_back(IdleEntry { handle, idle_since: Instant::now() });
                state.total_idle += 1;
                true
            }
        };

        if !accepted {
            tracing::debug!(host = %host, port, "pool full for host, closing connection");
        }
        drop(closed);
        accepted
    }

    fn pop_oldest(state: &mut PoolState<C>) -> Option<C> {
        let oldest_group = state
            .groups
            .iter()
            .filter_map(|(id, queue)| queue.front().map(|e| (id.clone(), e.idle_since)))
            .min_by_key(|(_, since)| *since)
            .map(|(id, _)| id)?;
        let queue = state.groups.get_mut(&oldest_group)?;
        let entry = queue.pop_front()?;
        if queue.is_empty() {
            state.groups.remove(&oldest_group);
        }
        state.total_idle -= 1;
        Some(entry.handle)
    }

    /// Close every pooled handle.
    pub fn clear(&self) {
        let drained: Vec<_> = {
            let mut state = self.lock();
            state.total_idle = 0;
            state.groups.drain().collect()
        };
        drop(drained);
    }

    /// Idle handles pooled for `(host, port)`, expired ones included.
    pub fn idle_count(&self, host: &str, port: u16) -> usize {
        self.lock().groups.get(&GroupId::new(host, port)).map_or(0, VecDeque::len)
    }

    /// Idle handles across all hosts.
    pub fn count(&self) -> usize {
        self.lock().total_idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Handle that counts how many times it was closed (dropped).
    struct Tracked(u32, Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.1.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pool(max_per_host: usize, max_total: usize, idle_timeout: Duration) -> ConnectionPool<u32> {
        ConnectionPool::new(PoolConfig { max_per_host, max_total, idle_timeout })
    }

    #[test]
    fn test_acquire_empty_is_miss() {
        let p = pool(2, 10, Duration::from_secs(60));
        assert!(p.acquire("example.com", 443).is_none());
    }

    #[test]
    fn test_release_then_acquire_lifo() {
        let p = pool(4, 10, Duration::from_secs(60));
        assert!(p.release("example.com", 443, 1));
        assert!(p.release("example.com", 443, 2));
        assert_eq!(p.idle_count("example.com", 443), 2);
        assert_eq!(p.acquire("example.com", 443), Some(2));
        assert_eq!(p.acquire("example.com", 443), Some(1));
        assert_eq!(p.acquire("example.com", 443), None);
        assert_eq!(p.count(), 0);
    }

    #[test]
    fn test_groups_are_keyed_by_host_and_port() {
        let p = pool(4, 10, Duration::from_secs(60));
        p.release("example.com", 443, 1);
        assert!(p.acquire("example.com", 80).is_none());
        assert!(p.acquire("other.com", 443).is_none());
        assert_eq!(p.acquire("EXAMPLE.com", 443), Some(1));
    }

    #[test]
    fn test_per_host_cap_closes_extra() {
        let p = pool(2, 10, Duration::from_secs(60));
        assert!(p.release("a.com", 80, 1));
        assert!(p.release("a.com", 80, 2));
        assert!(!p.release("a.com", 80, 3));
        assert_eq!(p.idle_count("a.com", 80), 2);

        // Two outstanding connections taken, a third acquire misses.
        assert!(p.acquire("a.com", 80).is_some());
        assert!(p.acquire("a.com", 80).is_some());
        assert!(p.acquire("a.com", 80).is_none());
    }

    #[test]
    fn test_total_cap_evicts_oldest() {
        let closed = Arc::new(AtomicUsize::new(0));
        let p = ConnectionPool::new(PoolConfig {
            max_per_host: 4,
            max_total: 2,
            idle_timeout: Duration::from_secs(60),
        });
        p.release("a.com", 80, Tracked(1, closed.clone()));
        std::thread::sleep(Duration::from_millis(2));
        p.release("b.com", 80, Tracked(2, closed.clone()));
        std::thread::sleep(Duration::from_millis(2));
        p.release("c.com", 80, Tracked(3, closed.clone()));

        assert_eq!(p.count(), 2);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(p.acquire("a.com", 80).is_none());
        assert_eq!(p.acquire("c.com", 80).map(|h| h.0), Some(3));
    }

    #[test]
    fn test_expired_entries_are_evicted_lazily() {
        let closed = Arc::new(AtomicUsize::new(0));
        let p = ConnectionPool::new(PoolConfig {
            max_per_host: 4,
            max_total: 10,
            idle_timeout: Duration::from_millis(20),
        });
        p.release("a.com", 80, Tracked(1, closed.clone()));
        p.release("a.com", 80, Tracked(2, closed.clone()));
        std::thread::sleep(Duration::from_millis(40));

        // Nothing is swept until someone asks.
        assert_eq!(p.idle_count("a.com", 80), 2);
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        assert!(p.acquire("a.com", 80).is_none());
        assert_eq!(closed.load(Ordering::SeqCst), 2);
        assert_eq!(p.count(), 0);
    }

    #[test]
    fn test_clear_closes_everything() {
        let closed = Arc::new(AtomicUsize::new(0));
        let p = ConnectionPool::default();
        p.release("a.com", 80, Tracked(1, closed.clone()));
        p.release("b.com", 443, Tracked(2, closed.clone()));
        p.clear();
        assert_eq!(p.count(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_release_acquire() {
        let p = Arc::new(pool(6, 30, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let p = p.clone();
                std::thread::spawn(move || {
                    for n in 0..100 {
                        p.release("a.com", 80, i * 1000 + n);
                        p.acquire("a.com", 80);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(p.idle_count("a.com", 80) <= 6);
        assert_eq!(p.count(), p.idle_count("a.com", 80));
    }
}
