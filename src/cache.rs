use std::time::{Duration, Instant};

/// Single-slot cache that hands back the stored value until it is older than
/// the TTL. Failed loads are never stored.
#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    slot: Option<(Instant, T)>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slot: None }
    }

    pub fn get(&self) -> Option<T> {
        self.get_at(Instant::now())
    }

    fn get_at(&self, now: Instant) -> Option<T> {
        match &self.slot {
            Some((stored, value)) if now.saturating_duration_since(*stored) < self.ttl => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    pub fn insert(&mut self, value: T) {
        self.slot = Some((Instant::now(), value));
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub fn get_or_try_insert_with<E, F>(&mut self, load: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.get() {
            return Ok(value);
        }
        let value = load()?;
        self.insert(value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_value_within_ttl() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        let mut calls = 0;
        for _ in 0..3 {
            let v: Result<u32, ()> = cache.get_or_try_insert_with(|| {
                calls += 1;
                Ok(7)
            });
            assert_eq!(v, Ok(7));
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn expired_value_is_not_returned() {
        let mut cache = TtlCache::new(Duration::from_secs(10));
        cache.insert("snapshot");
        let later = Instant::now() + Duration::from_secs(11);
        assert_eq!(cache.get_at(later), None);
        assert_eq!(cache.get(), Some("snapshot"));
    }

    #[test]
    fn failures_are_not_cached_and_clear_forces_reload() {
        let mut cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        let err: Result<u32, &str> = cache.get_or_try_insert_with(|| Err("offline"));
        assert_eq!(err, Err("offline"));
        assert_eq!(cache.get(), None);

        cache.insert(1);
        cache.clear();
        let reloaded: Result<u32, &str> = cache.get_or_try_insert_with(|| Ok(2));
        assert_eq!(reloaded, Ok(2));
    }
}
