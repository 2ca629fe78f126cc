use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::errors::AppError;
use crate::AppState;

/// Per-IP sliding-window log with a hard cap on tracked addresses.
///
/// When the table is full, addresses whose log has fully aged out are dropped
/// first; if none have, the least recently seen address is evicted.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    capacity: usize,
    hits: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration, capacity: usize) -> Self {
        Self {
            max_requests,
            window,
            capacity: capacity.max(1),
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.max_requests > 0
    }

    /// Records a hit from `ip` at `now`. `false` means the caller is over the limit.
    pub fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        if !self.enabled() {
            return true;
        }
        let mut hits = match self.hits.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if !hits.contains_key(&ip) && hits.len() >= self.capacity {
            self.evict(&mut hits, now);
        }

        let log = hits.entry(ip).or_default();
        while log.front().is_some_and(|t| now.duration_since(*t) >= self.window) {
            log.pop_front();
        }
        if log.len() >= self.max_requests {
            return false;
        }
        log.push_back(now);
        true
    }

    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    pub fn tracked(&self) -> usize {
        match self.hits.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn evict(&self, hits: &mut HashMap<IpAddr, VecDeque<Instant>>, now: Instant) {
        let window = self.window;
        hits.retain(|_, log| log.back().is_some_and(|t| now.duration_since(*t) < window));
        if hits.len() < self.capacity {
            return;
        }
        let oldest = hits
            .iter()
            .min_by_key(|(_, log)| log.back().copied())
            .map(|(ip, _)| *ip);
        if let Some(ip) = oldest {
            hits.remove(&ip);
            tracing::debug!(%ip, "rate limiter full, evicted least recent address");
        }
    }
}

/// Rejects with 429 once the peer address exceeds the limiter.
/// Requests without a known peer address pass through.
pub async fn throttle(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(ConnectInfo(addr)) = peer {
        if !state.limiter.check(addr.ip()) {
            tracing::warn!(ip = %addr.ip(), path = %req.uri().path(), "rate limit exceeded");
            return AppError::RateLimited.into_response();
        }
    }
    next.run(req).await
}
